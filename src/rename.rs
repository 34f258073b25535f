use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tower_lsp::lsp_types::{
    DocumentChangeOperation, DocumentChanges, OneOf, OptionalVersionedTextDocumentIdentifier,
    Position, PrepareRenameResponse, RenameFile, RenameParams, ResourceOp, TextDocumentEdit,
    TextEdit, Url, WorkspaceEdit,
};

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::workspace::resolve::{normalize_path, Target, TargetKey};
use crate::workspace::{slugify, Heading, LinkKind, Rangeable, Span, Workspace};

/// The entity a rename at some position operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RenameTarget {
    Heading { path: PathBuf, slug: String },
    Document { path: PathBuf },
    RefName { path: PathBuf, name: String },
}

fn select_rename_target(
    workspace: &Workspace,
    path: &Path,
    position: Position,
) -> Option<RenameTarget> {
    if let Some((_, link)) = workspace.select_link_at_position(path, position) {
        // The name of a reference-style link is its own renameable entity
        if let (Some(name), Some(name_span)) = (&link.ref_name, &link.name_span) {
            if name_span.includes_position(position) {
                return Some(RenameTarget::RefName {
                    path: path.to_path_buf(),
                    name: name.clone(),
                });
            }
        }

        return match workspace.resolve_link(path, link) {
            Target::Anchor(slug) => Some(RenameTarget::Heading {
                path: path.to_path_buf(),
                slug,
            }),
            Target::Doc {
                path: target,
                anchor: Some(anchor),
                anchor_resolved: true,
            } => Some(RenameTarget::Heading {
                path: target,
                slug: anchor,
            }),
            Target::Doc { path: target, .. } => Some(RenameTarget::Document { path: target }),
            Target::External(_) | Target::Unresolved(_) => None,
        };
    }

    if let Some(heading) = workspace.select_heading_at_position(path, position) {
        return Some(RenameTarget::Heading {
            path: path.to_path_buf(),
            slug: heading.slug.clone(),
        });
    }

    if workspace.contains(path) {
        return Some(RenameTarget::Document {
            path: path.to_path_buf(),
        });
    }
    None
}

/// Validate a rename position and report the affected range and placeholder
/// text before the client prompts for a new name.
pub fn prepare_rename(
    workspace: &Workspace,
    cursor_position: Position,
    path: &Path,
) -> Option<PrepareRenameResponse> {
    match select_rename_target(workspace, path, cursor_position)? {
        RenameTarget::Heading { path: doc, slug } => {
            let heading = workspace.heading_by_slug(&doc, &slug)?.clone();
            let range = heading_text_span(workspace, &doc, &heading)?;
            Some(PrepareRenameResponse::RangeWithPlaceholder {
                range: range.0,
                placeholder: heading.text,
            })
        }
        RenameTarget::RefName { path: doc, name } => {
            let def = workspace.reference_definition(&doc, &name)?;
            Some(PrepareRenameResponse::RangeWithPlaceholder {
                range: def.name_span?.0,
                placeholder: name,
            })
        }
        RenameTarget::Document { path: doc } => {
            let placeholder = workspace.relative_name(&doc)?;
            let range = match workspace.select_link_at_position(path, cursor_position) {
                Some((_, link)) => {
                    Span::on_line(link.target_span.start.line, link.path_columns()).0
                }
                // Plain text renames the containing document; no buffer text
                // is replaced, the file is
                None => Span::on_line(
                    cursor_position.line,
                    cursor_position.character..cursor_position.character,
                )
                .0,
            };
            Some(PrepareRenameResponse::RangeWithPlaceholder { range, placeholder })
        }
    }
}

pub fn rename(
    workspace: &mut Workspace,
    settings: &Settings,
    params: &RenameParams,
    path: &Path,
    cancel: &CancellationToken,
) -> Option<WorkspaceEdit> {
    if !workspace.ensure_indexed(settings, cancel) {
        return None;
    }

    let position = params.text_document_position.position;
    let target = select_rename_target(workspace, path, position)?;

    let (edits, resource_op) = match target {
        RenameTarget::Heading { path: doc, slug } => {
            (rename_heading(workspace, &doc, &slug, &params.new_name)?, None)
        }
        RenameTarget::Document { path: doc } => rename_document(workspace, &doc, &params.new_name)?,
        RenameTarget::RefName { path: doc, name } => {
            (rename_ref_name(workspace, &doc, &name, &params.new_name)?, None)
        }
    };

    if cancel.is_cancelled() {
        return None;
    }

    let operations = edits
        .into_iter()
        .filter_map(|(doc, edits)| {
            Some(DocumentChangeOperation::Edit(TextDocumentEdit {
                text_document: OptionalVersionedTextDocumentIdentifier {
                    uri: Url::from_file_path(&doc).ok()?,
                    version: None,
                },
                edits: edits.into_iter().map(OneOf::Left).collect(),
            }))
        })
        // The file rename comes after the text edits; clients apply in order
        .chain(resource_op.map(DocumentChangeOperation::Op))
        .collect();

    Some(WorkspaceEdit {
        document_changes: Some(DocumentChanges::Operations(operations)),
        ..Default::default()
    })
}

type EditsByDoc = BTreeMap<PathBuf, Vec<TextEdit>>;

fn push_edit(edits: &mut EditsByDoc, doc: &Path, span: Span, new_text: String) {
    let slot = edits.entry(doc.to_path_buf()).or_default();
    let edit = TextEdit {
        range: span.0,
        new_text,
    };
    // Several reference-style uses can redirect to the same definition edit
    if !slot.contains(&edit) {
        slot.push(edit);
    }
}

/// Span of a heading's display text, after the hashes and any following
/// spaces.
fn heading_text_span(workspace: &Workspace, doc: &Path, heading: &Heading) -> Option<Span> {
    let line = heading.range.start.line;
    let chars = workspace.select_line(doc, line as usize)?;
    let mut col = heading.range.start.character as usize;
    while chars.get(col) == Some(&'#') {
        col += 1;
    }
    while chars.get(col) == Some(&' ') {
        col += 1;
    }
    Some(Span::on_line(line, col as u32..heading.range.end.character))
}

fn rename_heading(
    workspace: &Workspace,
    doc: &Path,
    slug: &str,
    new_name: &str,
) -> Option<EditsByDoc> {
    let heading = workspace.heading_by_slug(doc, slug)?.clone();
    let new_text = new_name.trim();
    let new_slug = slugify(new_text);

    let mut edits = EditsByDoc::new();
    push_edit(
        &mut edits,
        doc,
        heading_text_span(workspace, doc, &heading)?,
        new_text.to_string(),
    );

    let key = TargetKey::Heading(doc.to_path_buf(), heading.slug.clone());
    for (source, nr) in workspace.references_to(&key) {
        let Some(link) = workspace.link(&source, nr) else {
            continue;
        };
        // A reference-style use carries no anchor text of its own; the edit
        // lands on its definition's target instead
        let carrier = match link.kind {
            LinkKind::ReferenceUse => link
                .ref_name
                .as_deref()
                .and_then(|name| workspace.reference_definition(&source, name)),
            _ => Some(link),
        };
        let Some(carrier) = carrier else { continue };
        if let Some(cols) = carrier.anchor_columns() {
            push_edit(
                &mut edits,
                &source,
                Span::on_line(carrier.target_span.start.line, cols),
                new_slug.clone(),
            );
        }
    }
    Some(edits)
}

fn rename_document(
    workspace: &Workspace,
    doc: &Path,
    new_name: &str,
) -> Option<(EditsByDoc, Option<ResourceOp>)> {
    let mut new_path = match new_name.strip_prefix('/') {
        Some(rest) => workspace.root_dir().join(rest),
        None => doc.parent()?.join(new_name),
    };
    if new_path.extension().is_none() {
        if let Some(ext) = doc.extension() {
            new_path.set_extension(ext);
        }
    }
    let new_path = normalize_path(&new_path);

    let mut edits = EditsByDoc::new();
    for (source, nr) in workspace.references_to_doc(doc) {
        let Some(link) = workspace.link(&source, nr) else {
            continue;
        };
        let carrier = match link.kind {
            LinkKind::ReferenceUse => link
                .ref_name
                .as_deref()
                .and_then(|name| workspace.reference_definition(&source, name)),
            _ => Some(link),
        };
        let Some(carrier) = carrier else { continue };

        let new_target = match carrier.raw_target.starts_with('/') {
            true => pathdiff::diff_paths(&new_path, workspace.root_dir())
                .and_then(|diff| diff.to_str().map(|s| format!("/{}", s))),
            false => source
                .parent()
                .and_then(|dir| pathdiff::diff_paths(&new_path, dir))
                .and_then(|diff| diff.to_str().map(String::from)),
        };
        if let Some(new_target) = new_target {
            push_edit(
                &mut edits,
                &source,
                Span::on_line(carrier.target_span.start.line, carrier.path_columns()),
                new_target,
            );
        }
    }

    let resource_op = ResourceOp::Rename(RenameFile {
        old_uri: Url::from_file_path(doc).ok()?,
        new_uri: Url::from_file_path(&new_path).ok()?,
        options: None,
        annotation_id: None,
    });
    Some((edits, Some(resource_op)))
}

fn rename_ref_name(
    workspace: &Workspace,
    doc: &Path,
    name: &str,
    new_name: &str,
) -> Option<EditsByDoc> {
    let def = workspace.reference_definition(doc, name)?;
    let mut edits = EditsByDoc::new();
    push_edit(&mut edits, doc, def.name_span?, new_name.to_string());

    let key = TargetKey::RefDef(doc.to_path_buf(), name.to_string());
    for (source, nr) in workspace.references_to(&key) {
        let Some(span) = workspace.link(&source, nr).and_then(|link| link.name_span) else {
            continue;
        };
        push_edit(&mut edits, &source, span, new_name.to_string());
    }
    Some(edits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_workspace;
    use std::fs;
    use tower_lsp::lsp_types::{TextDocumentIdentifier, TextDocumentPositionParams};

    fn create_rename_params(
        path: &std::path::Path,
        line: u32,
        character: u32,
        new_name: &str,
    ) -> RenameParams {
        RenameParams {
            text_document_position: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier {
                    uri: Url::from_file_path(path).unwrap(),
                },
                position: Position { line, character },
            },
            new_name: new_name.to_string(),
            work_done_progress_params: Default::default(),
        }
    }

    fn text_edits(edit: &WorkspaceEdit) -> Vec<(String, TextEdit)> {
        let Some(DocumentChanges::Operations(ops)) = &edit.document_changes else {
            panic!("expected operations");
        };
        ops.iter()
            .filter_map(|op| match op {
                DocumentChangeOperation::Edit(edit) => Some(edit),
                _ => None,
            })
            .flat_map(|edit| {
                edit.edits.iter().filter_map(|e| match e {
                    OneOf::Left(text_edit) => {
                        Some((edit.text_document.uri.to_string(), text_edit.clone()))
                    }
                    _ => None,
                })
            })
            .collect()
    }

    fn rename_op(edit: &WorkspaceEdit) -> Option<&RenameFile> {
        let Some(DocumentChanges::Operations(ops)) = &edit.document_changes else {
            return None;
        };
        ops.iter().find_map(|op| match op {
            DocumentChangeOperation::Op(ResourceOp::Rename(r)) => Some(r),
            _ => None,
        })
    }

    #[test]
    fn renaming_a_heading_rewrites_declaration_and_anchors() {
        let (_temp_dir, ws_dir, mut workspace) = create_test_workspace(|dir| {
            fs::write(
                dir.join("target.md"),
                "# Main Title\n\n## Old Heading\n\nContent here.",
            )
            .unwrap();
            fs::write(
                dir.join("source.md"),
                "# Source\n\nSee [details](target.md#old-heading) for more.",
            )
            .unwrap();
        });

        let settings = Settings::default();
        let cancel = CancellationToken::new();
        let file_path = ws_dir.join("target.md");
        let params = create_rename_params(&file_path, 2, 5, "New Heading");

        let edit = rename(&mut workspace, &settings, &params, &file_path, &cancel)
            .expect("rename should produce an edit");
        let edits = text_edits(&edit);
        assert_eq!(edits.len(), 2);

        let declaration = edits
            .iter()
            .find(|(uri, _)| uri.contains("target.md"))
            .unwrap();
        assert_eq!(declaration.1.new_text, "New Heading");
        assert_eq!(declaration.1.range.start.line, 2);
        assert_eq!(declaration.1.range.start.character, 3);

        let anchor = edits
            .iter()
            .find(|(uri, _)| uri.contains("source.md"))
            .unwrap();
        assert_eq!(anchor.1.new_text, "new-heading");
        // Only the anchor portion after '#' is replaced
        assert_eq!(anchor.1.range.start.line, 2);
    }

    #[test]
    fn renaming_a_document_moves_the_file_and_rewrites_paths() {
        let (_temp_dir, ws_dir, mut workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("a.md"), "# Alpha\n\ncontent\n").unwrap();
            fs::write(dir.join("b.md"), "see [alpha](a.md#alpha) here\n").unwrap();
        });

        let settings = Settings::default();
        let cancel = CancellationToken::new();
        let file_path = ws_dir.join("a.md");
        // Cursor on plain text selects the document itself
        let params = create_rename_params(&file_path, 2, 2, "c");

        let edit = rename(&mut workspace, &settings, &params, &file_path, &cancel)
            .expect("rename should produce an edit");

        let op = rename_op(&edit).expect("should move the file");
        assert!(op.old_uri.path().ends_with("a.md"));
        assert!(op.new_uri.path().ends_with("c.md"));

        let edits = text_edits(&edit);
        assert_eq!(edits.len(), 1);
        assert!(edits[0].0.contains("b.md"));
        assert_eq!(edits[0].1.new_text, "c.md");
        // The anchor portion is untouched: only "a.md" is replaced
        assert_eq!(edits[0].1.range.start.character, 12);
        assert_eq!(edits[0].1.range.end.character, 16);
    }

    #[test]
    fn renaming_a_document_updates_reference_definitions() {
        let (_temp_dir, ws_dir, mut workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("target.md"), "# Target\n\nContent.").unwrap();
            fs::write(
                dir.join("source.md"),
                "See [docs][guide].\n\n[guide]: target.md\n",
            )
            .unwrap();
        });

        let settings = Settings::default();
        let cancel = CancellationToken::new();
        let file_path = ws_dir.join("target.md");
        let params = create_rename_params(&file_path, 2, 2, "renamed");

        let edit = rename(&mut workspace, &settings, &params, &file_path, &cancel)
            .expect("rename should produce an edit");
        let edits = text_edits(&edit);

        // One definition edit, even though both the use and the definition
        // reference the target
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].1.new_text, "renamed.md");
        assert_eq!(edits[0].1.range.start.line, 2);
    }

    #[test]
    fn renaming_a_reference_name_rewrites_definition_and_uses() {
        let (_temp_dir, ws_dir, mut workspace) = create_test_workspace(|dir| {
            fs::write(
                dir.join("a.md"),
                "See [docs][guide] and [more][guide].\n\n[guide]: b.md\n",
            )
            .unwrap();
            fs::write(dir.join("b.md"), "# B\n").unwrap();
        });

        let settings = Settings::default();
        let cancel = CancellationToken::new();
        let file_path = ws_dir.join("a.md");
        // Cursor inside the name of the first use
        let params = create_rename_params(&file_path, 0, 12, "manual");

        let edit = rename(&mut workspace, &settings, &params, &file_path, &cancel)
            .expect("rename should produce an edit");
        let edits = text_edits(&edit);

        assert_eq!(edits.len(), 3, "definition plus two uses");
        assert!(edits.iter().all(|(_, e)| e.new_text == "manual"));
    }

    #[test]
    fn rename_from_a_link_cursor_targets_the_heading() {
        let (_temp_dir, ws_dir, mut workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("target.md"), "## Old Heading\n").unwrap();
            fs::write(dir.join("source.md"), "[x](target.md#old-heading)\n").unwrap();
        });

        let settings = Settings::default();
        let cancel = CancellationToken::new();
        let source = ws_dir.join("source.md");
        let params = create_rename_params(&source, 0, 5, "Fresh");

        let edit = rename(&mut workspace, &settings, &params, &source, &cancel)
            .expect("rename should produce an edit");
        let edits = text_edits(&edit);

        assert_eq!(edits.len(), 2);
        let declaration = edits
            .iter()
            .find(|(uri, _)| uri.contains("target.md"))
            .unwrap();
        assert_eq!(declaration.1.new_text, "Fresh");
        let anchor = edits
            .iter()
            .find(|(uri, _)| uri.contains("source.md"))
            .unwrap();
        assert_eq!(anchor.1.new_text, "fresh");
    }

    #[test]
    fn prepare_rename_reports_the_heading_text_range() {
        let (_temp_dir, ws_dir, workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("a.md"), "## Some Heading\n").unwrap();
        });

        let response = prepare_rename(
            &workspace,
            Position {
                line: 0,
                character: 4,
            },
            &ws_dir.join("a.md"),
        )
        .expect("heading positions are renameable");

        match response {
            PrepareRenameResponse::RangeWithPlaceholder { range, placeholder } => {
                assert_eq!(placeholder, "Some Heading");
                assert_eq!(range.start.character, 3);
                assert_eq!(range.end.character, 15);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn prepare_rename_on_plain_text_matches_document_rename() {
        let (_temp_dir, ws_dir, mut workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("a.md"), "# Alpha\n\nbody text\n").unwrap();
            fs::write(dir.join("b.md"), "see [x](a.md)\n").unwrap();
        });

        let file_path = ws_dir.join("a.md");
        let position = Position {
            line: 2,
            character: 2,
        };

        // Wherever rename would move the file, prepare must offer it too
        let response = prepare_rename(&workspace, position, &file_path)
            .expect("plain text positions rename the containing document");
        match response {
            PrepareRenameResponse::RangeWithPlaceholder { range, placeholder } => {
                assert_eq!(placeholder, "a");
                assert_eq!(range.start, range.end);
                assert_eq!(range.start.line, 2);
            }
            other => panic!("unexpected response {:?}", other),
        }

        let settings = Settings::default();
        let cancel = CancellationToken::new();
        let params = create_rename_params(&file_path, 2, 2, "c");
        assert!(rename(&mut workspace, &settings, &params, &file_path, &cancel).is_some());
    }

    #[test]
    fn rename_on_an_external_link_is_refused() {
        let (_temp_dir, ws_dir, mut workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("a.md"), "[site](https://example.com)\n").unwrap();
        });

        let settings = Settings::default();
        let cancel = CancellationToken::new();
        let file_path = ws_dir.join("a.md");
        let params = create_rename_params(&file_path, 0, 10, "whatever");

        assert!(rename(&mut workspace, &settings, &params, &file_path, &cancel).is_none());
    }

    #[test]
    fn cancelled_rename_returns_none() {
        let (_temp_dir, ws_dir, mut workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("a.md"), "# A\n").unwrap();
        });

        let settings = Settings::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let file_path = ws_dir.join("a.md");
        let params = create_rename_params(&file_path, 0, 2, "B");

        assert!(rename(&mut workspace, &settings, &params, &file_path, &cancel).is_none());
    }
}
