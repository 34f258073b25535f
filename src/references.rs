use std::path::Path;

use tower_lsp::lsp_types::{Location, ReferenceParams};

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::workspace::index::queried_keys;
use crate::workspace::resolve::TargetKey;
use crate::workspace::Workspace;

/// Find every link in the workspace referencing the entity under the cursor.
///
/// The cursor can sit on a heading (references to that heading), on a link
/// (references to whatever that link resolves to), on a reference definition
/// (uses of that definition), or on plain text (references to the document
/// itself). With `include_declaration` set, the declaration site itself is
/// part of the result.
pub fn references(
    workspace: &mut Workspace,
    settings: &Settings,
    params: &ReferenceParams,
    path: &Path,
    cancel: &CancellationToken,
) -> Option<Vec<Location>> {
    if !workspace.ensure_indexed(settings, cancel) {
        return None;
    }

    let position = params.text_document_position.position;
    let keys = queried_keys(workspace, path, position)?;

    let mut locations: Vec<Location> = keys
        .iter()
        .flat_map(|key| workspace.references_to(key))
        .filter_map(|(source, nr)| {
            let link = workspace.link(&source, nr)?;
            workspace.location(&source, &link.range)
        })
        .collect();

    if params.context.include_declaration {
        locations.extend(
            keys.iter()
                .filter_map(|key| declaration_location(workspace, key)),
        );
    }

    locations.sort_by(|a, b| {
        (a.uri.as_str(), a.range.start.line, a.range.start.character).cmp(&(
            b.uri.as_str(),
            b.range.start.line,
            b.range.start.character,
        ))
    });
    locations.dedup();

    if cancel.is_cancelled() {
        return None;
    }
    Some(locations)
}

/// The declaration site of an index key: the heading line, the reference
/// definition line, or the start of the document.
fn declaration_location(workspace: &Workspace, key: &TargetKey) -> Option<Location> {
    match key {
        TargetKey::Heading(path, slug) => {
            let heading = workspace.heading_by_slug(path, slug)?;
            workspace.location(path, &heading.range)
        }
        TargetKey::RefDef(path, name) => {
            let def = workspace.reference_definition(path, name)?;
            workspace.location(path, &def.range)
        }
        TargetKey::Doc(path) => workspace.document_location(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::test_utils::create_test_workspace;
    use std::fs;
    use tokio_util::sync::CancellationToken;
    use tower_lsp::lsp_types::{
        PartialResultParams, Position, ReferenceContext, TextDocumentIdentifier,
        TextDocumentPositionParams, Url, WorkDoneProgressParams,
    };

    fn reference_params(
        path: &Path,
        line: u32,
        character: u32,
        include_declaration: bool,
    ) -> ReferenceParams {
        ReferenceParams {
            text_document_position: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier {
                    uri: Url::from_file_path(path).unwrap(),
                },
                position: Position { line, character },
            },
            context: ReferenceContext {
                include_declaration,
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        }
    }

    #[test]
    fn references_to_a_document_span_the_workspace() {
        let (_temp_dir, ws_dir, mut workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("target.md"), "# Target Document\n\nContent here.").unwrap();
            fs::write(
                dir.join("source1.md"),
                "# Source 1\n\nSee [link](target.md) for more.",
            )
            .unwrap();
            fs::write(
                dir.join("source2.md"),
                "# Source 2\n\nAlso see [reference](target) here.",
            )
            .unwrap();
            fs::write(dir.join("unrelated.md"), "# Unrelated\n\nNo links here.").unwrap();
        });

        let settings = Settings::default();
        let cancel = CancellationToken::new();
        let path = ws_dir.join("target.md");
        // Cursor on plain text selects the document itself
        let params = reference_params(&path, 2, 5, false);
        let result = references(&mut workspace, &settings, &params, &path, &cancel);

        let locations = result.expect("should find references to the file");
        assert_eq!(locations.len(), 2);

        let uris: Vec<String> = locations.iter().map(|l| l.uri.to_string()).collect();
        assert!(uris.iter().any(|u| u.contains("source1.md")));
        assert!(uris.iter().any(|u| u.contains("source2.md")));
    }

    #[test]
    fn references_to_a_heading_match_its_slug() {
        let (_temp_dir, ws_dir, mut workspace) = create_test_workspace(|dir| {
            fs::write(
                dir.join("target.md"),
                "# Main Title\n\n## Details\n\nContent here.",
            )
            .unwrap();
            fs::write(
                dir.join("source.md"),
                "# Source\n\nSee [info](target.md#details) for more.",
            )
            .unwrap();
            fs::write(dir.join("other.md"), "[whole file](target.md)").unwrap();
        });

        let settings = Settings::default();
        let cancel = CancellationToken::new();
        let path = ws_dir.join("target.md");
        // Cursor on "## Details"
        let params = reference_params(&path, 2, 3, false);
        let result = references(&mut workspace, &settings, &params, &path, &cancel);

        let locations = result.expect("should find references to the heading");
        assert_eq!(locations.len(), 1, "only the anchored link matches");
        assert!(locations[0].uri.to_string().contains("source.md"));
    }

    #[test]
    fn include_declaration_adds_the_heading_itself() {
        let (_temp_dir, ws_dir, mut workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("target.md"), "## Details\n").unwrap();
            fs::write(dir.join("source.md"), "[info](target.md#details)").unwrap();
        });

        let settings = Settings::default();
        let cancel = CancellationToken::new();
        let path = ws_dir.join("target.md");
        let params = reference_params(&path, 0, 4, true);
        let result = references(&mut workspace, &settings, &params, &path, &cancel);

        let locations = result.expect("should find references plus declaration");
        assert_eq!(locations.len(), 2);
        assert!(locations
            .iter()
            .any(|l| l.uri.to_string().contains("target.md") && l.range.start.line == 0));
    }

    #[test]
    fn cursor_on_a_link_finds_cohort_references() {
        let (_temp_dir, ws_dir, mut workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("target.md"), "# Target\n\nTarget content.").unwrap();
            fs::write(
                dir.join("source1.md"),
                "# Source 1\n\nLink to [target](target.md).",
            )
            .unwrap();
            fs::write(
                dir.join("source2.md"),
                "# Source 2\n\nAnother [target link](target.md).",
            )
            .unwrap();
        });

        let settings = Settings::default();
        let cancel = CancellationToken::new();
        let path = ws_dir.join("source1.md");
        let params = reference_params(&path, 2, 15, false);
        let result = references(&mut workspace, &settings, &params, &path, &cancel);

        let locations = result.expect("should find references from a link cursor");
        assert_eq!(locations.len(), 2);
    }

    #[test]
    fn cursor_on_a_reference_definition_finds_its_uses() {
        let (_temp_dir, ws_dir, mut workspace) = create_test_workspace(|dir| {
            fs::write(
                dir.join("a.md"),
                "See [docs][guide] and [again][guide].\n\n[guide]: b.md\n",
            )
            .unwrap();
            fs::write(dir.join("b.md"), "# B\n").unwrap();
        });

        let settings = Settings::default();
        let cancel = CancellationToken::new();
        let path = ws_dir.join("a.md");
        let params = reference_params(&path, 2, 3, false);
        let result = references(&mut workspace, &settings, &params, &path, &cancel);

        let locations = result.expect("should find uses of the definition");
        assert_eq!(locations.len(), 2);
    }

    #[test]
    fn cancelled_token_yields_none() {
        let (_temp_dir, ws_dir, mut workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("a.md"), "# A\n").unwrap();
        });

        let settings = Settings::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let path = ws_dir.join("a.md");
        let params = reference_params(&path, 0, 1, false);
        assert!(references(&mut workspace, &settings, &params, &path, &cancel).is_none());
    }
}
