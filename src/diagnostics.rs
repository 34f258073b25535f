use std::path::Path;

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};

use crate::{
    config::Settings,
    workspace::{resolve::Target, Link, LinkKind, Workspace},
};

/// Links in `path` that do not resolve, paired with their resolution outcome.
pub fn unresolved_links<'a>(
    workspace: &'a Workspace,
    path: &Path,
) -> Vec<(&'a Link, Target)> {
    workspace
        .links(path)
        .iter()
        .filter_map(|link| {
            let target = workspace.resolve_link(path, link);
            let broken = match &target {
                Target::External(_) => false,
                Target::Unresolved(_) => true,
                Target::Doc {
                    anchor_resolved, ..
                } => !anchor_resolved,
                Target::Anchor(slug) => workspace.heading_by_slug(path, slug).is_none(),
            };
            broken.then_some((link, target))
        })
        .collect()
}

pub fn diagnostics(
    workspace: &Workspace,
    settings: &Settings,
    path: &Path,
) -> Option<Vec<Diagnostic>> {
    if !settings.unresolved_diagnostics {
        return None;
    }

    let diags = unresolved_links(workspace, path)
        .into_iter()
        .map(|(link, target)| {
            let (message, severity) = match &target {
                Target::Doc { anchor, .. } => (
                    format!(
                        "Anchor '{}' not found in the target document",
                        anchor.as_deref().unwrap_or_default()
                    ),
                    DiagnosticSeverity::WARNING,
                ),
                Target::Anchor(slug) => (
                    format!("Anchor '{}' not found in this document", slug),
                    DiagnosticSeverity::WARNING,
                ),
                _ => {
                    let shown = match link.kind {
                        LinkKind::ReferenceUse => {
                            format!("[{}]", link.ref_name.as_deref().unwrap_or_default())
                        }
                        _ => link.raw_target.clone(),
                    };
                    let count = usage_count(workspace, link);
                    let base = format!("Unresolved link '{}'", shown);
                    match count > 1 {
                        true => (
                            format!("{} (used {} times)", base, count),
                            DiagnosticSeverity::INFORMATION,
                        ),
                        false => (base, DiagnosticSeverity::INFORMATION),
                    }
                }
            };

            Diagnostic {
                range: link.range.0,
                message,
                source: Some("mdrefs".into()),
                severity: Some(severity),
                ..Default::default()
            }
        })
        .collect();

    Some(diags)
}

/// How many times the same raw target occurs across the workspace.
fn usage_count(workspace: &Workspace, link: &Link) -> usize {
    workspace
        .documents()
        .flat_map(|(_, state)| state.model.links.iter())
        .filter(|other| {
            other.kind == link.kind
                && other.raw_target == link.raw_target
                && other.ref_name == link.ref_name
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::test_utils::create_test_workspace;
    use std::fs;

    #[test]
    fn disabled_by_setting() {
        let (_temp_dir, ws_dir, workspace) = create_test_workspace(|dir| {
            fs::write(
                dir.join("test.md"),
                "# Test\n\nBroken [link](nonexistent.md) here.",
            )
            .unwrap();
        });

        let settings = Settings {
            unresolved_diagnostics: false,
            ..Settings::default()
        };

        assert!(diagnostics(&workspace, &settings, &ws_dir.join("test.md")).is_none());
    }

    #[test]
    fn unresolved_document_link_is_reported() {
        let (_temp_dir, ws_dir, workspace) = create_test_workspace(|dir| {
            fs::write(
                dir.join("test.md"),
                "# Test\n\nBroken [link](nonexistent.md) here.",
            )
            .unwrap();
        });

        let settings = Settings::default();
        let diags = diagnostics(&workspace, &settings, &ws_dir.join("test.md")).unwrap();

        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("Unresolved"));
        assert_eq!(diags[0].source, Some("mdrefs".to_string()));
        assert_eq!(diags[0].severity, Some(DiagnosticSeverity::INFORMATION));
    }

    #[test]
    fn anchor_mismatch_is_a_warning() {
        let (_temp_dir, ws_dir, workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("target.md"), "# Present\n").unwrap();
            fs::write(dir.join("test.md"), "[x](target.md#absent)").unwrap();
        });

        let settings = Settings::default();
        let diags = diagnostics(&workspace, &settings, &ws_dir.join("test.md")).unwrap();

        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Some(DiagnosticSeverity::WARNING));
        assert!(diags[0].message.contains("absent"));
    }

    #[test]
    fn valid_links_produce_nothing() {
        let (_temp_dir, ws_dir, workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("target.md"), "# Target\n\n## Section\n\nContent.").unwrap();
            fs::write(
                dir.join("test.md"),
                "# Test\n\nValid [file link](target.md) and [heading link](target.md#section).",
            )
            .unwrap();
        });

        let settings = Settings::default();
        let diags = diagnostics(&workspace, &settings, &ws_dir.join("test.md")).unwrap();
        assert_eq!(diags.len(), 0);
    }

    #[test]
    fn external_links_are_ignored() {
        let (_temp_dir, ws_dir, workspace) = create_test_workspace(|dir| {
            fs::write(
                dir.join("test.md"),
                "[site](https://example.com) and <mailto:a@b.c>",
            )
            .unwrap();
        });

        let settings = Settings::default();
        let diags = diagnostics(&workspace, &settings, &ws_dir.join("test.md")).unwrap();
        assert_eq!(diags.len(), 0);
    }

    #[test]
    fn dangling_reference_use_is_reported() {
        let (_temp_dir, ws_dir, workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("test.md"), "See [docs][nowhere] here.\n").unwrap();
        });

        let settings = Settings::default();
        let diags = diagnostics(&workspace, &settings, &ws_dir.join("test.md")).unwrap();

        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("[nowhere]"));
    }

    #[test]
    fn repeated_broken_targets_report_usage_count() {
        let (_temp_dir, ws_dir, workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("file1.md"), "# File 1\n\n[broken](missing.md) here.").unwrap();
            fs::write(
                dir.join("file2.md"),
                "# File 2\n\n[broken](missing.md) here too.",
            )
            .unwrap();
        });

        let settings = Settings::default();
        let diags = diagnostics(&workspace, &settings, &ws_dir.join("file1.md")).unwrap();

        assert_eq!(diags.len(), 1);
        assert!(
            diags[0].message.contains("2 times"),
            "message: {}",
            diags[0].message
        );
    }

    #[test]
    fn empty_document_produces_nothing() {
        let (_temp_dir, ws_dir, workspace) = create_test_workspace(|dir| {
            fs::write(dir.join("empty.md"), "").unwrap();
        });

        let settings = Settings::default();
        let diags = diagnostics(&workspace, &settings, &ws_dir.join("empty.md")).unwrap();
        assert_eq!(diags.len(), 0);
    }
}
