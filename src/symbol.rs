//! Symbol providers.
//!
//! `textDocument/documentSymbol` returns the heading outline of one file,
//! nested by heading level. `workspace/symbol` fuzzy-searches document names
//! and heading texts across the whole workspace using [`nucleo_matcher`],
//! ranked by match score.

use std::{iter, path::Path};

use itertools::Itertools;
use nucleo_matcher::{
    pattern::{self, Normalization},
    Matcher,
};
use tower_lsp::lsp_types::{
    DocumentSymbol, DocumentSymbolParams, DocumentSymbolResponse, SymbolInformation, SymbolKind,
    WorkspaceSymbolParams,
};

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::workspace::{Heading, Workspace};

fn compute_match_score(
    matcher: &mut Matcher,
    pattern: &pattern::Pattern,
    symbol: SymbolInformation,
) -> (u32, SymbolInformation) {
    let mut buf = Vec::new();
    (
        pattern
            .score(
                nucleo_matcher::Utf32Str::new(symbol.name.as_str(), &mut buf),
                matcher,
            )
            .unwrap_or_default(),
        symbol,
    )
}

/// Fuzzy-search document names and headings across the workspace.
///
/// Cancellation is checked between documents; symbols gathered before the
/// token fired are still returned.
#[allow(deprecated)] // the deprecated field has no tag-based replacement in SymbolInformation
pub fn workspace_symbol(
    workspace: &mut Workspace,
    settings: &Settings,
    params: &WorkspaceSymbolParams,
    cancel: &CancellationToken,
) -> Option<Vec<SymbolInformation>> {
    if !workspace.ensure_indexed(settings, cancel) {
        return None;
    }

    let mut candidates: Vec<SymbolInformation> = Vec::new();
    for (path, state) in workspace.documents() {
        if cancel.is_cancelled() {
            break;
        }
        if let (Some(name), Some(location)) = (
            workspace.relative_name(path),
            workspace.document_location(path),
        ) {
            candidates.push(SymbolInformation {
                name,
                kind: SymbolKind::FILE,
                tags: None,
                deprecated: None,
                location,
                container_name: None,
            });
        }
        for heading in &state.model.headings {
            if let Some(location) = workspace.location(path, &heading.range) {
                candidates.push(SymbolInformation {
                    name: heading.text.clone(),
                    kind: SymbolKind::STRUCT,
                    tags: None,
                    deprecated: None,
                    location,
                    container_name: workspace.relative_name(path),
                });
            }
        }
    }

    let mut matcher = Matcher::new(nucleo_matcher::Config::DEFAULT);
    let pattern = pattern::Pattern::parse(
        &params.query,
        pattern::CaseMatching::Smart,
        Normalization::Smart,
    );

    Some(
        candidates
            .into_iter()
            .map(|symbol| compute_match_score(&mut matcher, &pattern, symbol))
            .filter(|(score, _)| *score > 0)
            .sorted_by(|(a, _), (b, _)| Ord::cmp(b, a))
            .map(|(_score, symbol)| symbol)
            .collect_vec(),
    )
}

/// The heading outline of one document, nested by level.
pub fn document_symbol(
    workspace: &Workspace,
    _params: &DocumentSymbolParams,
    path: &Path,
) -> Option<DocumentSymbolResponse> {
    let headings = workspace.headings(path);
    let tree = construct_tree(headings)?;
    Some(DocumentSymbolResponse::Nested(map_to_lsp_tree(tree)))
}

#[derive(PartialEq, Debug)]
struct Node {
    heading: Heading,
    children: Option<Vec<Node>>,
}

fn construct_tree(headings: &[Heading]) -> Option<Vec<Node>> {
    match &headings {
        [only] => {
            let node = Node {
                heading: only.clone(),
                children: None,
            };
            Some(vec![node])
        }
        [first, rest @ ..] => {
            let break_index = rest
                .iter()
                .find_position(|heading| first.level >= heading.level);

            match break_index.map(|(index, _)| (&rest[..index], &rest[index..])) {
                Some((to_next, rest)) => {
                    let node = Node {
                        heading: first.clone(),
                        children: construct_tree(to_next),
                    };

                    Some(
                        iter::once(node)
                            .chain(construct_tree(rest).into_iter().flatten())
                            .collect(),
                    )
                }
                None => {
                    let node = Node {
                        heading: first.clone(),
                        children: construct_tree(rest),
                    };
                    Some(vec![node])
                }
            }
        }
        [] => None,
    }
}

#[allow(deprecated)] // field deprecated has been deprecated in favor of using tags
fn map_to_lsp_tree(tree: Vec<Node>) -> Vec<DocumentSymbol> {
    tree.into_iter()
        .map(|node| DocumentSymbol {
            name: node.heading.text,
            kind: SymbolKind::STRUCT,
            deprecated: None,
            tags: None,
            range: node.heading.range.0,
            detail: Some(format!("#{}", node.heading.slug)),
            selection_range: node.heading.range.0,
            children: node.children.map(map_to_lsp_tree),
        })
        .collect()
}
