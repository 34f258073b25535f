use std::path::Path;

use tower_lsp::lsp_types::{
    FoldingRange, FoldingRangeKind, Position, Range, SelectionRange,
};

use crate::workspace::{Rangeable, Workspace};

/// One folding range per heading section that spans more than its own line.
pub fn folding_ranges(workspace: &Workspace, path: &Path) -> Option<Vec<FoldingRange>> {
    let state = workspace.document(path)?;
    let last_line = state.rope.len_lines().saturating_sub(1) as u32;

    let ranges: Vec<FoldingRange> = state
        .model
        .headings
        .iter()
        .filter(|heading| heading.section.end > heading.section.start + 1)
        .map(|heading| FoldingRange {
            start_line: heading.section.start,
            start_character: None,
            // The section extent is exclusive and clamped to the document
            end_line: heading.section.end.saturating_sub(1).min(last_line),
            end_character: None,
            kind: Some(FoldingRangeKind::Region),
            collapsed_text: Some(heading.text.clone()),
        })
        .collect();

    match ranges.is_empty() {
        true => None,
        false => Some(ranges),
    }
}

/// Expanding selections: link target, whole link, enclosing heading sections
/// innermost first, then the whole document.
pub fn selection_ranges(
    workspace: &Workspace,
    path: &Path,
    positions: &[Position],
) -> Option<Vec<SelectionRange>> {
    let state = workspace.document(path)?;
    let last_line = state.rope.len_lines().saturating_sub(1) as u32;

    let document_range = SelectionRange {
        range: Range {
            start: Position::new(0, 0),
            end: Position::new(last_line, 0),
        },
        parent: None,
    };

    let ranges = positions
        .iter()
        .map(|position| {
            let mut chain = document_range.clone();

            // Enclosing sections, outermost first so the innermost tops the chain
            let mut sections: Vec<&crate::workspace::Heading> = state
                .model
                .headings
                .iter()
                .filter(|heading| heading.section.contains(&position.line))
                .collect();
            sections.sort_by_key(|heading| heading.level);
            for heading in sections {
                chain = SelectionRange {
                    range: Range {
                        start: Position::new(heading.section.start, 0),
                        end: Position::new(heading.section.end.min(last_line + 1), 0),
                    },
                    parent: Some(Box::new(chain)),
                };
            }

            if let Some((_, link)) = workspace.select_link_at_position(path, *position) {
                chain = SelectionRange {
                    range: link.range.0,
                    parent: Some(Box::new(chain)),
                };
                if link.target_span.includes_position(*position) {
                    chain = SelectionRange {
                        range: link.target_span.0,
                        parent: Some(Box::new(chain)),
                    };
                }
            }

            chain
        })
        .collect();

    Some(ranges)
}
