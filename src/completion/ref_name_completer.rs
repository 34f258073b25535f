use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionTextEdit, Position, Range, TextEdit,
};

use crate::workspace::{LinkKind, Workspace};

use super::{fuzzy_rank, Completable, Completer, Context, LineRange};

/// Completes the name of a partial reference-style link `[text][...`.
/// Candidates are the reference definitions of the containing document.
pub struct RefNameCompleter<'a> {
    typed: (String, LineRange<usize>),
    line_nr: usize,
    workspace: &'a Workspace,
    context_path: &'a Path,
}

static PARTIAL_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(?<display>[^\[\]]+)\]\[(?<name>[^\[\]]*)$").unwrap());

impl<'a> Completer<'a> for RefNameCompleter<'a> {
    fn construct(context: Context<'a>, line: usize, character: usize) -> Option<Self> {
        let line_chars = context.workspace.select_line(context.path, line)?;
        let line_to_cursor = String::from_iter(line_chars.get(0..character)?);

        let captures = PARTIAL_REF_RE.captures(&line_to_cursor)?;
        let name = captures.name("name")?;

        Some(RefNameCompleter {
            typed: (name.as_str().to_string(), name.range()),
            line_nr: line,
            workspace: context.workspace,
            context_path: context.path,
        })
    }

    fn completions(&self) -> Vec<impl Completable<'a, RefNameCompleter<'a>>> {
        let names: Vec<RefNameCompletion> = self
            .workspace
            .links(self.context_path)
            .iter()
            .filter(|link| link.kind == LinkKind::ReferenceDef)
            .filter_map(|link| {
                Some(RefNameCompletion {
                    name: link.ref_name.clone()?,
                    target: link.raw_target.clone(),
                })
            })
            .collect();
        fuzzy_rank(&self.typed.0, names, |c| c.name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefNameCompletion {
    name: String,
    target: String,
}

impl<'a> Completable<'a, RefNameCompleter<'a>> for RefNameCompletion {
    fn completions(&self, completer: &RefNameCompleter<'a>) -> Option<CompletionItem> {
        Some(CompletionItem {
            label: self.name.clone(),
            detail: Some(self.target.clone()),
            kind: Some(CompletionItemKind::REFERENCE),
            text_edit: Some(CompletionTextEdit::Edit(TextEdit {
                range: Range {
                    start: Position {
                        line: completer.line_nr as u32,
                        character: completer.typed.1.start as u32,
                    },
                    end: Position {
                        line: completer.line_nr as u32,
                        character: completer.typed.1.end as u32,
                    },
                },
                new_text: self.name.clone(),
            })),
            ..Default::default()
        })
    }
}
