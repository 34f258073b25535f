use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::{
    Command, CompletionItem, CompletionItemKind, CompletionTextEdit, InsertReplaceEdit, Position,
    Range,
};

use crate::{
    config::Settings,
    workspace::{resolve, CodeBlock, Workspace},
};

use super::{fuzzy_rank, Completable, Completer, Context, LineRange};

/// Completes the target of a partial inline link `[text](...` or reference
/// definition `[name]: ...`.
///
/// Before `#` is typed the candidates are directory entries relative to the
/// typed prefix; after `#` they are the heading slugs of the target document.
pub struct LinkCompleter<'a> {
    /// Path portion as typed, up to `#` or the cursor.
    path_part: (String, LineRange<usize>),
    /// Anchor portion after `#`, present once `#` is typed.
    anchor: Option<(String, LineRange<usize>)>,
    /// Angle-bracket form; inserted names are kept verbatim, not
    /// percent-encoded.
    wrapped: bool,
    /// Length of the word characters directly after the cursor; replacing an
    /// anchor also consumes them.
    anchor_suffix_len: usize,
    /// Length of the path characters directly after the cursor, consumed
    /// when replacing a path.
    path_suffix_len: usize,
    /// A `>` already sits right after the replaced path suffix; wrapped
    /// insertions must not add a second one.
    has_closing_angle: bool,
    line_nr: usize,
    workspace: &'a Workspace,
    context_path: &'a Path,
    settings: &'a Settings,
}

static PARTIAL_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(?<display>[^\[\]()]*)\]\((?<path>[^\[\]()#\s]*)(#(?<anchor>[^\[\]()]*))?$")
        .unwrap()
});

static PARTIAL_REF_DEF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ {0,3}\[(?<name>[^\[\]]+)\]: +(?<path>[^#\s]*)(#(?<anchor>[^\s]*))?$").unwrap()
});

static PREFIX_SCHEME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][\w\-]*:").unwrap());

fn in_code_block(workspace: &Workspace, path: &Path, line: usize) -> bool {
    let Some(state) = workspace.document(path) else {
        return false;
    };
    CodeBlock::parse(&state.rope.to_string())
        .iter()
        .any(|block| block.contains_line(line))
}

impl<'a> Completer<'a> for LinkCompleter<'a> {
    fn construct(context: Context<'a>, line: usize, character: usize) -> Option<Self> {
        if !context.settings.references_in_codeblocks
            && in_code_block(context.workspace, context.path, line)
        {
            return None;
        }

        let line_chars = context.workspace.select_line(context.path, line)?;
        let line_to_cursor = String::from_iter(line_chars.get(0..character)?);

        let captures = PARTIAL_LINK_RE
            .captures(&line_to_cursor)
            .or_else(|| PARTIAL_REF_DEF_RE.captures(&line_to_cursor))?;
        let path_part = captures.name("path")?;
        let anchor = captures.name("anchor");

        // Angle brackets mark a verbatim target
        let (typed_path, wrapped) = match path_part.as_str().strip_prefix('<') {
            Some(rest) => (rest.to_string(), true),
            None => (path_part.as_str().to_string(), false),
        };
        // Scheme-qualified prefixes are external targets; nothing to offer
        if PREFIX_SCHEME_RE.is_match(&typed_path) {
            return None;
        }

        let after_cursor = &line_chars[character..];
        let anchor_suffix_len = after_cursor
            .iter()
            .take_while(|c| c.is_alphanumeric() || **c == '-' || **c == '_')
            .count();
        let path_suffix_len = after_cursor
            .iter()
            .take_while(|c| !c.is_whitespace() && !"()[]#<>".contains(**c))
            .count();
        let has_closing_angle = after_cursor.get(path_suffix_len) == Some(&'>');

        Some(LinkCompleter {
            path_part: (typed_path, path_part.range()),
            anchor: anchor.map(|m| (m.as_str().to_string(), m.range())),
            wrapped,
            anchor_suffix_len,
            path_suffix_len,
            has_closing_angle,
            line_nr: line,
            workspace: context.workspace,
            context_path: context.path,
            settings: context.settings,
        })
    }

    fn completions(&self) -> Vec<impl Completable<'a, LinkCompleter<'a>>> {
        match &self.anchor {
            Some((typed, _)) => {
                if !self.settings.heading_completions {
                    return Vec::new();
                }
                let Some(target) = self.anchor_target() else {
                    return Vec::new();
                };
                let slugs: Vec<LinkCompletion> = self
                    .workspace
                    .headings(&target)
                    .iter()
                    .map(|heading| LinkCompletion::Anchor {
                        slug: heading.slug.clone(),
                        heading_text: heading.text.clone(),
                    })
                    .collect();
                fuzzy_rank(typed, slugs, LinkCompletion::name)
            }
            None => {
                let (dir_prefix, partial) = split_dir_prefix(&self.path_part.0);
                let Some(dir) = self.listed_directory(dir_prefix) else {
                    return Vec::new();
                };
                let entries: Vec<LinkCompletion> = self
                    .workspace
                    .read_directory(&dir)
                    .into_iter()
                    .filter_map(|(name, is_dir)| {
                        // Only dot-prefixed entries are hidden; non-Markdown
                        // assets are linkable targets too
                        if name.starts_with('.') {
                            return None;
                        }
                        Some(LinkCompletion::Path {
                            prefix: dir_prefix.to_string(),
                            name,
                            is_dir,
                        })
                    })
                    .collect();
                fuzzy_rank(partial, entries, LinkCompletion::name)
            }
        }
    }
}

impl<'a> LinkCompleter<'a> {
    /// The document whose headings complete the anchor portion.
    fn anchor_target(&self) -> Option<PathBuf> {
        match self.path_part.0.is_empty() {
            true => Some(self.context_path.to_path_buf()),
            false => resolve::resolve_doc_path(
                self.workspace,
                self.context_path,
                &self.path_part.0,
                self.wrapped,
            ),
        }
    }

    /// The on-disk directory named by the typed prefix.
    fn listed_directory(&self, dir_prefix: &str) -> Option<PathBuf> {
        let dir = match dir_prefix.strip_prefix('/') {
            Some(rest) => self.workspace.root_dir().join(rest),
            None => self.context_path.parent()?.join(dir_prefix),
        };
        Some(resolve::normalize_path(&dir))
    }

    fn replace_range(&self, chars: LineRange<usize>) -> Range {
        Range {
            start: Position {
                line: self.line_nr as u32,
                character: chars.start as u32,
            },
            end: Position {
                line: self.line_nr as u32,
                character: chars.end as u32,
            },
        }
    }
}

/// Splits a typed path into the directory prefix (through the last `/`) and
/// the partial entry name after it.
fn split_dir_prefix(typed: &str) -> (&str, &str) {
    match typed.rfind('/') {
        Some(slash) => (&typed[..=slash], &typed[slash + 1..]),
        None => ("", typed),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCompletion {
    Path {
        prefix: String,
        name: String,
        is_dir: bool,
    },
    Anchor {
        slug: String,
        heading_text: String,
    },
}

impl LinkCompletion {
    fn name(&self) -> String {
        match self {
            LinkCompletion::Path { name, .. } => name.clone(),
            LinkCompletion::Anchor { slug, .. } => slug.clone(),
        }
    }
}

impl<'a> Completable<'a, LinkCompleter<'a>> for LinkCompletion {
    fn completions(&self, completer: &LinkCompleter<'a>) -> Option<CompletionItem> {
        match self {
            LinkCompletion::Path {
                prefix,
                name,
                is_dir,
            } => {
                let shown = match is_dir {
                    true => format!("{}/", name),
                    false if !completer.settings.include_extension_in_completion => Path::new(name)
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .unwrap_or(name)
                        .to_string(),
                    false => name.clone(),
                };
                // Verbatim inside angle brackets, percent-encoded otherwise.
                // Directories stay open so the next completion continues the
                // path inside the brackets.
                let inserted = match completer.wrapped {
                    true if *is_dir || completer.has_closing_angle => {
                        format!("<{}{}", prefix, shown)
                    }
                    true => format!("<{}{}>", prefix, shown),
                    false => format!(
                        "{}{}",
                        prefix,
                        urlencoding::encode(&shown).replace("%2F", "/")
                    ),
                };
                Some(CompletionItem {
                    label: shown.clone(),
                    kind: Some(match is_dir {
                        true => CompletionItemKind::FOLDER,
                        false => CompletionItemKind::FILE,
                    }),
                    filter_text: Some(inserted.clone()),
                    text_edit: Some(CompletionTextEdit::InsertAndReplace(InsertReplaceEdit {
                        insert: completer.replace_range(completer.path_part.1.clone()),
                        replace: completer.replace_range(
                            completer.path_part.1.start
                                ..completer.path_part.1.end + completer.path_suffix_len,
                        ),
                        new_text: inserted,
                    })),
                    // Entering a directory immediately offers its contents
                    command: is_dir.then(|| Command {
                        title: "Suggest".to_string(),
                        command: "editor.action.triggerSuggest".to_string(),
                        arguments: None,
                    }),
                    ..Default::default()
                })
            }
            LinkCompletion::Anchor { slug, heading_text } => {
                let (_, anchor_range) = completer.anchor.as_ref()?;
                // Inserting keeps what follows the cursor; replacing also
                // consumes the word suffix after it
                let insert = completer.replace_range(anchor_range.clone());
                let replace = completer.replace_range(
                    anchor_range.start..anchor_range.end + completer.anchor_suffix_len,
                );
                Some(CompletionItem {
                    label: slug.clone(),
                    detail: Some(heading_text.clone()),
                    kind: Some(CompletionItemKind::REFERENCE),
                    text_edit: Some(CompletionTextEdit::InsertAndReplace(InsertReplaceEdit {
                        new_text: slug.clone(),
                        insert,
                        replace,
                    })),
                    ..Default::default()
                })
            }
        }
    }
}
