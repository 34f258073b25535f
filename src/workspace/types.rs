//! Core types for the workspace document model.
//!
//! - `Span`: a wrapper around LSP Range with byte-offset conversion
//! - `Heading`: a parsed heading with its slug and section extent
//! - `Link`: one link occurrence (inline, reference-style, definition, autolink)

use std::ops::{Deref, Range};

use ropey::Rope;
use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::Position;

/// Represents a Markdown heading level (1-6).
#[derive(Eq, PartialEq, Debug, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct HeadingLevel(pub usize);

impl Default for HeadingLevel {
    fn default() -> Self {
        HeadingLevel(1)
    }
}

/// A wrapper around `tower_lsp::lsp_types::Range` with additional utilities.
///
/// Provides conversion from byte offsets to LSP positions using rope-based
/// character counting.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct Span(pub tower_lsp::lsp_types::Range);

impl Span {
    /// Creates a `Span` from a byte offset range using rope for position calculation.
    pub fn from_byte_range(rope: &Rope, range: Range<usize>) -> Span {
        let char_start = rope.byte_to_char(range.start);
        let char_end = rope.byte_to_char(range.end);

        let start_line = rope.char_to_line(char_start);
        let start_offset = char_start - rope.line_to_char(start_line);

        let end_line = rope.char_to_line(char_end);
        let end_offset = char_end - rope.line_to_char(end_line);

        tower_lsp::lsp_types::Range {
            start: Position {
                line: start_line as u32,
                character: start_offset as u32,
            },
            end: Position {
                line: end_line as u32,
                character: end_offset as u32,
            },
        }
        .into()
    }

    /// A span covering `chars` on a single line, given in character columns.
    pub fn on_line(line: u32, chars: Range<u32>) -> Span {
        tower_lsp::lsp_types::Range {
            start: Position {
                line,
                character: chars.start,
            },
            end: Position {
                line,
                character: chars.end,
            },
        }
        .into()
    }
}

impl std::hash::Hash for Span {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.start.line.hash(state);
        self.0.start.character.hash(state);
        self.0.end.line.hash(state);
        self.0.end.character.hash(state);
    }
}

impl Deref for Span {
    type Target = tower_lsp::lsp_types::Range;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<tower_lsp::lsp_types::Range> for Span {
    fn from(range: tower_lsp::lsp_types::Range) -> Self {
        Span(range)
    }
}

/// A parsed heading: display text, document-unique slug, level, and the
/// line extent of the section it opens.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Heading {
    pub text: String,
    /// Unique within the document; duplicates get a `-n` suffix in document order.
    pub slug: String,
    pub level: HeadingLevel,
    /// The `#... text` span itself.
    pub range: Span,
    /// `[heading line, next heading of <= level)` in lines; end is exclusive.
    pub section: Range<u32>,
}

impl std::hash::Hash for Heading {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.level.hash(state);
        self.slug.hash(state);
    }
}

/// Syntactic form of a link occurrence.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum LinkKind {
    /// `[text](target)` or `[text](<target>)`
    Inline,
    /// `[text][name]`
    ReferenceUse,
    /// `[name]: target` at the start of a line
    ReferenceDef,
    /// `<scheme:address>`
    Autolink,
}

/// One link occurrence. Extraction is purely syntactic; the raw target is
/// interpreted later by the resolver.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct Link {
    pub kind: LinkKind,
    /// Span of the whole occurrence.
    pub range: Span,
    /// Target text exactly as written (empty for reference-use links).
    pub raw_target: String,
    /// Span of `raw_target` within the document.
    pub target_span: Span,
    /// Case-normalized, whitespace-collapsed name for reference-use and
    /// reference-definition links.
    pub ref_name: Option<String>,
    /// Span of the name text for reference-use and reference-definition links.
    pub name_span: Option<Span>,
    /// Angle-bracket form; the target is used verbatim, never percent-decoded.
    pub wrapped: bool,
}

impl Link {
    /// Character columns of the anchor portion of the raw target (the text
    /// after `#`), if any. Targets never span lines.
    pub fn anchor_columns(&self) -> Option<Range<u32>> {
        let hash = self.raw_target.find('#')?;
        let chars_before = self.raw_target[..=hash].chars().count() as u32;
        let start = self.target_span.start.character + chars_before;
        Some(start..self.target_span.end.character)
    }

    /// Character columns of the path portion of the raw target (everything
    /// before `#`, or the whole target).
    pub fn path_columns(&self) -> Range<u32> {
        let start = self.target_span.start.character;
        match self.raw_target.find('#') {
            Some(hash) => start..start + self.raw_target[..hash].chars().count() as u32,
            None => start..self.target_span.end.character,
        }
    }
}

/// Case-normalize a reference name: lowercase, whitespace runs collapsed to
/// one space, trimmed.
pub fn normalize_ref_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Trait for types that have a span in the document.
pub trait Rangeable {
    fn range(&self) -> &Span;

    fn includes(&self, other: &impl Rangeable) -> bool {
        let self_range = self.range();
        let other_range = other.range();

        (self_range.start.line < other_range.start.line
            || (self_range.start.line == other_range.start.line
                && self_range.start.character <= other_range.start.character))
            && (self_range.end.line > other_range.end.line
                || (self_range.end.line == other_range.end.line
                    && self_range.end.character >= other_range.end.character))
    }

    fn includes_position(&self, position: Position) -> bool {
        let range = self.range();
        (range.start.line < position.line
            || (range.start.line == position.line && range.start.character <= position.character))
            && (range.end.line > position.line
                || (range.end.line == position.line && range.end.character >= position.character))
    }
}

impl Rangeable for Span {
    fn range(&self) -> &Span {
        self
    }
}

impl Rangeable for Heading {
    fn range(&self) -> &Span {
        &self.range
    }
}

impl Rangeable for Link {
    fn range(&self) -> &Span {
        &self.range
    }
}
