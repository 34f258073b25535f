//! Regex-driven extraction of headings, links, and reference definitions.
//!
//! Extraction is purely syntactic. Targets are kept exactly as written and
//! interpreted later by the resolver. Occurrences inside fenced code blocks
//! are excluded (links optionally, per settings).

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use ropey::Rope;

use super::types::{normalize_ref_name, HeadingLevel, Link, LinkKind, Span};

/// A fenced code region, tracked by line extent (fence lines included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub lines: Range<usize>,
}

impl CodeBlock {
    pub fn parse(text: &str) -> Vec<CodeBlock> {
        let mut blocks = Vec::new();
        let mut open: Option<(usize, &str)> = None;

        for (nr, line) in text.lines().enumerate() {
            let trimmed = line.trim_start();
            let fence = if trimmed.starts_with("```") {
                "```"
            } else if trimmed.starts_with("~~~") {
                "~~~"
            } else {
                continue;
            };

            match open {
                Some((start, open_fence)) if open_fence == fence => {
                    blocks.push(CodeBlock {
                        lines: start..nr + 1,
                    });
                    open = None;
                }
                Some(_) => {}
                None => open = Some((nr, fence)),
            }
        }

        // An unclosed fence swallows the rest of the document
        if let Some((start, _)) = open {
            blocks.push(CodeBlock {
                lines: start..usize::MAX,
            });
        }

        blocks
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.lines.contains(&line)
    }
}

fn in_code_block(blocks: &[CodeBlock], span: &Span) -> bool {
    blocks
        .iter()
        .any(|block| block.contains_line(span.start.line as usize))
}

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(?<hashes>#{1,6}) +(?<text>[^\r\n]+)").unwrap());

/// Headings in source order as (level, trimmed display text, span).
/// Slugs and section extents are assigned by the document model build.
pub fn headings(text: &str, rope: &Rope, blocks: &[CodeBlock]) -> Vec<(HeadingLevel, String, Span)> {
    HEADING_RE
        .captures_iter(text)
        .filter_map(|c| {
            let (full, hashes, heading_text) = (c.get(0)?, c.name("hashes")?, c.name("text")?);
            let span = Span::from_byte_range(rope, full.range());
            if in_code_block(blocks, &span) {
                return None;
            }
            Some((
                HeadingLevel(hashes.as_str().len()),
                heading_text.as_str().trim_end().to_string(),
                span,
            ))
        })
        .collect()
}

static INLINE_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(?<text>[^\[\]]*)\]\((?:<(?<wrapped>[^<>\r\n]*)>|(?<target>[^()<>\s]*))\)")
        .unwrap()
});

static REFERENCE_USE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(?<text>[^\[\]]+)\]\[(?<name>[^\[\]]+)\]").unwrap());

static REFERENCE_DEF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^ {0,3}\[(?<name>[^\[\]]+)\]: +(?<target><[^<>\r\n]*>|\S+)").unwrap()
});

static AUTOLINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?<target>[A-Za-z][A-Za-z0-9+.-]*:[^<>\s]+)>").unwrap());

/// All link occurrences in source order.
pub fn links(text: &str, rope: &Rope, blocks: &[CodeBlock], links_in_codeblocks: bool) -> Vec<Link> {
    let inline = INLINE_LINK_RE.captures_iter(text).filter_map(|c| {
        let full = c.get(0)?;
        let (target, wrapped) = match (c.name("wrapped"), c.name("target")) {
            (Some(target), _) => (target, true),
            (None, Some(target)) => (target, false),
            (None, None) => return None,
        };
        Some(Link {
            kind: LinkKind::Inline,
            range: Span::from_byte_range(rope, full.range()),
            raw_target: target.as_str().to_string(),
            target_span: Span::from_byte_range(rope, target.range()),
            ref_name: None,
            name_span: None,
            wrapped,
        })
    });

    let reference_uses = REFERENCE_USE_RE.captures_iter(text).filter_map(|c| {
        let (full, name) = (c.get(0)?, c.name("name")?);
        Some(Link {
            kind: LinkKind::ReferenceUse,
            range: Span::from_byte_range(rope, full.range()),
            raw_target: String::new(),
            target_span: Span::from_byte_range(rope, name.range()),
            ref_name: Some(normalize_ref_name(name.as_str())),
            name_span: Some(Span::from_byte_range(rope, name.range())),
            wrapped: false,
        })
    });

    let reference_defs = REFERENCE_DEF_RE.captures_iter(text).filter_map(|c| {
        let (full, name, target) = (c.get(0)?, c.name("name")?, c.name("target")?);
        let raw = target.as_str();
        let (raw_target, target_range, wrapped) =
            if raw.starts_with('<') && raw.ends_with('>') && raw.len() >= 2 {
                (
                    raw[1..raw.len() - 1].to_string(),
                    target.start() + 1..target.end() - 1,
                    true,
                )
            } else {
                (raw.to_string(), target.range(), false)
            };
        Some(Link {
            kind: LinkKind::ReferenceDef,
            range: Span::from_byte_range(rope, full.range()),
            raw_target,
            target_span: Span::from_byte_range(rope, target_range),
            ref_name: Some(normalize_ref_name(name.as_str())),
            name_span: Some(Span::from_byte_range(rope, name.range())),
            wrapped,
        })
    });

    let autolinks = AUTOLINK_RE.captures_iter(text).filter_map(|c| {
        let (full, target) = (c.get(0)?, c.name("target")?);
        Some(Link {
            kind: LinkKind::Autolink,
            range: Span::from_byte_range(rope, full.range()),
            raw_target: target.as_str().to_string(),
            target_span: Span::from_byte_range(rope, target.range()),
            ref_name: None,
            name_span: None,
            wrapped: false,
        })
    });

    let mut all: Vec<Link> = inline
        .chain(reference_uses)
        .chain(reference_defs)
        .chain(autolinks)
        .filter(|link| links_in_codeblocks || !in_code_block(blocks, &link.range))
        .collect();

    all.sort_by_key(|link| (link.range.start.line, link.range.start.character));
    all
}
