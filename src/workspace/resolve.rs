//! Normalization of raw link targets into resolved targets.
//!
//! A raw target is interpreted in order: scheme-qualified targets are
//! external resources; a bare `#fragment` is an anchor in the same document;
//! anything else is a path (leading `/` against the workspace root, otherwise
//! relative to the containing document) plus an optional anchor. Reference-use
//! links resolve in two steps through the same-document definition with the
//! matching normalized name, last definition winning.

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{Link, LinkKind};
use super::Workspace;

/// The canonical interpretation of a link's destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Anchor in the containing document, lowercased.
    Anchor(String),
    /// Another workspace document, with an optional anchor. A fragment that
    /// matches no slug in the target document keeps the document resolution
    /// and records the mismatch; it is a warning, not a failure.
    Doc {
        path: PathBuf,
        anchor: Option<String>,
        anchor_resolved: bool,
    },
    /// Scheme-qualified resource; kept opaque and never resolved further.
    External(String),
    Unresolved(String),
}

/// Hashable index key for a resolved target. Anchors are stored lowercased,
/// so a key is stable under edits to the target document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetKey {
    Doc(PathBuf),
    Heading(PathBuf, String),
    RefDef(PathBuf, String),
}

impl Target {
    /// The index key this target contributes an edge to, if it is indexable.
    /// External and unresolved targets never are.
    pub fn key(&self, source: &Path) -> Option<TargetKey> {
        match self {
            Target::Anchor(slug) => Some(TargetKey::Heading(source.to_path_buf(), slug.clone())),
            Target::Doc {
                path,
                anchor: Some(anchor),
                ..
            } => Some(TargetKey::Heading(path.clone(), anchor.clone())),
            Target::Doc { path, anchor: None, .. } => Some(TargetKey::Doc(path.clone())),
            Target::External(_) | Target::Unresolved(_) => None,
        }
    }
}

static SCHEME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][\w\-]*:").unwrap());

/// Resolve one link occurrence against the workspace.
pub fn resolve(workspace: &Workspace, source: &Path, link: &Link) -> Target {
    match link.kind {
        LinkKind::ReferenceUse => {
            let name = link.ref_name.as_deref().unwrap_or_default();
            match workspace.reference_definition(source, name) {
                Some(def) => resolve_raw(workspace, source, &def.raw_target, def.wrapped),
                None => Target::Unresolved(format!("[{}]", name)),
            }
        }
        _ => resolve_raw(workspace, source, &link.raw_target, link.wrapped),
    }
}

/// Resolve a raw target string. `verbatim` suppresses percent-decoding
/// (angle-bracket syntax).
pub fn resolve_raw(workspace: &Workspace, source: &Path, raw: &str, verbatim: bool) -> Target {
    if raw.is_empty() {
        return Target::Unresolved(String::new());
    }
    if SCHEME_RE.is_match(raw) {
        return Target::External(raw.to_string());
    }

    let (path_part, fragment) = match raw.split_once('#') {
        Some((path_part, fragment)) => (path_part, Some(fragment)),
        None => (raw, None),
    };

    if path_part.is_empty() {
        return match fragment {
            Some(fragment) => Target::Anchor(fragment.to_lowercase()),
            None => Target::Unresolved(raw.to_string()),
        };
    }

    match resolve_doc_path(workspace, source, path_part, verbatim) {
        None => Target::Unresolved(raw.to_string()),
        Some(path) => {
            let anchor = fragment.map(str::to_lowercase);
            let anchor_resolved = match &anchor {
                None => true,
                Some(anchor) => workspace
                    .headings(&path)
                    .iter()
                    .any(|heading| heading.slug.to_lowercase() == *anchor),
            };
            Target::Doc {
                path,
                anchor,
                anchor_resolved,
            }
        }
    }
}

/// Resolve the path portion of a target to a known workspace document.
/// Extensionless paths also try the recognized Markdown extensions.
pub fn resolve_doc_path(
    workspace: &Workspace,
    source: &Path,
    path_part: &str,
    verbatim: bool,
) -> Option<PathBuf> {
    let decoded = if verbatim {
        path_part.to_string()
    } else {
        urlencoding::decode(path_part)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| path_part.to_string())
    };

    let candidate = match decoded.strip_prefix('/') {
        Some(rest) => workspace.root_dir().join(rest),
        None => source.parent()?.join(&decoded),
    };
    let candidate = normalize_path(&candidate);

    if workspace.contains(&candidate) {
        return Some(candidate);
    }
    if candidate.extension().is_none() {
        for ext in workspace.extensions() {
            let with_ext = candidate.with_extension(ext);
            if workspace.contains(&with_ext) {
                return Some(with_ext);
            }
        }
    }
    None
}

/// Collapse `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}
