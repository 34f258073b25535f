//! The in-memory model of a Markdown workspace.
//!
//! One [`DocumentState`] per recognized file: its version, text rope, and the
//! structural model (headings with slugs and section extents, link
//! occurrences, reference definitions). The [`ReferenceIndex`] aggregates the
//! per-document models into a workspace-wide edge table.
//!
//! The methods on [`Workspace`] only select data; interpretation is up to the
//! feature modules. A document edit replaces that document's state wholesale
//! and patches only that document's edges.

mod parse;
mod slug;
mod types;

pub mod index;
pub mod resolve;

pub use parse::CodeBlock;
pub use slug::{slugify, SlugCounter};
pub use types::{normalize_ref_name, Heading, HeadingLevel, Link, LinkKind, Rangeable, Span};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use ropey::Rope;
use tower_lsp::lsp_types::{Location, Position, Range, Url};
use walkdir::WalkDir;

use crate::config::Settings;
use index::{Edge, ReferenceIndex};
use resolve::{Target, TargetKey};
use tokio_util::sync::CancellationToken;

/// Headings and links of one document, valid for exactly one version.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct DocumentModel {
    pub headings: Vec<Heading>,
    pub links: Vec<Link>,
}

impl DocumentModel {
    fn new(settings: &Settings, text: &str, rope: &Rope) -> DocumentModel {
        let blocks = CodeBlock::parse(text);

        let parsed = parse::headings(text, rope, &blocks);
        let total_lines = rope.len_lines() as u32;

        let mut counter = SlugCounter::new();
        let mut headings: Vec<Heading> = parsed
            .iter()
            .map(|(level, heading_text, span)| Heading {
                slug: counter.unique(&slugify(heading_text)),
                text: heading_text.clone(),
                level: *level,
                range: *span,
                section: span.start.line..total_lines,
            })
            .collect();

        // Section of heading i runs until the next heading of <= its level
        for i in 0..headings.len() {
            let end = headings[i + 1..]
                .iter()
                .find(|later| later.level <= headings[i].level)
                .map(|later| later.range.start.line)
                .unwrap_or(total_lines);
            headings[i].section = headings[i].range.start.line..end;
        }

        let links = parse::links(text, rope, &blocks, settings.references_in_codeblocks);

        DocumentModel { headings, links }
    }
}

/// Cache entry for one document. Replaced build-then-swap on every version
/// change; a reader sees the old entry or the fully built new one.
#[derive(Debug, Clone)]
pub struct DocumentState {
    pub version: i32,
    pub rope: Rope,
    pub model: DocumentModel,
}

/// The workspace: document store plus reference index.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    docs: HashMap<PathBuf, DocumentState>,
    index: ReferenceIndex,
    root_dir: PathBuf,
    extensions: Vec<String>,
}

impl Workspace {
    /// Scan `root_dir` and build models for every recognized document.
    pub fn construct(settings: &Settings, root_dir: &Path) -> Result<Workspace, std::io::Error> {
        let paths = markdown_file_paths(root_dir, &settings.file_extensions);

        let docs: HashMap<PathBuf, DocumentState> = paths
            .par_iter()
            .flat_map(|path| {
                let text = std::fs::read_to_string(path)?;
                let rope = Rope::from_str(&text);
                let model = DocumentModel::new(settings, &text, &rope);
                Ok::<(PathBuf, DocumentState), std::io::Error>((
                    path.clone(),
                    DocumentState {
                        version: 0,
                        rope,
                        model,
                    },
                ))
            })
            .collect();

        let mut workspace = Workspace {
            docs,
            index: ReferenceIndex::default(),
            root_dir: root_dir.to_path_buf(),
            extensions: settings.file_extensions.clone(),
        };
        workspace.reindex_all();
        Ok(workspace)
    }

    /// Replace one document's state and patch its edges. A document that is
    /// new to the workspace also re-resolves other documents' edges, so
    /// previously unresolved links pick it up.
    pub fn update_document(&mut self, settings: &Settings, path: &Path, text: &str, version: i32) {
        let rope = Rope::from_str(text);
        let model = DocumentModel::new(settings, text, &rope);
        let existed = self
            .docs
            .insert(
                path.to_path_buf(),
                DocumentState {
                    version,
                    rope,
                    model,
                },
            )
            .is_some();

        if existed {
            self.reindex_document(path);
        } else {
            self.reindex_all();
        }
    }

    /// Drop a deleted document. Its outgoing edges go with it; documents that
    /// pointed at it degrade to unresolved on their next rebuild.
    pub fn remove_document(&mut self, path: &Path) {
        self.docs.remove(path);
        self.index.remove_document(path);
    }

    /// Pull in any on-disk documents not yet indexed (cold-start rule for
    /// workspace-wide queries). Checks the cancellation token per document;
    /// returns false if cancelled before completing.
    pub fn ensure_indexed(&mut self, settings: &Settings, cancel: &CancellationToken) -> bool {
        let mut added = false;
        for path in markdown_file_paths(&self.root_dir, &self.extensions) {
            if cancel.is_cancelled() {
                return false;
            }
            if self.docs.contains_key(&path) {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(&path) else {
                continue;
            };
            let rope = Rope::from_str(&text);
            let model = DocumentModel::new(settings, &text, &rope);
            self.docs.insert(
                path,
                DocumentState {
                    version: 0,
                    rope,
                    model,
                },
            );
            added = true;
        }
        if added {
            self.reindex_all();
        }
        true
    }

    /// Release all cached entries and index tables.
    pub fn dispose(&mut self) {
        self.docs.clear();
        self.index.clear();
    }

    fn reindex_document(&mut self, path: &Path) {
        let edges = self.compute_edges(path);
        self.index.update_document(path, edges);
    }

    fn reindex_all(&mut self) {
        let paths: Vec<PathBuf> = self.docs.keys().cloned().collect();
        for path in paths {
            self.reindex_document(&path);
        }
    }

    fn compute_edges(&self, path: &Path) -> Vec<Edge> {
        let Some(state) = self.docs.get(path) else {
            return Vec::new();
        };

        let mut edges = Vec::new();
        for (nr, link) in state.model.links.iter().enumerate() {
            if let Some(key) = self.resolve_link(path, link).key(path) {
                edges.push(Edge { key, link: nr });
            }
            // Reference-style uses also reference their definition by name
            if link.kind == LinkKind::ReferenceUse {
                if let Some(name) = &link.ref_name {
                    edges.push(Edge {
                        key: TargetKey::RefDef(path.to_path_buf(), name.clone()),
                        link: nr,
                    });
                }
            }
        }
        edges
    }
}

/// Selection methods; no interpretation, only lookups.
impl Workspace {
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.docs.contains_key(path)
    }

    pub fn document(&self, path: &Path) -> Option<&DocumentState> {
        self.docs.get(path)
    }

    pub fn documents(&self) -> impl Iterator<Item = (&PathBuf, &DocumentState)> {
        self.docs.iter()
    }

    pub fn headings(&self, path: &Path) -> &[Heading] {
        self.docs
            .get(path)
            .map(|state| state.model.headings.as_slice())
            .unwrap_or_default()
    }

    pub fn links(&self, path: &Path) -> &[Link] {
        self.docs
            .get(path)
            .map(|state| state.model.links.as_slice())
            .unwrap_or_default()
    }

    pub fn resolve_link(&self, path: &Path, link: &Link) -> Target {
        resolve::resolve(self, path, link)
    }

    /// The winning reference definition for a normalized name: the last one
    /// in the document.
    pub fn reference_definition(&self, path: &Path, name: &str) -> Option<&Link> {
        self.links(path)
            .iter()
            .filter(|link| {
                link.kind == LinkKind::ReferenceDef && link.ref_name.as_deref() == Some(name)
            })
            .next_back()
    }

    pub fn select_link_at_position(
        &self,
        path: &Path,
        position: Position,
    ) -> Option<(usize, &Link)> {
        self.links(path)
            .iter()
            .enumerate()
            .find(|(_, link)| link.includes_position(position))
    }

    pub fn select_heading_at_position(&self, path: &Path, position: Position) -> Option<&Heading> {
        self.headings(path)
            .iter()
            .find(|heading| heading.includes_position(position))
    }

    /// Case-insensitive slug lookup.
    pub fn heading_by_slug<'a>(&'a self, path: &Path, slug: &str) -> Option<&'a Heading> {
        let wanted = slug.to_lowercase();
        self.headings(path)
            .iter()
            .find(|heading| heading.slug.to_lowercase() == wanted)
    }

    pub fn select_line(&self, path: &Path, line: usize) -> Option<Vec<char>> {
        let state = self.docs.get(path)?;
        state.rope.get_line(line).map(|slice| slice.chars().collect())
    }

    /// All (source path, link number) pairs in the index referencing `key`.
    pub fn references_to(&self, key: &TargetKey) -> Vec<(PathBuf, usize)> {
        self.index.references_to(key)
    }

    /// All (source path, link number) pairs targeting any part of a document.
    pub fn references_to_doc(&self, path: &Path) -> Vec<(PathBuf, usize)> {
        self.index.references_to_doc(path)
    }

    pub fn link(&self, path: &Path, nr: usize) -> Option<&Link> {
        self.links(path).get(nr)
    }

    pub fn location(&self, path: &Path, span: &Span) -> Option<Location> {
        Some(Location {
            uri: Url::from_file_path(path).ok()?,
            range: span.0,
        })
    }

    /// Location pointing at the start of a document.
    pub fn document_location(&self, path: &Path) -> Option<Location> {
        Some(Location {
            uri: Url::from_file_path(path).ok()?,
            range: Range {
                start: Position::new(0, 0),
                end: Position::new(0, 1),
            },
        })
    }

    /// Workspace-relative display name for a document, without extension.
    pub fn relative_name(&self, path: &Path) -> Option<String> {
        pathdiff::diff_paths(path, &self.root_dir)
            .and_then(|diff| diff.with_extension("").to_str().map(String::from))
    }

    /// Directory entries as (name, is_directory), empty on any read failure.
    pub fn read_directory(&self, dir: &Path) -> Vec<(String, bool)> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut listed: Vec<(String, bool)> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                let is_dir = entry.file_type().ok()?.is_dir();
                Some((name, is_dir))
            })
            .collect();
        listed.sort();
        listed
    }
}

fn markdown_file_paths(root_dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    WalkDir::new(root_dir)
        .into_iter()
        .filter_entry(|entry| {
            !entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with('.'))
                .unwrap_or(false)
        })
        .flatten()
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|wanted| wanted == ext))
        })
        .map(|entry| entry.path().to_path_buf())
        .collect()
}
