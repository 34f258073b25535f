//! The workspace reference index.
//!
//! A bidirectional edge table: per source document the resolved outgoing
//! edges, and the inverse map from target key to every referencing location.
//! Updated per document; a change to one document never requires touching the
//! edges of another (keys are syntax-normalized, so they do not depend on the
//! target document's content).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tower_lsp::lsp_types::Position;

use super::resolve::TargetKey;
use super::types::LinkKind;
use super::Workspace;

/// One resolved reference: link number `link` in the source document's model
/// points at `key`. Reference-use links contribute a second edge keyed by
/// their definition name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub key: TargetKey,
    pub link: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReferenceIndex {
    outgoing: HashMap<PathBuf, Vec<Edge>>,
    incoming: HashMap<TargetKey, HashSet<(PathBuf, usize)>>,
}

impl ReferenceIndex {
    /// Replace a document's edges: stale edges are removed from the inverse
    /// map, new ones inserted. The swap is wholesale, never partial.
    pub fn update_document(&mut self, path: &Path, edges: Vec<Edge>) {
        self.remove_document(path);
        for edge in &edges {
            self.incoming
                .entry(edge.key.clone())
                .or_default()
                .insert((path.to_path_buf(), edge.link));
        }
        self.outgoing.insert(path.to_path_buf(), edges);
    }

    /// Drop every edge with `path` as source. Edges in other documents that
    /// target `path` stay until their source is next rebuilt; nothing can
    /// query a removed document as a target in the meantime.
    pub fn remove_document(&mut self, path: &Path) {
        let Some(old) = self.outgoing.remove(path) else {
            return;
        };
        for edge in old {
            if let Some(set) = self.incoming.get_mut(&edge.key) {
                set.remove(&(path.to_path_buf(), edge.link));
                if set.is_empty() {
                    self.incoming.remove(&edge.key);
                }
            }
        }
    }

    /// All (source document, link number) pairs referencing `key`, in a
    /// stable order.
    pub fn references_to(&self, key: &TargetKey) -> Vec<(PathBuf, usize)> {
        let mut refs: Vec<(PathBuf, usize)> = self
            .incoming
            .get(key)
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        refs.sort();
        refs
    }

    /// All (source document, link number) pairs whose target document is
    /// `path`, whether or not they carry an anchor.
    pub fn references_to_doc(&self, path: &Path) -> Vec<(PathBuf, usize)> {
        let mut refs: Vec<(PathBuf, usize)> = self
            .incoming
            .iter()
            .filter(|(key, _)| match key {
                TargetKey::Doc(p) | TargetKey::Heading(p, _) => p == path,
                TargetKey::RefDef(..) => false,
            })
            .flat_map(|(_, sources)| sources.iter().cloned())
            .collect();
        refs.sort();
        refs.dedup();
        refs
    }

    pub fn clear(&mut self) {
        self.outgoing.clear();
        self.incoming.clear();
    }
}

/// The index keys a cursor position asks about. A link is more specific than
/// the heading it may sit inside; anywhere else in a known document means the
/// document itself.
pub fn queried_keys(
    workspace: &Workspace,
    path: &Path,
    position: Position,
) -> Option<Vec<TargetKey>> {
    if let Some((_, link)) = workspace.select_link_at_position(path, position) {
        let mut keys = Vec::new();
        if let Some(name) = &link.ref_name {
            keys.push(TargetKey::RefDef(path.to_path_buf(), name.clone()));
        }
        // A definition's references are its uses, not its target's cohort
        if link.kind != LinkKind::ReferenceDef {
            if let Some(key) = workspace.resolve_link(path, link).key(path) {
                keys.push(key);
            }
        }
        return match keys.is_empty() {
            true => None,
            false => Some(keys),
        };
    }

    if let Some(heading) = workspace.select_heading_at_position(path, position) {
        return Some(vec![TargetKey::Heading(
            path.to_path_buf(),
            heading.slug.clone(),
        )]);
    }

    if workspace.contains(path) {
        return Some(vec![TargetKey::Doc(path.to_path_buf())]);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading_key(path: &str, slug: &str) -> TargetKey {
        TargetKey::Heading(PathBuf::from(path), slug.to_string())
    }

    #[test]
    fn update_replaces_stale_edges() {
        let mut index = ReferenceIndex::default();
        let a = PathBuf::from("/ws/a.md");

        index.update_document(
            &a,
            vec![Edge {
                key: heading_key("/ws/b.md", "old"),
                link: 0,
            }],
        );
        assert_eq!(index.references_to(&heading_key("/ws/b.md", "old")).len(), 1);

        index.update_document(
            &a,
            vec![Edge {
                key: heading_key("/ws/b.md", "new"),
                link: 0,
            }],
        );
        assert!(index.references_to(&heading_key("/ws/b.md", "old")).is_empty());
        assert_eq!(index.references_to(&heading_key("/ws/b.md", "new")).len(), 1);
    }

    #[test]
    fn remove_document_drops_outgoing_edges() {
        let mut index = ReferenceIndex::default();
        let a = PathBuf::from("/ws/a.md");
        index.update_document(
            &a,
            vec![Edge {
                key: TargetKey::Doc(PathBuf::from("/ws/b.md")),
                link: 0,
            }],
        );

        index.remove_document(&a);
        assert!(index
            .references_to(&TargetKey::Doc(PathBuf::from("/ws/b.md")))
            .is_empty());
    }

    #[test]
    fn multiple_sources_accumulate() {
        let mut index = ReferenceIndex::default();
        let key = heading_key("/ws/b.md", "intro");
        index.update_document(
            Path::new("/ws/a.md"),
            vec![Edge {
                key: key.clone(),
                link: 0,
            }],
        );
        index.update_document(
            Path::new("/ws/c.md"),
            vec![Edge {
                key: key.clone(),
                link: 2,
            }],
        );

        let refs = index.references_to(&key);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].0, PathBuf::from("/ws/a.md"));
        assert_eq!(refs[1].0, PathBuf::from("/ws/c.md"));
    }
}
