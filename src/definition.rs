use std::path::Path;

use tower_lsp::lsp_types::{Location, Position};

use crate::workspace::resolve::Target;
use crate::workspace::{LinkKind, Workspace};

/// Resolve the link under the cursor to its declaration site.
///
/// A document target lands on the target document (or the anchored heading
/// within it); a bare anchor lands on the heading in the same document; a
/// reference-style use lands on its winning definition line. External and
/// unresolved targets have no definition.
pub fn goto_definition(
    workspace: &Workspace,
    cursor_position: Position,
    path: &Path,
) -> Option<Vec<Location>> {
    let (_, link) = workspace.select_link_at_position(path, cursor_position)?;

    // On a reference-style use, jump to the definition line itself
    if link.kind == LinkKind::ReferenceUse {
        let name = link.ref_name.as_deref()?;
        let def = workspace.reference_definition(path, name)?;
        return Some(workspace.location(path, &def.range).into_iter().collect());
    }

    let location = match workspace.resolve_link(path, link) {
        Target::Anchor(slug) => {
            let heading = workspace.heading_by_slug(path, &slug)?;
            workspace.location(path, &heading.range)
        }
        Target::Doc {
            path: target,
            anchor: Some(anchor),
            anchor_resolved: true,
        } => {
            let heading = workspace.heading_by_slug(&target, &anchor)?;
            workspace.location(&target, &heading.range)
        }
        Target::Doc { path: target, .. } => workspace.document_location(&target),
        Target::External(_) | Target::Unresolved(_) => return Some(Vec::new()),
    };

    Some(location.into_iter().collect())
}
