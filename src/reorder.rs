//! Sibling reordering.

use crate::tree::Forest;
use crate::types::NodeId;

/// Moves `source` to the index currently held by `target` within their shared
/// sibling group, shifting the siblings in between.
///
/// Works on a clone; the input forest is never touched. Returns `None` when
/// there is nothing to do:
/// - `source == target`
/// - either id is not in the forest
/// - the two nodes have different parents (re-parenting is not a reorder)
pub fn reorder<P>(forest: &Forest<P>, source: NodeId, target: NodeId) -> Option<Forest<P>> {
    if source == target {
        return None;
    }
    let from = forest.locate(source)?;
    let to = forest.locate(target)?;
    if from.parent_id != to.parent_id {
        return None;
    }

    let mut next = forest.clone();
    let siblings = next.siblings_mut(from.parent_id)?;
    let moved = siblings.remove(from.index);
    siblings.insert(to.index, moved);
    next.renumber();
    Some(next)
}
