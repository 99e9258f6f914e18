//! Flattening and change detection between two orderings.

use crate::tree::Forest;
use crate::types::ReorderItem;

/// Flattens the forest into pre-order `{id, position, parent_id}` items.
///
/// This is the exact payload sent to the gateway on commit.
pub fn flatten<P>(forest: &Forest<P>) -> Vec<ReorderItem> {
    forest
        .preorder()
        .into_iter()
        .filter_map(|id| {
            let node = forest.get(id)?;
            Some(ReorderItem {
                id,
                position: node.position(),
                parent_id: node.parent_id(),
            })
        })
        .collect()
}

/// Element-wise comparison of two flattened orderings.
///
/// Order matters: the same set of items in a different traversal order is a change.
pub fn has_changed(before: &[ReorderItem], after: &[ReorderItem]) -> bool {
    if before.len() != after.len() {
        return true;
    }
    before.iter().zip(after).any(|(a, b)| {
        a.id != b.id || a.position != b.position || a.parent_id != b.parent_id
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reorder::reorder;
    use crate::tree::tests::sample;
    use crate::types::NodeId;

    #[test]
    fn flatten_is_preorder_with_parents() {
        let items = flatten(&sample());
        assert_eq!(items.len(), 8);
        assert_eq!(
            items[0],
            ReorderItem {
                id: NodeId(1),
                position: 0,
                parent_id: None
            }
        );
        assert_eq!(
            items[3],
            ReorderItem {
                id: NodeId(12),
                position: 2,
                parent_id: Some(NodeId(1))
            }
        );
        assert_eq!(items[6].id, NodeId(200));
        assert_eq!(items[7].id, NodeId(3));
    }

    #[test]
    fn clone_is_unchanged() {
        let forest = sample();
        assert!(!has_changed(&flatten(&forest), &flatten(&forest.clone())));
    }

    #[test]
    fn reorder_and_back_is_unchanged() {
        let forest = sample();
        let moved = reorder(&forest, NodeId(1), NodeId(2)).unwrap();
        assert!(has_changed(&flatten(&forest), &flatten(&moved)));
        let back = reorder(&moved, NodeId(1), NodeId(2)).unwrap();
        assert!(!has_changed(&flatten(&forest), &flatten(&back)));
    }

    #[test]
    fn length_and_parent_mismatches_are_changes() {
        let items = flatten(&sample());
        assert!(has_changed(&items, &items[..items.len() - 1]));

        let mut reparented = items.clone();
        reparented[7].parent_id = Some(NodeId(2));
        assert!(has_changed(&items, &reparented));
    }
}
