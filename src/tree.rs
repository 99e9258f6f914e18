//! Arena-backed menu forest.
//!
//! Nodes live in a map keyed by [`NodeId`]; parent and children are stored as
//! id references. Cloning a [`Forest`] copies id lists and payload reference
//! counts, never the payloads themselves, so every snapshot is independent of
//! the tree it was taken from. A child list can only name ids already present
//! in the arena and every id is present once, which keeps the structure acyclic.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{MenuError, Result};
use crate::types::{MenuNode, NodeId};

/// One node in the arena.
pub struct ArenaNode<P> {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    position: u32,
    level: u32,
    payload: Arc<P>,
}

impl<P> Clone for ArenaNode<P> {
    fn clone(&self) -> Self {
        Self {
            parent: self.parent,
            children: self.children.clone(),
            position: self.position,
            level: self.level,
            payload: Arc::clone(&self.payload),
        }
    }
}

impl<P> ArenaNode<P> {
    fn new(parent: Option<NodeId>, payload: P) -> Self {
        Self {
            parent,
            children: Vec::new(),
            position: 0,
            level: 0,
            payload: Arc::new(payload),
        }
    }

    /// `None` for root-level nodes.
    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Index within the sibling group.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Depth from the root, roots are level 0.
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }
}

/// Where a node sits: its parent and its index in that parent's child list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub parent_id: Option<NodeId>,
    pub index: usize,
}

/// An ordered forest of menu nodes.
pub struct Forest<P> {
    nodes: HashMap<NodeId, ArenaNode<P>>,
    roots: Vec<NodeId>,
}

impl<P> Clone for Forest<P> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            roots: self.roots.clone(),
        }
    }
}

impl<P> Default for Forest<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Debug for Forest<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forest")
            .field("nodes", &self.nodes.len())
            .field("roots", &self.roots)
            .finish_non_exhaustive()
    }
}

/// Deep equality: same ids, same shape, same positions and levels, equal payloads.
impl<P: PartialEq> PartialEq for Forest<P> {
    fn eq(&self, other: &Self) -> bool {
        self.roots == other.roots
            && self.nodes.len() == other.nodes.len()
            && self.nodes.iter().all(|(id, node)| {
                other.nodes.get(id).is_some_and(|o| {
                    node.parent == o.parent
                        && node.children == o.children
                        && node.position == o.position
                        && node.level == o.level
                        && *node.payload == *o.payload
                })
            })
    }
}

impl<P> Forest<P> {
    /// Creates an empty forest.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Builds a forest from nested nodes.
    ///
    /// The nesting decides parentage; incoming `parent_id` values are ignored.
    /// Siblings are stably sorted by their incoming `position` and then
    /// renumbered, so gaps or duplicates in the source positions are repaired.
    ///
    /// # Errors
    /// * [`MenuError::DuplicateNode`] if an id occurs more than once
    pub fn from_nodes(nodes: Vec<MenuNode<P>>) -> Result<Self> {
        let mut forest = Self::new();
        forest.roots = forest.ingest(None, nodes)?;
        forest.renumber();
        Ok(forest)
    }

    fn ingest(&mut self, parent: Option<NodeId>, mut nodes: Vec<MenuNode<P>>) -> Result<Vec<NodeId>> {
        nodes.sort_by_key(|n| n.position);
        let mut ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            let MenuNode {
                id,
                children,
                payload,
                ..
            } = node;
            if self.nodes.contains_key(&id) {
                return Err(MenuError::DuplicateNode(id));
            }
            self.nodes.insert(id, ArenaNode::new(parent, payload));
            let child_ids = self.ingest(Some(id), children)?;
            if let Some(slot) = self.nodes.get_mut(&id) {
                slot.children = child_ids;
            }
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&ArenaNode<P>> {
        self.nodes.get(&id)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Child list of `parent` (`None` for the root list). Unknown parents have no children.
    pub fn children(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            None => &self.roots,
            Some(id) => self.nodes.get(&id).map(|n| n.children.as_slice()).unwrap_or(&[]),
        }
    }

    /// Ancestors of `id`, nearest first. Empty for roots and unknown ids.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(parent) = current {
            if out.len() > self.nodes.len() {
                break;
            }
            out.push(parent);
            current = self.nodes.get(&parent).and_then(|n| n.parent);
        }
        out
    }

    /// Ids in pre-order: every node before its children, siblings in order.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Finds the parent and sibling index of `id`.
    ///
    /// Returns `None` when the id is not in this forest. Callers treat that
    /// as "nothing to do": a lazy load may have replaced the subtree the id
    /// was seen in.
    pub fn locate(&self, id: NodeId) -> Option<Location> {
        let parent_id = self.nodes.get(&id)?.parent;
        let index = self.children(parent_id).iter().position(|c| *c == id)?;
        Some(Location { parent_id, index })
    }

    pub(crate) fn siblings_mut(&mut self, parent: Option<NodeId>) -> Option<&mut Vec<NodeId>> {
        match parent {
            None => Some(&mut self.roots),
            Some(id) => self.nodes.get_mut(&id).map(|n| &mut n.children),
        }
    }

    /// Recomputes `parent`, `level` and `position` for every node from the
    /// child lists. Idempotent.
    pub fn renumber(&mut self) {
        let mut stack: Vec<(Option<NodeId>, u32)> = vec![(None, 0)];
        while let Some((parent, level)) = stack.pop() {
            let children = self.children(parent).to_vec();
            for (position, id) in children.into_iter().enumerate() {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.parent = parent;
                    node.level = level;
                    node.position = position as u32;
                    stack.push((Some(id), level + 1));
                }
            }
        }
    }

    /// Inserts a brand-new leaf at `position` within its sibling group,
    /// clamped to the end of the group.
    ///
    /// # Errors
    /// * [`MenuError::DuplicateNode`] if `id` is already present
    /// * [`MenuError::UnknownNode`] if `parent` is not in the forest
    pub fn insert(
        &mut self,
        parent: Option<NodeId>,
        id: NodeId,
        position: u32,
        payload: P,
    ) -> Result<()> {
        if self.nodes.contains_key(&id) {
            return Err(MenuError::DuplicateNode(id));
        }
        let siblings = match parent {
            Some(p) => self
                .siblings_mut(Some(p))
                .ok_or(MenuError::UnknownNode(p))?,
            None => &mut self.roots,
        };
        let index = (position as usize).min(siblings.len());
        siblings.insert(index, id);
        self.nodes.insert(id, ArenaNode::new(parent, payload));
        self.renumber();
        Ok(())
    }

    /// Removes `id` and its whole subtree. Returns false if `id` was unknown.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if !self.detach(id) {
            return false;
        }
        self.drop_subtree(id);
        self.renumber();
        true
    }

    /// Unlinks `id` from its parent's child list, leaving it in the arena.
    fn detach(&mut self, id: NodeId) -> bool {
        let Some(location) = self.locate(id) else {
            return false;
        };
        if let Some(siblings) = self.siblings_mut(location.parent_id) {
            siblings.remove(location.index);
        }
        true
    }

    fn drop_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
            }
        }
    }

    /// Exports the nested form, children populated for the whole forest.
    pub fn to_nodes(&self) -> Vec<MenuNode<P>>
    where
        P: Clone,
    {
        self.roots.iter().filter_map(|id| self.export(*id)).collect()
    }

    fn export(&self, id: NodeId) -> Option<MenuNode<P>>
    where
        P: Clone,
    {
        let node = self.nodes.get(&id)?;
        Some(MenuNode {
            id,
            parent_id: node.parent,
            position: node.position,
            level: node.level,
            children: node
                .children
                .iter()
                .filter_map(|child| self.export(*child))
                .collect(),
            payload: P::clone(&node.payload),
        })
    }

    /// Replaces the child list of `parent` with a freshly fetched list.
    ///
    /// This is a full replace, not a field merge:
    /// - fetched ids already present elsewhere are moved under `parent`,
    ///   keeping their own descendants unless the fetched node carries children
    /// - previous children missing from the fetched list are dropped with their subtrees
    /// - payloads are taken from the fetched nodes
    ///
    /// Nothing is mutated when validation fails.
    ///
    /// # Errors
    /// * [`MenuError::UnknownNode`] if `parent` is not in the forest
    /// * [`MenuError::Cycle`] if a fetched id is `parent` or one of its ancestors
    /// * [`MenuError::DuplicateNode`] if the fetched list repeats an id
    pub fn graft_children(&mut self, parent: NodeId, fetched: &[MenuNode<P>]) -> Result<()>
    where
        P: Clone,
    {
        if !self.nodes.contains_key(&parent) {
            return Err(MenuError::UnknownNode(parent));
        }
        let mut forbidden: HashSet<NodeId> = self.ancestors(parent).into_iter().collect();
        forbidden.insert(parent);

        let mut seen = HashSet::new();
        let mut stack: Vec<&MenuNode<P>> = fetched.iter().collect();
        while let Some(node) = stack.pop() {
            if forbidden.contains(&node.id) {
                return Err(MenuError::Cycle {
                    child: node.id,
                    parent,
                });
            }
            if !seen.insert(node.id) {
                return Err(MenuError::DuplicateNode(node.id));
            }
            stack.extend(node.children.iter());
        }

        self.replace_children(parent, fetched);
        self.renumber();
        Ok(())
    }

    fn replace_children(&mut self, parent: NodeId, fetched: &[MenuNode<P>])
    where
        P: Clone,
    {
        let mut sorted: Vec<&MenuNode<P>> = fetched.iter().collect();
        sorted.sort_by_key(|n| n.position);

        for node in &sorted {
            self.detach(node.id);
        }
        let stale = match self.nodes.get_mut(&parent) {
            Some(slot) => std::mem::take(&mut slot.children),
            None => return,
        };
        for child in stale {
            self.drop_subtree(child);
        }

        for node in &sorted {
            match self.nodes.get_mut(&node.id) {
                Some(slot) => {
                    slot.parent = Some(parent);
                    slot.payload = Arc::new(node.payload.clone());
                }
                None => {
                    self.nodes
                        .insert(node.id, ArenaNode::new(Some(parent), node.payload.clone()));
                }
            }
        }
        if let Some(slot) = self.nodes.get_mut(&parent) {
            slot.children = sorted.iter().map(|n| n.id).collect();
        }

        for node in sorted {
            if !node.children.is_empty() {
                self.replace_children(node.id, &node.children);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn leaf(id: u64) -> MenuNode<String> {
        MenuNode::new(id, format!("node-{id}"))
    }

    /// Roots 1, 2, 3; node 1 has children 10, 11, 12; node 2 has child 20 which has 200.
    pub(crate) fn sample() -> Forest<String> {
        Forest::from_nodes(vec![
            leaf(1).with_children(vec![leaf(10), leaf(11), leaf(12)]),
            leaf(2).with_children(vec![leaf(20).with_children(vec![leaf(200)])]),
            leaf(3),
        ])
        .unwrap()
    }

    fn positions(forest: &Forest<String>, parent: Option<NodeId>) -> Vec<u32> {
        forest
            .children(parent)
            .iter()
            .map(|id| forest.get(*id).unwrap().position())
            .collect()
    }

    #[test]
    fn from_nodes_assigns_levels_and_positions() {
        let forest = sample();
        assert_eq!(forest.len(), 9);
        assert_eq!(forest.roots(), &[NodeId(1), NodeId(2), NodeId(3)]);
        assert_eq!(positions(&forest, None), vec![0, 1, 2]);
        assert_eq!(positions(&forest, Some(NodeId(1))), vec![0, 1, 2]);

        let deep = forest.get(NodeId(200)).unwrap();
        assert_eq!(deep.level(), 2);
        assert_eq!(deep.parent_id(), Some(NodeId(20)));
        assert_eq!(forest.get(NodeId(20)).unwrap().parent_id(), Some(NodeId(2)));
    }

    #[test]
    fn from_nodes_orders_by_incoming_position() {
        let forest = Forest::from_nodes(vec![
            leaf(1).with_position(7),
            leaf(2).with_position(3),
            leaf(3).with_position(3),
        ])
        .unwrap();
        assert_eq!(forest.roots(), &[NodeId(2), NodeId(3), NodeId(1)]);
        assert_eq!(positions(&forest, None), vec![0, 1, 2]);
    }

    #[test]
    fn from_nodes_rejects_duplicates() {
        let err = Forest::from_nodes(vec![leaf(1).with_children(vec![leaf(1)])]).unwrap_err();
        assert!(matches!(err, MenuError::DuplicateNode(NodeId(1))));
    }

    #[test]
    fn clone_does_not_alias() {
        let original = sample();
        let mut copy = original.clone();
        copy.siblings_mut(None).unwrap().reverse();
        copy.renumber();

        assert_eq!(original.roots(), &[NodeId(1), NodeId(2), NodeId(3)]);
        assert_eq!(original.get(NodeId(1)).unwrap().position(), 0);
        assert_eq!(copy.get(NodeId(1)).unwrap().position(), 2);
        assert_ne!(original, copy);
    }

    #[test]
    fn locate_reports_parent_and_index() {
        let forest = sample();
        assert_eq!(
            forest.locate(NodeId(12)),
            Some(Location {
                parent_id: Some(NodeId(1)),
                index: 2
            })
        );
        assert_eq!(
            forest.locate(NodeId(3)),
            Some(Location {
                parent_id: None,
                index: 2
            })
        );
        assert_eq!(forest.locate(NodeId(999)), None);
    }

    #[test]
    fn renumber_is_idempotent() {
        let mut forest = sample();
        forest.siblings_mut(Some(NodeId(1))).unwrap().swap(0, 2);
        forest.renumber();
        let once = forest.clone();
        forest.renumber();
        assert_eq!(forest, once);
        assert_eq!(forest.get(NodeId(12)).unwrap().position(), 0);
    }

    #[test]
    fn preorder_visits_parents_first() {
        let forest = sample();
        let order: Vec<u64> = forest.preorder().into_iter().map(|id| id.0).collect();
        assert_eq!(order, vec![1, 10, 11, 12, 2, 20, 200, 3]);
    }

    #[test]
    fn insert_clamps_position() {
        let mut forest = sample();
        forest
            .insert(Some(NodeId(1)), NodeId(13), 99, "new".into())
            .unwrap();
        assert_eq!(forest.children(Some(NodeId(1))).last(), Some(&NodeId(13)));
        assert_eq!(forest.get(NodeId(13)).unwrap().position(), 3);
        assert_eq!(forest.get(NodeId(13)).unwrap().level(), 1);

        forest.insert(None, NodeId(4), 0, "first".into()).unwrap();
        assert_eq!(forest.roots()[0], NodeId(4));
        assert_eq!(positions(&forest, None), vec![0, 1, 2, 3]);

        assert!(matches!(
            forest.insert(Some(NodeId(77)), NodeId(5), 0, "x".into()),
            Err(MenuError::UnknownNode(NodeId(77)))
        ));
        assert!(matches!(
            forest.insert(None, NodeId(3), 0, "x".into()),
            Err(MenuError::DuplicateNode(NodeId(3)))
        ));
    }

    #[test]
    fn remove_drops_subtree_and_renumbers() {
        let mut forest = sample();
        assert!(forest.remove(NodeId(2)));
        assert!(!forest.contains(NodeId(20)));
        assert!(!forest.contains(NodeId(200)));
        assert_eq!(forest.roots(), &[NodeId(1), NodeId(3)]);
        assert_eq!(forest.get(NodeId(3)).unwrap().position(), 1);
        assert!(!forest.remove(NodeId(2)));
    }

    #[test]
    fn graft_replaces_children() {
        let mut forest = sample();
        forest
            .graft_children(
                NodeId(1),
                &[
                    MenuNode::new(12, "twelve".to_string()).with_position(0),
                    leaf(14).with_position(1),
                ],
            )
            .unwrap();

        assert_eq!(forest.children(Some(NodeId(1))), &[NodeId(12), NodeId(14)]);
        assert!(!forest.contains(NodeId(10)));
        assert!(!forest.contains(NodeId(11)));
        assert_eq!(forest.get(NodeId(12)).unwrap().payload(), "twelve");
        assert_eq!(forest.get(NodeId(14)).unwrap().level(), 1);
        assert_eq!(positions(&forest, Some(NodeId(1))), vec![0, 1]);
    }

    #[test]
    fn graft_moves_existing_node_and_keeps_its_subtree() {
        let mut forest = sample();
        forest.graft_children(NodeId(3), &[leaf(20)]).unwrap();

        assert!(forest.children(Some(NodeId(2))).is_empty());
        assert_eq!(forest.children(Some(NodeId(3))), &[NodeId(20)]);
        assert_eq!(forest.children(Some(NodeId(20))), &[NodeId(200)]);
        assert_eq!(forest.get(NodeId(200)).unwrap().level(), 2);
        assert_eq!(forest.ancestors(NodeId(200)), vec![NodeId(20), NodeId(3)]);
    }

    #[test]
    fn graft_rejects_cycles_without_mutating() {
        let mut forest = sample();
        let before = forest.clone();

        let err = forest.graft_children(NodeId(20), &[leaf(2)]).unwrap_err();
        assert!(matches!(
            err,
            MenuError::Cycle {
                child: NodeId(2),
                parent: NodeId(20)
            }
        ));
        let err = forest
            .graft_children(NodeId(1), &[leaf(14), leaf(14)])
            .unwrap_err();
        assert!(matches!(err, MenuError::DuplicateNode(NodeId(14))));
        assert!(matches!(
            forest.graft_children(NodeId(404), &[]),
            Err(MenuError::UnknownNode(NodeId(404)))
        ));
        assert_eq!(forest, before);
    }

    #[test]
    fn to_nodes_round_trips_shape() {
        let forest = sample();
        let nodes = forest.to_nodes();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1].children[0].children[0].id, NodeId(200));
        assert_eq!(nodes[1].children[0].children[0].level, 2);
        assert_eq!(nodes[1].children[0].parent_id, Some(NodeId(2)));
        assert_eq!(Forest::from_nodes(nodes).unwrap(), forest);
    }
}
