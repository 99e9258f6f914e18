//! Drag interaction state machine.
//!
//! One [`Interaction`] value is active at a time. The machine owns the
//! pre-drag snapshot for the length of a gesture: it is dropped on a
//! successful commit or a no-op drop, and moved back into the working tree
//! on rollback or cancel.
//!
//! ```text
//! idle -> dragging -> previewing <-> previewing -> committing -> idle
//!                                                   \-> (failed: restore) -> idle
//! ```

use tracing::{debug, warn};

use crate::diff::{flatten, has_changed};
use crate::reorder::reorder;
use crate::tree::Forest;
use crate::types::{NodeId, ReorderItem};

pub enum Interaction<P> {
    Idle,
    Dragging {
        source: NodeId,
        snapshot: Forest<P>,
    },
    Previewing {
        source: NodeId,
        /// `None` after the pointer left the last target without entering a new one.
        target: Option<NodeId>,
        snapshot: Forest<P>,
    },
    Committing {
        source: NodeId,
        snapshot: Forest<P>,
    },
}

/// Payload-free view of [`Interaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Dragging,
    Previewing,
    Committing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefuseReason {
    /// A previous reorder is still waiting on the gateway.
    CommitPending,
    AlreadyDragging,
    UnknownNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragStart {
    Started,
    Refused(RefuseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOver {
    /// A new preview tree replaced the working tree.
    Previewed,
    /// Valid target, nothing to recompute.
    Unchanged,
    /// Different parent or unknown node; the working tree is untouched.
    NotDroppable,
    NotDragging,
}

/// What the engine has to do after a drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DropDecision {
    NotDragging,
    NotDroppable,
    NoChange,
    Commit(Vec<ReorderItem>),
}

pub struct DragMachine<P> {
    interaction: Interaction<P>,
}

impl<P> Default for DragMachine<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> DragMachine<P> {
    pub fn new() -> Self {
        Self {
            interaction: Interaction::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.interaction {
            Interaction::Idle => Phase::Idle,
            Interaction::Dragging { .. } => Phase::Dragging,
            Interaction::Previewing { .. } => Phase::Previewing,
            Interaction::Committing { .. } => Phase::Committing,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.interaction, Interaction::Idle)
    }

    /// The node being dragged or committed.
    pub fn source(&self) -> Option<NodeId> {
        match &self.interaction {
            Interaction::Idle => None,
            Interaction::Dragging { source, .. }
            | Interaction::Previewing { source, .. }
            | Interaction::Committing { source, .. } => Some(*source),
        }
    }

    /// The drop target currently tracked, if any.
    pub fn target(&self) -> Option<NodeId> {
        match &self.interaction {
            Interaction::Previewing { target, .. } => *target,
            _ => None,
        }
    }

    /// Captures a snapshot of `working` and enters `dragging`.
    pub fn start(&mut self, working: &Forest<P>, source: NodeId) -> DragStart {
        let refused = match self.interaction {
            Interaction::Committing { .. } => Some(RefuseReason::CommitPending),
            Interaction::Dragging { .. } | Interaction::Previewing { .. } => {
                Some(RefuseReason::AlreadyDragging)
            }
            Interaction::Idle if !working.contains(source) => Some(RefuseReason::UnknownNode),
            Interaction::Idle => None,
        };
        if let Some(reason) = refused {
            warn!(%source, ?reason, "Drag start refused");
            return DragStart::Refused(reason);
        }

        debug!(%source, "Drag started");
        self.interaction = Interaction::Dragging {
            source,
            snapshot: working.clone(),
        };
        DragStart::Started
    }

    /// Handles the pointer entering `candidate`, replacing `working` with a
    /// preview when the candidate is a sibling of the dragged node.
    pub fn over(&mut self, working: &mut Forest<P>, candidate: NodeId) -> DragOver {
        let (source, current) = match &self.interaction {
            Interaction::Dragging { source, .. } => (*source, None),
            Interaction::Previewing { source, target, .. } => (*source, *target),
            _ => return DragOver::NotDragging,
        };
        if !Self::droppable(working, source, candidate) {
            debug!(%source, %candidate, "Not a valid drop target");
            return DragOver::NotDroppable;
        }

        let outcome = if current == Some(candidate) || candidate == source {
            DragOver::Unchanged
        } else {
            match reorder(working, source, candidate) {
                Some(preview) => {
                    *working = preview;
                    debug!(%source, %candidate, "Preview applied");
                    DragOver::Previewed
                }
                None => return DragOver::NotDroppable,
            }
        };
        self.retarget(Some(candidate));
        outcome
    }

    /// Forgets the current target if the pointer left it. The last preview stays applied.
    pub fn leave(&mut self, candidate: NodeId) -> bool {
        match &mut self.interaction {
            Interaction::Previewing { target, .. } if *target == Some(candidate) => {
                *target = None;
                true
            }
            _ => false,
        }
    }

    /// Ends the gesture on `target`.
    ///
    /// The working tree is already the last preview; nothing is recomputed.
    /// Only a valid target with a net change moves the machine to
    /// `committing`; everything else returns to `idle` and drops the snapshot.
    pub(crate) fn drop_on(&mut self, working: &Forest<P>, target: Option<NodeId>) -> DropDecision {
        let source = match &self.interaction {
            Interaction::Dragging { source, .. } | Interaction::Previewing { source, .. } => {
                *source
            }
            _ => return DropDecision::NotDragging,
        };
        let snapshot = match std::mem::replace(&mut self.interaction, Interaction::Idle) {
            Interaction::Dragging { snapshot, .. } | Interaction::Previewing { snapshot, .. } => {
                snapshot
            }
            other => {
                self.interaction = other;
                return DropDecision::NotDragging;
            }
        };

        let valid = target.is_some_and(|t| Self::droppable(working, source, t));
        if !valid {
            debug!(%source, ?target, "Dropped outside a valid target");
            return DropDecision::NotDroppable;
        }

        let items = flatten(working);
        if !has_changed(&flatten(&snapshot), &items) {
            debug!(%source, "Drop produced no change");
            return DropDecision::NoChange;
        }

        self.interaction = Interaction::Committing { source, snapshot };
        DropDecision::Commit(items)
    }

    /// Settles an outstanding commit. On failure the snapshot replaces `working`.
    ///
    /// Returns false if no commit was outstanding.
    pub(crate) fn resolve(&mut self, working: &mut Forest<P>, committed: bool) -> bool {
        match std::mem::replace(&mut self.interaction, Interaction::Idle) {
            Interaction::Committing { snapshot, .. } => {
                if !committed {
                    *working = snapshot;
                }
                true
            }
            other => {
                self.interaction = other;
                false
            }
        }
    }

    /// Abandons the gesture and restores the snapshot. An outstanding commit cannot be cancelled.
    pub fn cancel(&mut self, working: &mut Forest<P>) -> bool {
        match std::mem::replace(&mut self.interaction, Interaction::Idle) {
            Interaction::Dragging { snapshot, .. } | Interaction::Previewing { snapshot, .. } => {
                *working = snapshot;
                true
            }
            other => {
                self.interaction = other;
                false
            }
        }
    }

    fn retarget(&mut self, target: Option<NodeId>) {
        self.interaction = match std::mem::replace(&mut self.interaction, Interaction::Idle) {
            Interaction::Dragging { source, snapshot }
            | Interaction::Previewing {
                source, snapshot, ..
            } => Interaction::Previewing {
                source,
                target,
                snapshot,
            },
            other => other,
        };
    }

    fn droppable(working: &Forest<P>, source: NodeId, candidate: NodeId) -> bool {
        match (working.locate(source), working.locate(candidate)) {
            (Some(from), Some(to)) => from.parent_id == to.parent_id,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::sample;

    fn roots(forest: &Forest<String>) -> Vec<u64> {
        forest.roots().iter().map(|id| id.0).collect()
    }

    #[test]
    fn preview_replaces_working_tree() {
        let mut working = sample();
        let mut machine = DragMachine::new();
        assert_eq!(machine.start(&working, NodeId(3)), DragStart::Started);
        assert_eq!(machine.phase(), Phase::Dragging);

        assert_eq!(machine.over(&mut working, NodeId(1)), DragOver::Previewed);
        assert_eq!(roots(&working), vec![3, 1, 2]);
        assert_eq!(machine.phase(), Phase::Previewing);
        assert_eq!(machine.target(), Some(NodeId(1)));

        assert_eq!(machine.over(&mut working, NodeId(1)), DragOver::Unchanged);
        assert_eq!(roots(&working), vec![3, 1, 2]);
    }

    #[test]
    fn cross_parent_candidate_keeps_state() {
        let mut working = sample();
        let mut machine = DragMachine::new();
        machine.start(&working, NodeId(10));

        assert_eq!(machine.over(&mut working, NodeId(2)), DragOver::NotDroppable);
        assert_eq!(machine.phase(), Phase::Dragging);

        assert_eq!(machine.over(&mut working, NodeId(12)), DragOver::Previewed);
        assert_eq!(machine.over(&mut working, NodeId(20)), DragOver::NotDroppable);
        assert_eq!(machine.phase(), Phase::Previewing);
        assert_eq!(machine.target(), Some(NodeId(12)));
    }

    #[test]
    fn leave_keeps_preview() {
        let mut working = sample();
        let mut machine = DragMachine::new();
        machine.start(&working, NodeId(1));
        machine.over(&mut working, NodeId(3));
        let preview = working.clone();

        assert!(!machine.leave(NodeId(2)));
        assert!(machine.leave(NodeId(3)));
        assert_eq!(machine.target(), None);
        assert_eq!(machine.phase(), Phase::Previewing);
        assert_eq!(working, preview);
    }

    #[test]
    fn drop_with_change_enters_committing() {
        let mut working = sample();
        let mut machine = DragMachine::new();
        machine.start(&working, NodeId(3));
        machine.over(&mut working, NodeId(1));

        let DropDecision::Commit(items) = machine.drop_on(&working, Some(NodeId(1))) else {
            panic!("expected a commit");
        };
        assert_eq!(items, flatten(&working));
        assert_eq!(machine.phase(), Phase::Committing);
        assert_eq!(
            machine.start(&working, NodeId(2)),
            DragStart::Refused(RefuseReason::CommitPending)
        );
        assert!(!machine.cancel(&mut working));

        assert!(machine.resolve(&mut working, true));
        assert!(machine.is_idle());
        assert_eq!(roots(&working), vec![3, 1, 2]);
    }

    #[test]
    fn failed_commit_restores_snapshot() {
        let mut working = sample();
        let before = working.clone();
        let mut machine = DragMachine::new();
        machine.start(&working, NodeId(1));
        machine.over(&mut working, NodeId(3));
        assert!(matches!(
            machine.drop_on(&working, Some(NodeId(3))),
            DropDecision::Commit(_)
        ));

        assert!(machine.resolve(&mut working, false));
        assert!(machine.is_idle());
        assert_eq!(working, before);
    }

    #[test]
    fn pick_up_and_put_back_is_no_change() {
        let mut working = sample();
        let mut machine = DragMachine::new();
        machine.start(&working, NodeId(1));
        assert_eq!(machine.over(&mut working, NodeId(1)), DragOver::Unchanged);
        assert_eq!(
            machine.drop_on(&working, Some(NodeId(1))),
            DropDecision::NoChange
        );
        assert!(machine.is_idle());
    }

    #[test]
    fn invalid_drop_returns_to_idle_and_keeps_shape() {
        let mut working = sample();
        let mut machine = DragMachine::new();
        machine.start(&working, NodeId(1));
        machine.over(&mut working, NodeId(2));
        let shown = working.clone();

        assert_eq!(machine.drop_on(&working, None), DropDecision::NotDroppable);
        assert!(machine.is_idle());
        assert_eq!(working, shown);

        machine.start(&working, NodeId(10));
        assert_eq!(
            machine.drop_on(&working, Some(NodeId(20))),
            DropDecision::NotDroppable
        );
        assert_eq!(machine.drop_on(&working, None), DropDecision::NotDragging);
    }

    #[test]
    fn start_refuses_unknown_and_nested_drags() {
        let working = sample();
        let mut machine = DragMachine::new();
        assert_eq!(
            machine.start(&working, NodeId(404)),
            DragStart::Refused(RefuseReason::UnknownNode)
        );
        machine.start(&working, NodeId(1));
        assert_eq!(
            machine.start(&working, NodeId(2)),
            DragStart::Refused(RefuseReason::AlreadyDragging)
        );
    }

    #[test]
    fn cancel_restores_snapshot() {
        let mut working = sample();
        let before = working.clone();
        let mut machine = DragMachine::new();
        machine.start(&working, NodeId(1));
        machine.over(&mut working, NodeId(3));
        assert_ne!(working, before);

        assert!(machine.cancel(&mut working));
        assert_eq!(working, before);
        assert!(machine.is_idle());
    }
}
