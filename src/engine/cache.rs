//! Lazy child cache.
//!
//! Holds the most recently fetched child list per parent node. Entries are
//! replaced wholesale, never merged. Each fetch carries a ticket and only the
//! response matching the entry's current ticket is accepted, so a slow
//! response can never overwrite a newer one.

use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::error::MenuError;
use crate::types::{MenuNode, NodeId};

pub type Children<P> = Arc<Vec<MenuNode<P>>>;

/// Settled entry. Only settled entries live in the LRU and can be evicted.
pub enum CacheEntry<P> {
    Loaded(Children<P>),
    Failed,
}

/// Payload-free view of an entry. `Absent` covers ids with no entry at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Absent,
    Loading,
    Loaded,
    Failed,
}

/// A fetch the caller must now issue.
pub struct PendingFetch<P> {
    pub ticket: u64,
    pub previous: Option<Children<P>>,
}

pub enum Completion<P> {
    Loaded(Children<P>),
    Failed(MenuError),
    /// Superseded by a newer fetch, or the node was forgotten meanwhile.
    Stale,
}

pub struct ChildCache<P> {
    entries: LruCache<NodeId, CacheEntry<P>>,
    /// Outstanding fetches, kept outside the LRU so capacity never evicts them.
    in_flight: HashMap<NodeId, PendingFetch<P>>,
    expanded: HashSet<NodeId>,
    parked: HashSet<NodeId>,
    next_ticket: u64,
}

impl<P> ChildCache<P> {
    /// `None` capacity keeps every entry.
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        let entries = match capacity {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            entries,
            in_flight: HashMap::new(),
            expanded: HashSet::new(),
            parked: HashSet::new(),
            next_ticket: 0,
        }
    }

    pub fn state(&self, id: NodeId) -> CacheState {
        if self.in_flight.contains_key(&id) {
            return CacheState::Loading;
        }
        match self.entries.peek(&id) {
            None => CacheState::Absent,
            Some(CacheEntry::Loaded(_)) => CacheState::Loaded,
            Some(CacheEntry::Failed) => CacheState::Failed,
        }
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.expanded.contains(&id)
    }

    pub fn is_loading(&self, id: NodeId) -> bool {
        self.in_flight.contains_key(&id)
    }

    /// Expanded ids in ascending order.
    pub fn expanded(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.expanded.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Children to show for `id`: the loaded list, or the previous list while reloading.
    pub fn children(&self, id: NodeId) -> Option<Children<P>> {
        if let Some(fetch) = self.in_flight.get(&id) {
            return fetch.previous.clone();
        }
        match self.entries.peek(&id)? {
            CacheEntry::Loaded(children) => Some(Arc::clone(children)),
            CacheEntry::Failed => None,
        }
    }

    /// Marks `id` expanded and loading.
    ///
    /// Returns `None` if a fetch for `id` is already outstanding, unless
    /// `supersede` is set, in which case a new ticket replaces the old one.
    pub fn begin(&mut self, id: NodeId, supersede: bool) -> Option<PendingFetch<P>> {
        self.expanded.insert(id);
        let previous = match self.in_flight.remove(&id) {
            Some(fetch) if !supersede => {
                self.in_flight.insert(id, fetch);
                return None;
            }
            Some(fetch) => fetch.previous,
            None => match self.entries.pop(&id) {
                Some(CacheEntry::Loaded(children)) => Some(children),
                Some(CacheEntry::Failed) | None => None,
            },
        };

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.in_flight.insert(
            id,
            PendingFetch {
                ticket,
                previous: previous.clone(),
            },
        );
        Some(PendingFetch { ticket, previous })
    }

    /// Records the outcome of fetch `ticket` for `id`.
    ///
    /// A failure clears the loading state and collapses the node; expanding
    /// it again retries. A list loaded before the failed fetch stays cached.
    pub fn complete(
        &mut self,
        id: NodeId,
        ticket: u64,
        result: crate::error::Result<Vec<MenuNode<P>>>,
    ) -> Completion<P> {
        let previous = match self.in_flight.remove(&id) {
            Some(fetch) if fetch.ticket == ticket => fetch.previous,
            Some(fetch) => {
                self.in_flight.insert(id, fetch);
                return Completion::Stale;
            }
            None => return Completion::Stale,
        };
        match result {
            Ok(children) => {
                let children = Arc::new(children);
                self.entries.put(id, CacheEntry::Loaded(Arc::clone(&children)));
                Completion::Loaded(children)
            }
            Err(err) => {
                match previous {
                    Some(children) => {
                        self.entries.put(id, CacheEntry::Loaded(children));
                        self.expanded.remove(&id);
                        self.parked.remove(&id);
                    }
                    None => self.fail(id),
                }
                Completion::Failed(err)
            }
        }
    }

    /// Marks `id` failed and collapsed, dropping any cached list.
    pub fn fail(&mut self, id: NodeId) {
        self.in_flight.remove(&id);
        self.entries.put(id, CacheEntry::Failed);
        self.expanded.remove(&id);
        self.parked.remove(&id);
    }

    /// Removes `id` from the expanded set. Cached children are kept.
    pub fn collapse(&mut self, id: NodeId) -> bool {
        self.expanded.remove(&id)
    }

    /// Drops everything known about `id`.
    pub fn forget(&mut self, id: NodeId) {
        self.in_flight.remove(&id);
        self.entries.pop(&id);
        self.expanded.remove(&id);
        self.parked.remove(&id);
    }

    /// Remembers that `id` has loaded children not yet applied to the working tree.
    pub fn park(&mut self, id: NodeId) {
        self.parked.insert(id);
    }

    pub fn take_parked(&mut self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.parked.drain().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn children(ids: &[u64]) -> Vec<MenuNode<String>> {
        ids.iter()
            .map(|id| MenuNode::new(*id, format!("child-{id}")))
            .collect()
    }

    fn ids(list: &Children<String>) -> Vec<u64> {
        list.iter().map(|n| n.id.0).collect()
    }

    #[test]
    fn expand_load_collapse_reexpand() {
        let mut cache: ChildCache<String> = ChildCache::new(None);
        let x = NodeId(1);
        assert_eq!(cache.state(x), CacheState::Absent);

        let fetch = cache.begin(x, false).unwrap();
        assert!(fetch.previous.is_none());
        assert!(cache.is_loading(x));
        assert!(cache.is_expanded(x));
        assert!(cache.begin(x, false).is_none());

        let Completion::Loaded(list) = cache.complete(x, fetch.ticket, Ok(children(&[5, 6])))
        else {
            panic!("expected loaded children");
        };
        assert_eq!(ids(&list), vec![5, 6]);

        assert!(cache.collapse(x));
        assert!(!cache.is_expanded(x));
        assert_eq!(cache.state(x), CacheState::Loaded);

        let again = cache.begin(x, false).unwrap();
        assert_eq!(ids(again.previous.as_ref().unwrap()), vec![5, 6]);
        assert_eq!(ids(&cache.children(x).unwrap()), vec![5, 6]);

        cache.complete(x, again.ticket, Ok(children(&[6, 7])));
        assert_eq!(ids(&cache.children(x).unwrap()), vec![6, 7]);
    }

    #[test]
    fn failure_collapses_and_allows_retry() {
        let mut cache: ChildCache<String> = ChildCache::new(None);
        let x = NodeId(2);
        let fetch = cache.begin(x, false).unwrap();
        let outcome = cache.complete(
            x,
            fetch.ticket,
            Err(MenuError::GatewayError("offline".into())),
        );
        assert!(matches!(outcome, Completion::Failed(_)));
        assert_eq!(cache.state(x), CacheState::Failed);
        assert!(!cache.is_expanded(x));
        assert!(cache.children(x).is_none());

        assert!(cache.begin(x, false).is_some());
        assert!(cache.is_loading(x));
    }

    #[test]
    fn superseded_ticket_is_stale() {
        let mut cache: ChildCache<String> = ChildCache::new(None);
        let x = NodeId(3);
        let first = cache.begin(x, false).unwrap();
        let second = cache.begin(x, true).unwrap();
        assert_ne!(first.ticket, second.ticket);

        assert!(matches!(
            cache.complete(x, first.ticket, Ok(children(&[1]))),
            Completion::Stale
        ));
        assert!(cache.is_loading(x));
        assert!(matches!(
            cache.complete(x, second.ticket, Ok(children(&[2]))),
            Completion::Loaded(_)
        ));
        assert_eq!(ids(&cache.children(x).unwrap()), vec![2]);
    }

    #[test]
    fn capacity_evicts_least_recent_entry() {
        let mut cache: ChildCache<String> = ChildCache::new(NonZeroUsize::new(1));
        let a = cache.begin(NodeId(1), false).unwrap();
        cache.complete(NodeId(1), a.ticket, Ok(children(&[10])));
        let b = cache.begin(NodeId(2), false).unwrap();
        cache.complete(NodeId(2), b.ticket, Ok(children(&[20])));

        assert_eq!(cache.state(NodeId(1)), CacheState::Absent);
        assert_eq!(cache.state(NodeId(2)), CacheState::Loaded);
        assert_eq!(cache.expanded(), vec![NodeId(1), NodeId(2)]);
    }

    #[test]
    fn capacity_never_evicts_in_flight_fetches() {
        let mut cache: ChildCache<String> = ChildCache::new(NonZeroUsize::new(1));
        let a = cache.begin(NodeId(1), false).unwrap();
        let b = cache.begin(NodeId(2), false).unwrap();
        assert!(cache.is_loading(NodeId(1)));
        assert!(cache.is_loading(NodeId(2)));

        assert!(matches!(
            cache.complete(NodeId(2), b.ticket, Ok(children(&[20]))),
            Completion::Loaded(_)
        ));
        assert!(matches!(
            cache.complete(NodeId(1), a.ticket, Ok(children(&[10]))),
            Completion::Loaded(_)
        ));
        assert_eq!(ids(&cache.children(NodeId(1)).unwrap()), vec![10]);
        assert_eq!(cache.state(NodeId(2)), CacheState::Absent);
        assert_eq!(cache.expanded(), vec![NodeId(1), NodeId(2)]);
    }

    #[test]
    fn failed_reload_keeps_previous_list() {
        let mut cache: ChildCache<String> = ChildCache::new(None);
        let x = NodeId(5);
        let first = cache.begin(x, false).unwrap();
        cache.complete(x, first.ticket, Ok(children(&[50, 51])));

        let again = cache.begin(x, false).unwrap();
        let outcome = cache.complete(
            x,
            again.ticket,
            Err(MenuError::GatewayError("offline".into())),
        );
        assert!(matches!(outcome, Completion::Failed(_)));
        assert!(!cache.is_expanded(x));
        assert!(!cache.is_loading(x));
        assert_eq!(cache.state(x), CacheState::Loaded);
        assert_eq!(ids(&cache.children(x).unwrap()), vec![50, 51]);
    }

    #[test]
    fn forget_and_parking() {
        let mut cache: ChildCache<String> = ChildCache::new(None);
        let fetch = cache.begin(NodeId(4), false).unwrap();
        cache.complete(NodeId(4), fetch.ticket, Ok(children(&[40])));
        cache.park(NodeId(4));
        cache.park(NodeId(9));
        assert_eq!(cache.take_parked(), vec![NodeId(4), NodeId(9)]);
        assert!(cache.take_parked().is_empty());

        cache.forget(NodeId(4));
        assert_eq!(cache.state(NodeId(4)), CacheState::Absent);
        assert!(!cache.is_expanded(NodeId(4)));
    }
}
