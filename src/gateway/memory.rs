//! In-process gateway backed by flat records.
//!
//! Used by the demo binary when no remote store is configured and by the
//! tests, which rely on its failure injection and call counters.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::error::{MenuError, Result};
use crate::types::{MenuNode, NodeId, ReorderItem, Scope};

use super::PersistenceGateway;

#[derive(Debug, Clone)]
struct Record<P> {
    id: NodeId,
    parent_id: Option<NodeId>,
    position: u32,
    payload: P,
}

/// Authoritative store kept in memory, one flat record list per scope.
#[derive(Debug)]
pub struct InMemoryGateway<P> {
    scopes: Mutex<HashMap<Scope, Vec<Record<P>>>>,
    failing_commits: AtomicUsize,
    failing_children: Mutex<HashSet<NodeId>>,
    latency: Mutex<Option<Duration>>,
    commit_calls: AtomicUsize,
    children_calls: AtomicUsize,
}

impl<P> Default for InMemoryGateway<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> InMemoryGateway<P> {
    pub fn new() -> Self {
        Self {
            scopes: Mutex::new(HashMap::new()),
            failing_commits: AtomicUsize::new(0),
            failing_children: Mutex::new(HashSet::new()),
            latency: Mutex::new(None),
            commit_calls: AtomicUsize::new(0),
            children_calls: AtomicUsize::new(0),
        }
    }

    /// Replaces the contents of `scope` with the given nested tree.
    pub fn seed(&self, scope: &Scope, nodes: Vec<MenuNode<P>>) {
        let mut records = Vec::new();
        let mut stack: Vec<(Option<NodeId>, u32, MenuNode<P>)> = nodes
            .into_iter()
            .enumerate()
            .map(|(i, n)| (None, i as u32, n))
            .collect();
        while let Some((parent_id, position, node)) = stack.pop() {
            let MenuNode {
                id,
                children,
                payload,
                ..
            } = node;
            stack.extend(
                children
                    .into_iter()
                    .enumerate()
                    .map(|(i, c)| (Some(id), i as u32, c)),
            );
            records.push(Record {
                id,
                parent_id,
                position,
                payload,
            });
        }
        self.scopes.lock().insert(scope.clone(), records);
    }

    /// Adds or replaces a single record, simulating a change made by another client.
    pub fn upsert(&self, scope: &Scope, parent_id: Option<NodeId>, position: u32, node: MenuNode<P>) {
        let mut scopes = self.scopes.lock();
        let records = scopes.entry(scope.clone()).or_default();
        records.retain(|r| r.id != node.id);
        records.push(Record {
            id: node.id,
            parent_id,
            position,
            payload: node.payload,
        });
    }

    /// Removes a record and everything below it.
    pub fn remove(&self, scope: &Scope, id: NodeId) {
        let mut scopes = self.scopes.lock();
        let Some(records) = scopes.get_mut(scope) else {
            return;
        };
        let mut doomed = HashSet::from([id]);
        loop {
            let before = doomed.len();
            for r in records.iter() {
                if r.parent_id.is_some_and(|p| doomed.contains(&p)) {
                    doomed.insert(r.id);
                }
            }
            if doomed.len() == before {
                break;
            }
        }
        records.retain(|r| !doomed.contains(&r.id));
    }

    /// The next `n` commits fail without touching the store.
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Children fetches for `id` fail until [`Self::heal_children_of`] is called.
    pub fn fail_children_of(&self, id: NodeId) {
        self.failing_children.lock().insert(id);
    }

    pub fn heal_children_of(&self, id: NodeId) {
        self.failing_children.lock().remove(&id);
    }

    /// Every call waits this long before answering.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn children_calls(&self) -> usize {
        self.children_calls.load(Ordering::SeqCst)
    }

    /// Current stored ordering of `scope`, sorted by parent then position.
    pub fn ordering(&self, scope: &Scope) -> Vec<ReorderItem> {
        let scopes = self.scopes.lock();
        let mut items: Vec<ReorderItem> = scopes
            .get(scope)
            .map(|records| {
                records
                    .iter()
                    .map(|r| ReorderItem {
                        id: r.id,
                        position: r.position,
                        parent_id: r.parent_id,
                    })
                    .collect()
            })
            .unwrap_or_default();
        items.sort_by_key(|i| (i.parent_id, i.position));
        items
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl<P: Clone> InMemoryGateway<P> {
    fn children_of(records: &[Record<P>], parent_id: Option<NodeId>) -> Vec<&Record<P>> {
        let mut children: Vec<&Record<P>> = records
            .iter()
            .filter(|r| r.parent_id == parent_id)
            .collect();
        children.sort_by_key(|r| r.position);
        children
    }

    fn build(records: &[Record<P>], parent_id: Option<NodeId>, level: u32) -> Vec<MenuNode<P>> {
        Self::children_of(records, parent_id)
            .into_iter()
            .map(|r| MenuNode {
                id: r.id,
                parent_id: r.parent_id,
                position: r.position,
                level,
                children: Self::build(records, Some(r.id), level + 1),
                payload: r.payload.clone(),
            })
            .collect()
    }

    fn validate(records: &[Record<P>], items: &[ReorderItem]) -> Result<()> {
        let known: HashSet<NodeId> = records.iter().map(|r| r.id).collect();
        let mut seen = HashSet::new();
        for item in items {
            if !known.contains(&item.id) {
                return Err(MenuError::GatewayError(format!(
                    "Unknown node {} in reorder request",
                    item.id
                )));
            }
            if let Some(parent) = item.parent_id {
                if !known.contains(&parent) || parent == item.id {
                    return Err(MenuError::GatewayError(format!(
                        "Invalid parent {} for node {}",
                        parent, item.id
                    )));
                }
            }
            if !seen.insert(item.id) {
                return Err(MenuError::GatewayError(format!(
                    "Node {} listed twice in reorder request",
                    item.id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<P> PersistenceGateway<P> for InMemoryGateway<P>
where
    P: Clone + Send + Sync + 'static,
{
    async fn fetch_tree(&self, scope: &Scope) -> Result<Vec<MenuNode<P>>> {
        self.simulate_latency().await;
        let scopes = self.scopes.lock();
        let records = scopes
            .get(scope)
            .ok_or_else(|| MenuError::GatewayError(format!("Unknown scope {}", scope)))?;
        Ok(Self::build(records, None, 0))
    }

    async fn fetch_children(&self, scope: &Scope, parent_id: NodeId) -> Result<Vec<MenuNode<P>>> {
        self.children_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.failing_children.lock().contains(&parent_id) {
            return Err(MenuError::GatewayError(format!(
                "Children of {} unavailable",
                parent_id
            )));
        }
        let scopes = self.scopes.lock();
        let records = scopes
            .get(scope)
            .ok_or_else(|| MenuError::GatewayError(format!("Unknown scope {}", scope)))?;
        let parent = records
            .iter()
            .find(|r| r.id == parent_id)
            .ok_or_else(|| MenuError::GatewayError(format!("Unknown node {}", parent_id)))?;
        let level = {
            let mut level = 1;
            let mut current = parent.parent_id;
            while let Some(p) = current {
                level += 1;
                current = records.iter().find(|r| r.id == p).and_then(|r| r.parent_id);
            }
            level
        };
        Ok(Self::children_of(records, Some(parent_id))
            .into_iter()
            .map(|r| MenuNode {
                id: r.id,
                parent_id: r.parent_id,
                position: r.position,
                level,
                children: Vec::new(),
                payload: r.payload.clone(),
            })
            .collect())
    }

    async fn commit_reorder(&self, scope: &Scope, items: &[ReorderItem]) -> Result<()> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let failing = self.failing_commits.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_commits.store(failing - 1, Ordering::SeqCst);
            return Err(MenuError::GatewayError("Injected commit failure".to_string()));
        }

        let mut scopes = self.scopes.lock();
        let records = scopes
            .get_mut(scope)
            .ok_or_else(|| MenuError::GatewayError(format!("Unknown scope {}", scope)))?;
        Self::validate(records, items)?;

        let updates: HashMap<NodeId, &ReorderItem> = items.iter().map(|i| (i.id, i)).collect();
        for record in records.iter_mut() {
            if let Some(item) = updates.get(&record.id) {
                record.parent_id = item.parent_id;
                record.position = item.position;
            }
        }
        debug!(scope = %scope, items = items.len(), "Stored reorder");
        Ok(())
    }

    async fn fetch_next_position(&self, scope: &Scope, parent_id: Option<NodeId>) -> Result<u32> {
        self.simulate_latency().await;
        let scopes = self.scopes.lock();
        let next = scopes
            .get(scope)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.parent_id == parent_id)
                    .map(|r| r.position + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        Ok(next)
    }
}
