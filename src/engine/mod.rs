pub mod cache;
pub mod commit;
pub mod drag;

use chrono::Utc;
use futures::future;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    error::{MenuError, Result},
    gateway::PersistenceGateway,
    tree::Forest,
    types::{EngineStats, MenuNode, NodeId, ReorderItem, Scope},
    utils::{env_duration, env_parse, env_var},
};

use self::{
    cache::{CacheState, ChildCache, Children, Completion},
    commit::CommitManager,
    drag::{DragMachine, DragOver, DragStart, DropDecision, Phase, RefuseReason},
};

/// Configuration for the engine, normally loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Which menu every gateway call targets
    pub scope: Scope,
    /// Extra attempts after a failed commit before rolling back
    pub commit_max_retries: u32,
    /// Base delay between commit attempts
    pub commit_retry_base_delay: Duration,
    /// Maximum number of cached child lists, unbounded if `None`
    pub child_cache_capacity: Option<NonZeroUsize>,
}

impl Config {
    /// Defaults for `scope`: no commit retries, 250ms base delay, unbounded cache.
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            commit_max_retries: 0,
            commit_retry_base_delay: Duration::from_millis(250),
            child_cache_capacity: None,
        }
    }

    /// Creates a new Config instance by loading values from environment variables.
    /// `MENU_SCOPE` is required; everything else falls back to [`Config::new`].
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::new(Scope::new(env_var("MENU_SCOPE")?));
        if let Some(retries) = env_parse::<u32>("COMMIT_MAX_RETRIES")? {
            config.commit_max_retries = retries;
        }
        if let Some(delay) = env_duration("COMMIT_RETRY_BASE_DELAY")? {
            config.commit_retry_base_delay = delay;
        }
        config.child_cache_capacity = env_parse::<NonZeroUsize>("CHILD_CACHE_CAPACITY")?;
        Ok(config)
    }
}

/// Result of dropping the dragged node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// The gateway accepted the ordering; `refreshed` expanded nodes were re-fetched.
    Committed {
        items: Vec<ReorderItem>,
        refreshed: usize,
    },
    /// The final tree equals the pre-drag tree; the gateway was not called.
    NoChange,
    /// Dropped outside a valid sibling; the gateway was not called.
    NotDroppable,
    NotDragging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// Children fetched and stored; holds the child count.
    Loaded(usize),
    /// Fetch failed; the node stays collapsed and can be expanded again.
    Failed,
    /// The node is gone or a newer fetch superseded this one.
    Discarded,
    AlreadyLoading,
}

struct EngineState<P> {
    working: Forest<P>,
    machine: DragMachine<P>,
    cache: ChildCache<P>,
    stats: EngineStats,
}

impl<P: Clone> EngineState<P> {
    /// Grafts the cached children of `id` into the working tree.
    fn apply_cached(&mut self, id: NodeId) -> bool {
        let Some(children) = self.cache.children(id) else {
            return false;
        };
        if !self.working.contains(id) {
            return false;
        }
        match self.working.graft_children(id, &children) {
            Ok(()) => true,
            Err(e) => {
                warn!(node = %id, error = %e, "Fetched children rejected");
                self.cache.fail(id);
                false
            }
        }
    }

    /// Applies children that arrived while a gesture was active.
    fn settle(&mut self) {
        for id in self.cache.take_parked() {
            if self.working.contains(id) {
                self.apply_cached(id);
            } else {
                self.cache.forget(id);
            }
        }
    }
}

/// Rolls back an outstanding commit whose future was dropped before the
/// gateway answered, so the machine never stays in `committing`.
struct AbandonedCommit<'a, P: Clone> {
    state: &'a Mutex<EngineState<P>>,
    armed: bool,
}

impl<P: Clone> Drop for AbandonedCommit<'_, P> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock();
        let EngineState {
            working,
            machine,
            stats,
            ..
        } = &mut *state;
        if machine.resolve(working, false) {
            stats.rollbacks += 1;
            warn!("Commit abandoned before the gateway answered, pre-drag tree restored");
        }
        state.settle();
    }
}

/// Keeps a local working tree in step with a remote store while the user
/// reorders siblings by dragging.
///
/// All tree work is synchronous and happens under a short-lived lock; the
/// lock is never held across a gateway call, so children fetches for
/// different nodes can be outstanding at the same time.
pub struct ReorderEngine<P, G> {
    scope: Scope,
    gateway: Arc<G>,
    committer: CommitManager<G>,
    state: Mutex<EngineState<P>>,
}

impl<P, G> ReorderEngine<P, G>
where
    P: Clone + Send + Sync + 'static,
    G: PersistenceGateway<P>,
{
    /// Creates an engine with an empty tree.
    pub fn new(gateway: Arc<G>, config: Config) -> Self {
        let committer = CommitManager::new(gateway.clone(), &config);
        Self {
            scope: config.scope,
            gateway,
            committer,
            state: Mutex::new(EngineState {
                working: Forest::new(),
                machine: DragMachine::new(),
                cache: ChildCache::new(config.child_cache_capacity),
                stats: EngineStats::default(),
            }),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Replaces the working tree with a bulk-loaded one.
    ///
    /// Cached children of expanded nodes are grafted back in; expanded nodes
    /// missing from the new tree are forgotten.
    ///
    /// # Errors
    /// * [`MenuError::Busy`] while a drag or commit is active
    /// * [`MenuError::DuplicateNode`] if the nodes repeat an id
    pub fn load(&self, nodes: Vec<MenuNode<P>>) -> Result<()> {
        let forest = Forest::from_nodes(nodes)?;
        let mut state = self.state.lock();
        if !state.machine.is_idle() {
            return Err(MenuError::Busy("a drag or commit is in progress"));
        }
        state.working = forest;
        for id in state.cache.expanded() {
            if state.working.contains(id) {
                state.apply_cached(id);
            } else {
                state.cache.forget(id);
            }
        }
        info!(scope = %self.scope, nodes = state.working.len(), "Tree loaded");
        Ok(())
    }

    /// Fetches the whole tree from the gateway, loads it and re-fetches every expanded node.
    ///
    /// Returns the number of expanded nodes refreshed.
    pub async fn reload(&self) -> Result<usize> {
        let nodes = self.gateway.fetch_tree(&self.scope).await?;
        self.load(nodes)?;
        Ok(self.refresh_expanded().await)
    }

    /// Copy of the current working tree (the preview while dragging).
    pub fn tree(&self) -> Forest<P> {
        self.state.lock().working.clone()
    }

    pub fn nodes(&self) -> Vec<MenuNode<P>> {
        self.state.lock().working.to_nodes()
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().machine.phase()
    }

    pub fn dragged(&self) -> Option<NodeId> {
        self.state.lock().machine.source()
    }

    pub fn drop_target(&self) -> Option<NodeId> {
        self.state.lock().machine.target()
    }

    pub fn stats(&self) -> EngineStats {
        self.state.lock().stats.clone()
    }

    /// Starts dragging `source`. Refused while a previous commit is outstanding.
    pub fn drag_start(&self, source: NodeId) -> DragStart {
        let mut state = self.state.lock();
        let EngineState {
            working,
            machine,
            stats,
            ..
        } = &mut *state;
        let outcome = machine.start(working, source);
        if outcome == DragStart::Refused(RefuseReason::CommitPending) {
            stats.refused_drags += 1;
        }
        outcome
    }

    /// The pointer entered `candidate`; applies a preview if it is a sibling of the dragged node.
    pub fn drag_over(&self, candidate: NodeId) -> DragOver {
        let mut state = self.state.lock();
        let EngineState {
            working,
            machine,
            stats,
            ..
        } = &mut *state;
        let outcome = machine.over(working, candidate);
        if outcome == DragOver::Previewed {
            stats.previews += 1;
        }
        outcome
    }

    /// The pointer left `candidate`. The last preview stays in place.
    pub fn drag_leave(&self, candidate: NodeId) -> bool {
        self.state.lock().machine.leave(candidate)
    }

    /// Abandons the current drag and restores the pre-drag tree.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        let EngineState {
            working, machine, ..
        } = &mut *state;
        if !machine.cancel(working) {
            return false;
        }
        info!(scope = %self.scope, "Drag cancelled, tree restored");
        state.settle();
        true
    }

    /// Ends the drag on `target`.
    ///
    /// A valid drop that changed the order is sent to the gateway. On success
    /// the preview becomes canonical and every expanded node is re-fetched;
    /// on failure the pre-drag tree is restored before the error is returned.
    /// Dropping the returned future while the gateway call is outstanding
    /// also restores the pre-drag tree.
    ///
    /// # Errors
    /// * [`MenuError::CommitFailed`] when the gateway rejected the ordering
    pub async fn drop_on(&self, target: Option<NodeId>) -> Result<DropOutcome> {
        let decision = {
            let mut state = self.state.lock();
            let EngineState {
                working,
                machine,
                stats,
                ..
            } = &mut *state;
            let decision = machine.drop_on(working, target);
            if matches!(decision, DropDecision::NotDroppable | DropDecision::NoChange) {
                stats.noop_drops += 1;
                state.settle();
            }
            decision
        };

        let items = match decision {
            DropDecision::Commit(items) => items,
            DropDecision::NotDragging => return Ok(DropOutcome::NotDragging),
            DropDecision::NotDroppable => return Ok(DropOutcome::NotDroppable),
            DropDecision::NoChange => return Ok(DropOutcome::NoChange),
        };
        info!(scope = %self.scope, items = items.len(), "Committing reorder");
        self.finish_drop(items).await
    }

    async fn finish_drop(&self, items: Vec<ReorderItem>) -> Result<DropOutcome> {
        let mut guard = AbandonedCommit {
            state: &self.state,
            armed: true,
        };
        let result = self.committer.commit::<P>(&self.scope, &items).await;
        guard.armed = false;
        let committed = result.is_ok();
        {
            let mut state = self.state.lock();
            let EngineState {
                working,
                machine,
                stats,
                ..
            } = &mut *state;
            machine.resolve(working, committed);
            if committed {
                stats.commits += 1;
                stats.last_commit_at = Some(Utc::now());
            } else {
                stats.rollbacks += 1;
                warn!(scope = %self.scope, "Commit failed, pre-drag tree restored");
            }
            state.settle();
        }

        match result {
            Ok(()) => {
                let refreshed = self.refresh_expanded().await;
                Ok(DropOutcome::Committed { items, refreshed })
            }
            Err(e) => Err(MenuError::CommitFailed(e.to_string())),
        }
    }

    /// Expands `id` and fetches its children.
    ///
    /// Previously cached children are shown right away and replaced when the
    /// fetch resolves.
    pub async fn expand(&self, id: NodeId) -> ExpandOutcome {
        let ticket = {
            let mut state = self.state.lock();
            if !state.working.contains(id) {
                debug!(node = %id, "Expand ignored, node not in tree");
                return ExpandOutcome::Discarded;
            }
            let Some(fetch) = state.cache.begin(id, false) else {
                return ExpandOutcome::AlreadyLoading;
            };
            state.stats.fetches += 1;
            if fetch.previous.is_some() && state.machine.is_idle() {
                debug!(node = %id, "Showing cached children while reloading");
                state.apply_cached(id);
            }
            fetch.ticket
        };

        let result = self.gateway.fetch_children(&self.scope, id).await;
        self.finish_fetch(id, ticket, result)
    }

    /// Collapses `id`. Its cached children are kept for the next expand.
    pub fn collapse(&self, id: NodeId) -> bool {
        self.state.lock().cache.collapse(id)
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.state.lock().cache.is_expanded(id)
    }

    pub fn is_loading(&self, id: NodeId) -> bool {
        self.state.lock().cache.is_loading(id)
    }

    pub fn cache_state(&self, id: NodeId) -> CacheState {
        self.state.lock().cache.state(id)
    }

    /// The cached child list for `id`, including the previous list while reloading.
    pub fn cached_children(&self, id: NodeId) -> Option<Children<P>> {
        self.state.lock().cache.children(id)
    }

    /// Asks the gateway where a new node under `parent` should go.
    pub async fn next_position(&self, parent: Option<NodeId>) -> Result<u32> {
        self.gateway.fetch_next_position(&self.scope, parent).await
    }

    /// Adds a freshly created node to the working tree at the position the
    /// gateway hands out. Returns the position it ended up at.
    ///
    /// # Errors
    /// * [`MenuError::Busy`] while a drag or commit is active
    /// * [`MenuError::UnknownNode`] if `parent` is not in the tree
    /// * [`MenuError::DuplicateNode`] if `id` is already present
    pub async fn insert_node(&self, parent: Option<NodeId>, id: NodeId, payload: P) -> Result<u32> {
        {
            let state = self.state.lock();
            if !state.machine.is_idle() {
                return Err(MenuError::Busy("a drag or commit is in progress"));
            }
            if let Some(parent) = parent.filter(|p| !state.working.contains(*p)) {
                return Err(MenuError::UnknownNode(parent));
            }
        }

        let position = self.next_position(parent).await?;

        let mut state = self.state.lock();
        if !state.machine.is_idle() {
            return Err(MenuError::Busy("a drag or commit is in progress"));
        }
        state.working.insert(parent, id, position, payload)?;
        let placed = state
            .working
            .get(id)
            .map(|n| n.position())
            .unwrap_or(position);
        info!(node = %id, parent = ?parent, position = placed, "Node inserted");
        Ok(placed)
    }

    fn finish_fetch(&self, id: NodeId, ticket: u64, result: Result<Vec<MenuNode<P>>>) -> ExpandOutcome {
        let mut state = self.state.lock();
        match state.cache.complete(id, ticket, result) {
            Completion::Stale => {
                debug!(node = %id, ticket, "Discarding superseded children");
                ExpandOutcome::Discarded
            }
            Completion::Failed(e) => {
                state.stats.fetch_failures += 1;
                warn!(node = %id, error = %e, "Children fetch failed, node left collapsed");
                ExpandOutcome::Failed
            }
            Completion::Loaded(children) => {
                if !state.working.contains(id) {
                    debug!(node = %id, "Node left the tree before its children arrived");
                    state.cache.forget(id);
                    return ExpandOutcome::Discarded;
                }
                if state.machine.is_idle() {
                    if !state.apply_cached(id) {
                        return ExpandOutcome::Failed;
                    }
                } else {
                    state.cache.park(id);
                }
                info!(node = %id, children = children.len(), "Children loaded");
                ExpandOutcome::Loaded(children.len())
            }
        }
    }

    /// Re-fetches children of every expanded node, concurrently.
    async fn refresh_expanded(&self) -> usize {
        let pending = {
            let mut state = self.state.lock();
            let mut pending = Vec::new();
            for id in state.cache.expanded() {
                if !state.working.contains(id) {
                    state.cache.forget(id);
                    continue;
                }
                if let Some(fetch) = state.cache.begin(id, true) {
                    state.stats.fetches += 1;
                    pending.push((id, fetch.ticket));
                }
            }
            pending
        };
        if pending.is_empty() {
            return 0;
        }
        debug!(nodes = pending.len(), "Refreshing expanded nodes");

        let fetches = pending.into_iter().map(|(id, ticket)| async move {
            let result = self.gateway.fetch_children(&self.scope, id).await;
            self.finish_fetch(id, ticket, result)
        });
        future::join_all(fetches)
            .await
            .into_iter()
            .filter(|outcome| matches!(outcome, ExpandOutcome::Loaded(_)))
            .count()
    }
}
