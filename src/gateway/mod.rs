//! Persistence gateway boundary.
//!
//! The engine never owns persistence. It proposes orderings and requests
//! children through this trait and treats every call as asynchronous and
//! possibly failing.

pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{MenuNode, NodeId, ReorderItem, Scope};

pub use http::HttpGateway;
pub use memory::InMemoryGateway;

#[async_trait]
pub trait PersistenceGateway<P>: Send + Sync {
    /// Bulk fetch of the whole tree for `scope`.
    async fn fetch_tree(&self, scope: &Scope) -> Result<Vec<MenuNode<P>>>;

    /// One level of children under `parent_id`, in sibling order.
    ///
    /// Must be side-effect free. An empty list is a valid answer and differs from failure.
    async fn fetch_children(&self, scope: &Scope, parent_id: NodeId) -> Result<Vec<MenuNode<P>>>;

    /// Applies a complete ordering. Either every item is applied or none is.
    async fn commit_reorder(&self, scope: &Scope, items: &[ReorderItem]) -> Result<()>;

    /// The position a new node under `parent_id` should take.
    async fn fetch_next_position(&self, scope: &Scope, parent_id: Option<NodeId>) -> Result<u32>;
}
