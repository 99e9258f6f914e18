pub mod diff;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod reorder;
pub mod tree;
pub mod types;
pub mod utils;

pub use diff::{flatten, has_changed};
pub use engine::{
    cache::CacheState,
    drag::{DragOver, DragStart, Phase, RefuseReason},
    Config, DropOutcome, ExpandOutcome, ReorderEngine,
};
pub use error::{MenuError, Result};
pub use gateway::{HttpGateway, InMemoryGateway, PersistenceGateway};
pub use reorder::reorder;
pub use tree::{Forest, Location};
pub use types::{EngineStats, MenuEntry, MenuKind, MenuNode, NodeId, ReorderItem, Scope};
