//! Core type definitions for menu trees.
//!
//! This module contains the identifiers, the nested wire form of a menu node,
//! the flattened reorder projection sent to the persistence gateway, and the
//! counters the engine keeps about its own activity.

use chrono::{DateTime, Utc};
use core::fmt;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Stable identifier of a menu node. Also the arena key inside a [`Forest`](crate::Forest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Which logical tree (which menu) a gateway call applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(pub String);

impl Scope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Nested form of a menu node, as returned by a bulk tree fetch or a children fetch.
///
/// `payload` is opaque to the engine: it is carried along but never inspected.
/// `level` and `position` are recomputed whenever the node is ingested into a
/// [`Forest`](crate::Forest), so incoming values only decide the initial sibling order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuNode<P> {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub level: u32,
    /// Empty when the subtree has not been loaded yet.
    #[serde(default = "Vec::new")]
    pub children: Vec<MenuNode<P>>,
    #[serde(flatten)]
    pub payload: P,
}

impl<P> MenuNode<P> {
    /// Creates a root-level leaf node.
    pub fn new(id: impl Into<NodeId>, payload: P) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            position: 0,
            level: 0,
            children: Vec::new(),
            payload,
        }
    }

    /// Builder-style helper that attaches children in the given order.
    pub fn with_children(mut self, children: Vec<MenuNode<P>>) -> Self {
        self.children = children;
        self
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = position;
        self
    }

    pub fn with_parent(mut self, parent_id: Option<NodeId>) -> Self {
        self.parent_id = parent_id;
        self
    }
}

/// Flattened projection of one node used to communicate a full ordering.
///
/// A missing `parentId` on the wire, an explicit `null` and `None` all mean
/// "root level".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderItem {
    pub id: NodeId,
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
}

/// The kind of entry a menu node renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MenuKind {
    #[default]
    Directory,
    Page,
    Link,
    Button,
}

/// Concrete payload used by the binary and the HTTP gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuEntry {
    pub label: String,
    #[serde(default)]
    pub kind: MenuKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl MenuEntry {
    pub fn new(label: impl Into<String>, kind: MenuKind) -> Self {
        Self {
            label: label.into(),
            kind,
            icon: None,
            path: None,
            visible: true,
        }
    }
}

impl Display for MenuEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.label, self.kind)?;
        if !self.visible {
            write!(f, " [hidden]")?;
        }
        Ok(())
    }
}

/// Running counters about engine activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Preview trees applied while dragging
    pub previews: u64,
    /// Reorders accepted by the gateway
    pub commits: u64,
    /// Commits that failed and restored the pre-drag snapshot
    pub rollbacks: u64,
    /// Drops that ended without reaching the gateway
    pub noop_drops: u64,
    /// Drag starts refused because a commit was outstanding
    pub refused_drags: u64,
    /// Children fetches issued
    pub fetches: u64,
    /// Children fetches that failed
    pub fetch_failures: u64,
    pub last_commit_at: Option<DateTime<Utc>>,
}
