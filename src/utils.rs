//! Utility functions for configuration and diagnostics.
//!
//! This module provides helper functions for:
//! - Reading typed values from the environment
//! - Pretty printing a menu forest

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::{
    error::{MenuError, Result},
    tree::Forest,
};

/// Reads a required environment variable.
pub fn env_var(name: &str) -> Result<String> {
    dotenv::var(name).map_err(|_| MenuError::EnvVarNotFound(name.to_string()))
}

/// Reads an optional environment variable, parsing it when present.
pub fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match dotenv::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| MenuError::InvalidEnvVar(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Reads an optional humantime duration such as `250ms` or `10s`.
pub fn env_duration(name: &str) -> Result<Option<Duration>> {
    match dotenv::var(name) {
        Ok(raw) => humantime::parse_duration(raw.trim()).map(Some).map_err(|e| {
            MenuError::InvalidEnvVar(format!("{} must be a duration like 250ms: {}", name, e))
        }),
        Err(_) => Ok(None),
    }
}

/// Pretty prints a forest, showing the hierarchy with indentation.
pub fn pretty_print_tree<P: Display>(forest: &Forest<P>) {
    // Stack holds (node, depth) pairs
    let mut stack: Vec<_> = forest.roots().iter().rev().map(|id| (*id, 0)).collect();

    while let Some((id, depth)) = stack.pop() {
        let Some(node) = forest.get(id) else {
            continue;
        };
        let indent = " | ".repeat(depth);
        info!("{}{} [{}] {}", indent, id, node.position(), node.payload());

        // Push children in reverse so they print in order
        for child in node.children().iter().rev() {
            stack.push((*child, depth + 1));
        }
    }
}
