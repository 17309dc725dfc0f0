//! Node identifier allocation.
//!
//! Node ids are strings unique within one tree. The allocator is injected
//! into the graph engine so tests can rely on deterministic ids.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of fresh node identifiers.
pub trait NodeIdAllocator: Send + Sync {
    /// Produce a new identifier. Uniqueness within a tree is checked by the caller.
    fn next_id(&self) -> String;
}

/// Allocates `node-<uuid v4>` identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidAllocator;

impl NodeIdAllocator for UuidAllocator {
    fn next_id(&self) -> String {
        format!("node-{}", Uuid::new_v4())
    }
}

/// Allocates `<prefix>-1`, `<prefix>-2`, ... in order.
#[derive(Debug)]
pub struct SequentialAllocator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialAllocator {
    /// Create an allocator counting from 1
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialAllocator {
    fn default() -> Self {
        Self::new("node")
    }
}

impl NodeIdAllocator for SequentialAllocator {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}
