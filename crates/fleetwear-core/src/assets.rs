//! Asset identifiers handed out to devices on first sight.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Label correlating a device with the external asset-tracking system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Wrap a label.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Borrow the label.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for AssetId {
    fn from(label: String) -> Self {
        Self(label)
    }
}

/// FIFO pool of asset ids.
///
/// Ids are never returned individually. Once the pool is empty every further
/// [`allocate`](Self::allocate) yields `None` until [`reset`](Self::reset)
/// restores the original ordering, orphaning whatever was handed out before.
///
/// The allocator is a plain value; callers that share it across threads put
/// it behind the same lock as the state it feeds (see
/// [`DeviceRegistry`](crate::DeviceRegistry)).
#[derive(Debug, Clone)]
pub struct AssetIdAllocator {
    initial: Vec<AssetId>,
    pool: VecDeque<AssetId>,
}

impl AssetIdAllocator {
    /// Create an allocator that hands out `ids` in order.
    pub fn new<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<AssetId>,
    {
        let initial: Vec<AssetId> = ids.into_iter().map(Into::into).collect();
        let pool = initial.iter().cloned().collect();
        Self { initial, pool }
    }

    /// Take the next id, or `None` when the pool is exhausted.
    pub fn allocate(&mut self) -> Option<AssetId> {
        self.pool.pop_front()
    }

    /// Restore the full initial pool.
    pub fn reset(&mut self) {
        self.pool.clear();
        self.pool.extend(self.initial.iter().cloned());
    }

    /// Ids still available.
    pub fn remaining(&self) -> usize {
        self.pool.len()
    }

    /// Size of the initial pool.
    pub fn capacity(&self) -> usize {
        self.initial.len()
    }
}

impl Default for AssetIdAllocator {
    fn default() -> Self {
        Self::new((1..=16).map(|n| format!("asset-{n:02}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_in_order_then_runs_dry() {
        let mut pool = AssetIdAllocator::new(["A1", "A2"]);
        assert_eq!(pool.allocate(), Some(AssetId::new("A1")));
        assert_eq!(pool.allocate(), Some(AssetId::new("A2")));
        assert_eq!(pool.allocate(), None);
        assert_eq!(pool.allocate(), None);
        assert_eq!(pool.remaining(), 0);
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn reset_restores_original_order() {
        let mut pool = AssetIdAllocator::new(["A1", "A2", "A3"]);
        let _first = pool.allocate();
        let _second = pool.allocate();
        pool.reset();
        assert_eq!(pool.remaining(), 3);
        assert_eq!(pool.allocate(), Some(AssetId::new("A1")));
    }

    #[test]
    fn default_pool_has_sixteen_labels() {
        let mut pool = AssetIdAllocator::default();
        assert_eq!(pool.capacity(), 16);
        assert_eq!(pool.allocate().as_ref().map(AssetId::as_str), Some("asset-01"));
    }

    #[test]
    fn empty_pool_never_allocates() {
        let mut pool = AssetIdAllocator::new(Vec::<String>::new());
        assert_eq!(pool.allocate(), None);
        pool.reset();
        assert_eq!(pool.allocate(), None);
    }
}
