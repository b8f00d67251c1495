//! Index configuration.
//!
//! [`IndexConfig`] is a plain value: build it with the fluent `with_*` setters,
//! then hand it to [`RTree::create`](crate::RTree::create) or
//! [`RTree::bulk_load`](crate::RTree::bulk_load), which call [`IndexConfig::validate`].
//! The configuration is persisted in the tree header so a reopened tree keeps
//! the parameters it was built with.

use serde::{Deserialize, Serialize};

use crate::errors::{SpatialError, SpatialResult};

/// Default maximum number of children per node.
pub const DEFAULT_CAPACITY: usize = 64;
/// Default minimum fill fraction.
pub const DEFAULT_FILL_FACTOR: f64 = 0.4;
/// Default fraction of `capacity + 1` children removed by a forced reinsertion.
pub const DEFAULT_REINSERT_FACTOR: f64 = 0.3;
/// Default lookahead horizon of moving-region trees.
pub const DEFAULT_HORIZON: f64 = 20.0;
/// Default node utilization targeted by bulk loading.
pub const DEFAULT_BULK_FILL_FACTOR: f64 = 0.7;

/// Node splitting algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SplitPolicy {
    /// R*-tree: forced reinsertion on first overflow, overlap-minimizing split.
    #[default]
    RStar,
    /// Guttman's quadratic split. Never reinserts.
    Quadratic,
    /// Guttman's linear split. Never reinserts.
    Linear,
}

/// Ordering used to pack entries into nodes during bulk loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BulkLoadOrder {
    /// Sort-Tile-Recursive packing, generalized to N dimensions.
    #[default]
    SortTileRecursive,
    /// Entries ordered by the Hilbert key of their centers.
    Hilbert,
}

/// Parameters of an R-tree family index.
///
/// # Examples
///
/// ```rust
/// use spatialindex::{IndexConfig, SplitPolicy};
///
/// let config = IndexConfig::new(3)
///     .with_capacity(16)
///     .with_fill_factor(0.5)
///     .with_split_policy(SplitPolicy::Quadratic);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.min_entries(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub dimension: usize,
    pub capacity: usize,
    pub fill_factor: f64,
    pub reinsert_factor: f64,
    pub horizon: f64,
    pub split_policy: SplitPolicy,
    pub bulk_fill_factor: f64,
    pub bulk_load_order: BulkLoadOrder,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: 2,
            capacity: DEFAULT_CAPACITY,
            fill_factor: DEFAULT_FILL_FACTOR,
            reinsert_factor: DEFAULT_REINSERT_FACTOR,
            horizon: DEFAULT_HORIZON,
            split_policy: SplitPolicy::default(),
            bulk_fill_factor: DEFAULT_BULK_FILL_FACTOR,
            bulk_load_order: BulkLoadOrder::default(),
        }
    }
}

impl IndexConfig {
    /// Creates a default configuration for the given dimensionality.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_fill_factor(mut self, fill_factor: f64) -> Self {
        self.fill_factor = fill_factor;
        self
    }

    pub fn with_reinsert_factor(mut self, reinsert_factor: f64) -> Self {
        self.reinsert_factor = reinsert_factor;
        self
    }

    pub fn with_horizon(mut self, horizon: f64) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_split_policy(mut self, split_policy: SplitPolicy) -> Self {
        self.split_policy = split_policy;
        self
    }

    pub fn with_bulk_fill_factor(mut self, bulk_fill_factor: f64) -> Self {
        self.bulk_fill_factor = bulk_fill_factor;
        self
    }

    pub fn with_bulk_load_order(mut self, order: BulkLoadOrder) -> Self {
        self.bulk_load_order = order;
        self
    }

    /// Minimum number of children of a non-root node.
    pub fn min_entries(&self) -> usize {
        ((self.capacity as f64 * self.fill_factor).floor() as usize).max(1)
    }

    /// Number of children removed from an overflowing node by forced reinsertion.
    ///
    /// Clamped so that the node keeps at least [`min_entries`](Self::min_entries)
    /// children.
    pub fn reinsert_count(&self) -> usize {
        let wanted = (self.reinsert_factor * (self.capacity + 1) as f64).floor() as usize;
        wanted.min(self.capacity + 1 - self.min_entries())
    }

    /// Number of children bulk loading aims to place in each node.
    pub fn bulk_target(&self) -> usize {
        ((self.capacity as f64 * self.bulk_fill_factor).floor() as usize)
            .clamp(self.min_entries(), self.capacity)
    }

    /// Returns `true` when overflowing nodes may be treated by forced reinsertion.
    pub fn uses_reinsertion(&self) -> bool {
        self.split_policy == SplitPolicy::RStar && self.reinsert_count() > 0
    }

    /// Checks every parameter, failing with `CapacityMisconfigured`.
    pub fn validate(&self) -> SpatialResult<()> {
        if self.dimension == 0 {
            return Err(misconfigured("dimension must be greater than zero"));
        }
        if self.capacity < 3 {
            return Err(misconfigured(format!(
                "capacity must be at least 3, got {}",
                self.capacity
            )));
        }
        if !(self.fill_factor > 0.0 && self.fill_factor <= 0.5) {
            return Err(misconfigured(format!(
                "fill factor must be in (0, 0.5], got {}",
                self.fill_factor
            )));
        }
        if !(self.reinsert_factor >= 0.0 && self.reinsert_factor < 1.0) {
            return Err(misconfigured(format!(
                "reinsert factor must be in [0, 1), got {}",
                self.reinsert_factor
            )));
        }
        if !(self.horizon > 0.0 && self.horizon.is_finite()) {
            return Err(misconfigured(format!(
                "horizon must be positive and finite, got {}",
                self.horizon
            )));
        }
        if !(self.bulk_fill_factor > 0.0 && self.bulk_fill_factor <= 1.0) {
            return Err(misconfigured(format!(
                "bulk fill factor must be in (0, 1], got {}",
                self.bulk_fill_factor
            )));
        }
        Ok(())
    }
}

fn misconfigured(reason: impl Into<String>) -> SpatialError {
    SpatialError::CapacityMisconfigured(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IndexConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_entries(), 25);
        assert_eq!(config.reinsert_count(), 19);
        assert_eq!(config.bulk_target(), 44);
        assert!(config.uses_reinsertion());
    }

    #[test]
    fn test_min_entries_is_at_least_one() {
        let config = IndexConfig::new(2).with_capacity(3).with_fill_factor(0.1);
        assert_eq!(config.min_entries(), 1);
    }

    #[test]
    fn test_small_capacity_values() {
        let config = IndexConfig::new(2).with_capacity(4).with_fill_factor(0.5);
        assert_eq!(config.min_entries(), 2);
        // floor(0.3 * 5) = 1
        assert_eq!(config.reinsert_count(), 1);
        assert_eq!(config.bulk_target(), 2);
    }

    #[test]
    fn test_reinsert_count_keeps_minimum_fill() {
        let config = IndexConfig::new(2)
            .with_capacity(10)
            .with_fill_factor(0.5)
            .with_reinsert_factor(0.9);
        // 11 children, at least 5 must stay
        assert_eq!(config.reinsert_count(), 6);
    }

    #[test]
    fn test_non_rstar_policies_never_reinsert() {
        let config = IndexConfig::default().with_split_policy(SplitPolicy::Linear);
        assert!(!config.uses_reinsertion());
        let config = IndexConfig::default().with_reinsert_factor(0.0);
        assert!(!config.uses_reinsertion());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            IndexConfig::new(0),
            IndexConfig::new(2).with_capacity(2),
            IndexConfig::new(2).with_fill_factor(0.0),
            IndexConfig::new(2).with_fill_factor(0.6),
            IndexConfig::new(2).with_fill_factor(f64::NAN),
            IndexConfig::new(2).with_reinsert_factor(1.0),
            IndexConfig::new(2).with_reinsert_factor(-0.1),
            IndexConfig::new(2).with_horizon(0.0),
            IndexConfig::new(2).with_horizon(f64::INFINITY),
            IndexConfig::new(2).with_bulk_fill_factor(0.0),
            IndexConfig::new(2).with_bulk_fill_factor(1.5),
        ];
        for config in bad.iter() {
            assert!(
                matches!(config.validate(), Err(SpatialError::CapacityMisconfigured(_))),
                "accepted {:?}",
                config
            );
        }
    }

    #[test]
    fn test_config_roundtrips_through_bincode() {
        let config = IndexConfig::new(3)
            .with_split_policy(SplitPolicy::Quadratic)
            .with_bulk_load_order(BulkLoadOrder::Hilbert);
        let bytes = bincode::serde::encode_to_vec(&config, bincode::config::legacy()).unwrap();
        let (decoded, _): (IndexConfig, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::legacy()).unwrap();
        assert_eq!(decoded, config);
    }
}
