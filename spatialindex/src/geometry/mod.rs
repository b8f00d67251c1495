//! Bounding geometry used as keys of the tree.
//!
//! [`Region`] is a static axis-aligned box and [`MovingRegion`] a box whose
//! bounds move linearly over a finite horizon. Both implement [`Bounds`], the
//! arithmetic the tree engine needs from a key.

mod moving_region;
mod region;

pub use moving_region::MovingRegion;
pub use region::Region;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

use crate::errors::SpatialResult;

/// Bounding-region arithmetic required by the tree engine.
///
/// Every binary operation fails with `DimensionMismatch` when the operands have
/// different dimensionalities.
pub trait Bounds:
    Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn dimension(&self) -> usize;

    /// Measure minimized by the split and subtree-choice heuristics.
    fn area(&self) -> f64;

    fn center(&self) -> Vec<f64>;

    /// Lower bound along `dim`, used to sort children when splitting.
    fn low_bound(&self, dim: usize) -> f64;

    /// Upper bound along `dim`, used to sort children when splitting.
    fn high_bound(&self, dim: usize) -> f64;

    fn union(&self, other: &Self) -> SpatialResult<Self>;

    fn overlap(&self, other: &Self) -> SpatialResult<f64>;

    fn contains(&self, other: &Self) -> SpatialResult<bool>;

    fn intersects(&self, other: &Self) -> SpatialResult<bool>;

    /// Growth of [`area`](Self::area) needed to include `other`.
    fn enlargement(&self, other: &Self) -> SpatialResult<f64> {
        Ok(self.union(other)?.area() - self.area())
    }
}

impl Bounds for Region {
    fn dimension(&self) -> usize {
        Region::dimension(self)
    }

    fn area(&self) -> f64 {
        Region::area(self)
    }

    fn center(&self) -> Vec<f64> {
        Region::center(self)
    }

    fn low_bound(&self, dim: usize) -> f64 {
        self.low()[dim]
    }

    fn high_bound(&self, dim: usize) -> f64 {
        self.high()[dim]
    }

    fn union(&self, other: &Self) -> SpatialResult<Self> {
        Region::union(self, other)
    }

    fn overlap(&self, other: &Self) -> SpatialResult<f64> {
        Region::overlap(self, other)
    }

    fn contains(&self, other: &Self) -> SpatialResult<bool> {
        Region::contains(self, other)
    }

    fn intersects(&self, other: &Self) -> SpatialResult<bool> {
        Region::intersects(self, other)
    }

    fn enlargement(&self, other: &Self) -> SpatialResult<f64> {
        Region::enlargement(self, other)
    }
}

/// Squared Euclidean distance between two centers.
pub(crate) fn center_distance_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
