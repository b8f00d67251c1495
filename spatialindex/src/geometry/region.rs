use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{SpatialError, SpatialResult};

/// An axis-aligned bounding region with a fixed number of dimensions.
///
/// A `Region` is defined by its per-dimension lower and upper bounds. Points are
/// represented as degenerate regions whose bounds coincide.
///
/// # Examples
///
/// ```rust
/// use spatialindex::Region;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let a = Region::new(vec![0.0, 0.0], vec![2.0, 2.0])?;
/// let b = Region::new(vec![1.0, 1.0], vec![3.0, 3.0])?;
///
/// assert!(a.intersects(&b)?);
/// assert_eq!(a.overlap(&b)?, 1.0);
/// assert_eq!(a.union(&b)?.area(), 9.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    low: Vec<f64>,
    high: Vec<f64>,
}

impl Region {
    /// Creates a region from its lower and upper corners.
    ///
    /// Fails with `DimensionMismatch` when the corners have different lengths and
    /// with `InvalidRegion` when a bound is NaN or `low > high` in any dimension.
    pub fn new(low: Vec<f64>, high: Vec<f64>) -> SpatialResult<Self> {
        SpatialError::dimension(low.len(), high.len())?;
        if low.is_empty() {
            return Err(SpatialError::InvalidRegion(
                "region must have at least one dimension".into(),
            ));
        }
        for (dim, (l, h)) in low.iter().zip(&high).enumerate() {
            if l.is_nan() || h.is_nan() {
                return Err(SpatialError::InvalidRegion(format!(
                    "NaN bound in dimension {}",
                    dim
                )));
            }
            if l > h {
                return Err(SpatialError::InvalidRegion(format!(
                    "low bound {} exceeds high bound {} in dimension {}",
                    l, h, dim
                )));
            }
        }
        Ok(Self { low, high })
    }

    /// Creates a degenerate region covering a single point.
    pub fn point(coords: &[f64]) -> SpatialResult<Self> {
        Self::new(coords.to_vec(), coords.to_vec())
    }

    /// Creates the region covering the whole space.
    pub fn infinite(dimension: usize) -> Self {
        Self {
            low: vec![f64::NEG_INFINITY; dimension],
            high: vec![f64::INFINITY; dimension],
        }
    }

    /// Builds a region from already-validated corners, widening `high` where
    /// rounding left it below `low`.
    pub(crate) fn from_corners(low: Vec<f64>, mut high: Vec<f64>) -> Self {
        for (h, l) in high.iter_mut().zip(&low) {
            if *h < *l {
                *h = *l;
            }
        }
        Self { low, high }
    }

    pub fn dimension(&self) -> usize {
        self.low.len()
    }

    pub fn low(&self) -> &[f64] {
        &self.low
    }

    pub fn high(&self) -> &[f64] {
        &self.high
    }

    /// Returns the extent of the region along `dim`.
    pub fn extent(&self, dim: usize) -> f64 {
        self.high[dim] - self.low[dim]
    }

    /// Returns the volume of the region (zero for points).
    pub fn area(&self) -> f64 {
        (0..self.dimension()).map(|d| self.extent(d)).product()
    }

    /// Returns the sum of the region's extents.
    pub fn margin(&self) -> f64 {
        (0..self.dimension()).map(|d| self.extent(d)).sum()
    }

    pub fn center(&self) -> Vec<f64> {
        self.low
            .iter()
            .zip(&self.high)
            .map(|(l, h)| (l + h) / 2.0)
            .collect()
    }

    pub fn is_point(&self) -> bool {
        self.low == self.high
    }

    /// Returns the smallest region enclosing both regions.
    pub fn union(&self, other: &Region) -> SpatialResult<Region> {
        self.check_dimension(other.dimension())?;
        Ok(self.union_unchecked(other))
    }

    /// Grows this region in place so that it also encloses `other`.
    pub fn combine(&mut self, other: &Region) -> SpatialResult<()> {
        self.check_dimension(other.dimension())?;
        for d in 0..self.dimension() {
            self.low[d] = self.low[d].min(other.low[d]);
            self.high[d] = self.high[d].max(other.high[d]);
        }
        Ok(())
    }

    /// Returns `area(union(self, other)) - area(self)`.
    pub fn enlargement(&self, other: &Region) -> SpatialResult<f64> {
        Ok(self.union(other)?.area() - self.area())
    }

    /// Returns the volume of the intersection, or zero when the regions are disjoint.
    pub fn overlap(&self, other: &Region) -> SpatialResult<f64> {
        self.check_dimension(other.dimension())?;
        Ok(self.overlap_unchecked(other))
    }

    pub fn intersects(&self, other: &Region) -> SpatialResult<bool> {
        self.check_dimension(other.dimension())?;
        Ok(self.intersects_unchecked(other))
    }

    /// Returns `true` if `other` lies entirely inside this region (boundaries included).
    pub fn contains(&self, other: &Region) -> SpatialResult<bool> {
        self.check_dimension(other.dimension())?;
        Ok(self.contains_unchecked(other))
    }

    pub fn contains_point(&self, point: &[f64]) -> SpatialResult<bool> {
        self.check_dimension(point.len())?;
        Ok(self.contains_point_unchecked(point))
    }

    /// Returns the Euclidean distance from a point to the closest point of the region.
    ///
    /// The distance is zero when the point lies inside the region.
    pub fn min_distance_to_point(&self, point: &[f64]) -> SpatialResult<f64> {
        self.check_dimension(point.len())?;
        let sum: f64 = point
            .iter()
            .enumerate()
            .map(|(d, p)| {
                let closest = p.clamp(self.low[d], self.high[d]);
                (p - closest) * (p - closest)
            })
            .sum();
        Ok(sum.sqrt())
    }

    /// Returns the minimum Euclidean distance between two regions.
    pub fn min_distance(&self, other: &Region) -> SpatialResult<f64> {
        self.check_dimension(other.dimension())?;
        Ok(self.min_distance_unchecked(other))
    }

    pub(crate) fn union_unchecked(&self, other: &Region) -> Region {
        Region {
            low: self
                .low
                .iter()
                .zip(&other.low)
                .map(|(a, b)| a.min(*b))
                .collect(),
            high: self
                .high
                .iter()
                .zip(&other.high)
                .map(|(a, b)| a.max(*b))
                .collect(),
        }
    }

    pub(crate) fn overlap_unchecked(&self, other: &Region) -> f64 {
        let mut volume = 1.0;
        for d in 0..self.dimension() {
            let lo = self.low[d].max(other.low[d]);
            let hi = self.high[d].min(other.high[d]);
            if lo > hi {
                return 0.0;
            }
            volume *= hi - lo;
        }
        volume
    }

    pub(crate) fn intersects_unchecked(&self, other: &Region) -> bool {
        (0..self.dimension())
            .all(|d| self.low[d] <= other.high[d] && self.high[d] >= other.low[d])
    }

    pub(crate) fn contains_unchecked(&self, other: &Region) -> bool {
        (0..self.dimension())
            .all(|d| self.low[d] <= other.low[d] && self.high[d] >= other.high[d])
    }

    pub(crate) fn contains_point_unchecked(&self, point: &[f64]) -> bool {
        point
            .iter()
            .enumerate()
            .all(|(d, p)| *p >= self.low[d] && *p <= self.high[d])
    }

    pub(crate) fn min_distance_unchecked(&self, other: &Region) -> f64 {
        let mut sum = 0.0;
        for d in 0..self.dimension() {
            let gap = if other.high[d] < self.low[d] {
                self.low[d] - other.high[d]
            } else if other.low[d] > self.high[d] {
                other.low[d] - self.high[d]
            } else {
                0.0
            };
            sum += gap * gap;
        }
        sum.sqrt()
    }

    fn check_dimension(&self, other: usize) -> SpatialResult<()> {
        SpatialError::dimension(self.dimension(), other)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Region(")?;
        for d in 0..self.dimension() {
            if d > 0 {
                write!(f, " x ")?;
            }
            write!(f, "[{}, {}]", self.low[d], self.high[d])?;
        }
        write!(f, ")")
    }
}
