//! Query predicates driving tree traversals.
//!
//! A [`Query`] decides which subtrees a traversal descends into and which
//! entries it reports. The tree checks [`Query::dimension`] once before the
//! traversal starts, so the predicates themselves never fail.

use crate::errors::{SpatialError, SpatialResult};
use crate::geometry::{MovingRegion, Region};

/// A traversal predicate over regions of type `B`.
pub trait Query<B> {
    /// Dimensionality of the query, `None` if it matches any dimension.
    fn dimension(&self) -> Option<usize>;

    /// Whether anything inside `region` may match.
    fn intersects(&self, region: &B) -> bool;

    /// Whether `region` lies entirely within the query.
    fn contains(&self, region: &B) -> bool;
}

/// Static range query.
impl Query<Region> for Region {
    fn dimension(&self) -> Option<usize> {
        Some(Region::dimension(self))
    }

    fn intersects(&self, region: &Region) -> bool {
        self.intersects_unchecked(region)
    }

    fn contains(&self, region: &Region) -> bool {
        self.contains_unchecked(region)
    }
}

/// Matches every region of every tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FullSpace;

impl<B> Query<B> for FullSpace {
    fn dimension(&self) -> Option<usize> {
        None
    }

    fn intersects(&self, _region: &B) -> bool {
        true
    }

    fn contains(&self, _region: &B) -> bool {
        true
    }
}

/// A (possibly moving) region queried over the time window `[start, end]`.
///
/// # Examples
///
/// ```rust
/// use spatialindex::{MovingQuery, Region};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let area = Region::new(vec![0.0, 0.0], vec![10.0, 10.0])?;
/// let query = MovingQuery::window(area, 5.0, 8.0)?;
/// assert_eq!(query.start(), 5.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MovingQuery {
    region: MovingRegion,
    start: f64,
    end: f64,
}

impl MovingQuery {
    pub fn new(region: MovingRegion, start: f64, end: f64) -> SpatialResult<Self> {
        if !(start.is_finite() && end.is_finite()) {
            return Err(SpatialError::InvalidQuery(
                "time window bounds must be finite".into(),
            ));
        }
        if start > end {
            return Err(SpatialError::InvalidQuery(format!(
                "time window start {} is after its end {}",
                start, end
            )));
        }
        Ok(Self { region, start, end })
    }

    /// A stationary region queried over `[start, end]`.
    pub fn window(region: Region, start: f64, end: f64) -> SpatialResult<Self> {
        if !(start.is_finite() && end.is_finite()) || start > end {
            return Err(SpatialError::InvalidQuery(format!(
                "invalid time window [{}, {}]",
                start, end
            )));
        }
        let horizon = (end - start).max(f64::MIN_POSITIVE);
        let region = MovingRegion::stationary(region, start, horizon)?;
        Self::new(region, start, end)
    }

    /// A stationary region queried at the single instant `t`.
    pub fn snapshot(region: Region, t: f64) -> SpatialResult<Self> {
        Self::window(region, t, t)
    }

    pub fn region(&self) -> &MovingRegion {
        &self.region
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }
}

impl Query<MovingRegion> for MovingQuery {
    fn dimension(&self) -> Option<usize> {
        Some(self.region.dimension())
    }

    fn intersects(&self, region: &MovingRegion) -> bool {
        self.region
            .intersects_in_interval_unchecked(region, self.start, self.end)
    }

    fn contains(&self, region: &MovingRegion) -> bool {
        self.region.contains_during(region, self.start, self.end)
    }
}
