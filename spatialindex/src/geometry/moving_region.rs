use serde::{Deserialize, Serialize};

use super::{Bounds, Region};
use crate::errors::{SpatialError, SpatialResult};

/// Simpson intervals used when integrating the overlap of two moving regions.
const OVERLAP_SAMPLES: usize = 16;

/// A region whose bounds move linearly over a finite time horizon.
///
/// At time `t` within `[reference_time, reference_time + horizon]` the bounds are
/// `low + velocity_low * (t - reference_time)` and
/// `high + velocity_high * (t - reference_time)`.
///
/// Moving objects have a single velocity (`velocity_low == velocity_high`);
/// regions produced by [`union`](Bounds::union) carry separate low and high
/// velocities so that they enclose every input over its whole validity interval.
///
/// # Examples
///
/// ```rust
/// use spatialindex::{MovingRegion, Region};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let square = Region::new(vec![0.0, 0.0], vec![1.0, 1.0])?;
/// let moving = MovingRegion::new(square, vec![1.0, 0.0], 0.0, 10.0)?;
///
/// let at_five = moving.bound_at(5.0);
/// assert_eq!(at_five.low(), &[5.0, 0.0]);
/// assert_eq!(at_five.high(), &[6.0, 1.0]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovingRegion {
    low: Vec<f64>,
    high: Vec<f64>,
    velocity_low: Vec<f64>,
    velocity_high: Vec<f64>,
    reference_time: f64,
    horizon: f64,
}

impl MovingRegion {
    /// Creates a moving object: `region` at `reference_time`, moving with `velocity`.
    pub fn new(
        region: Region,
        velocity: Vec<f64>,
        reference_time: f64,
        horizon: f64,
    ) -> SpatialResult<Self> {
        Self::with_velocity_bounds(region, velocity.clone(), velocity, reference_time, horizon)
    }

    /// Creates a region whose lower and upper bounds move at different speeds.
    ///
    /// The extent in every dimension must stay non-negative over the horizon.
    pub fn with_velocity_bounds(
        region: Region,
        velocity_low: Vec<f64>,
        velocity_high: Vec<f64>,
        reference_time: f64,
        horizon: f64,
    ) -> SpatialResult<Self> {
        SpatialError::dimension(region.dimension(), velocity_low.len())?;
        SpatialError::dimension(region.dimension(), velocity_high.len())?;
        if !reference_time.is_finite() {
            return Err(SpatialError::InvalidRegion(format!(
                "reference time must be finite, got {}",
                reference_time
            )));
        }
        if !(horizon > 0.0 && horizon.is_finite()) {
            return Err(SpatialError::InvalidRegion(format!(
                "horizon must be positive and finite, got {}",
                horizon
            )));
        }
        if velocity_low
            .iter()
            .chain(&velocity_high)
            .any(|v| !v.is_finite())
        {
            return Err(SpatialError::InvalidRegion(
                "velocity components must be finite".into(),
            ));
        }
        for d in 0..region.dimension() {
            let final_extent = region.extent(d) + (velocity_high[d] - velocity_low[d]) * horizon;
            if final_extent < 0.0 {
                return Err(SpatialError::InvalidRegion(format!(
                    "bounds cross within the horizon in dimension {}",
                    d
                )));
            }
        }

        Ok(Self {
            low: region.low().to_vec(),
            high: region.high().to_vec(),
            velocity_low,
            velocity_high,
            reference_time,
            horizon,
        })
    }

    /// Creates a region that does not move during `[reference_time, reference_time + horizon]`.
    pub fn stationary(region: Region, reference_time: f64, horizon: f64) -> SpatialResult<Self> {
        let velocity = vec![0.0; region.dimension()];
        Self::new(region, velocity, reference_time, horizon)
    }

    pub fn dimension(&self) -> usize {
        self.low.len()
    }

    pub fn reference_time(&self) -> f64 {
        self.reference_time
    }

    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    /// Last instant at which the region is valid.
    pub fn end_time(&self) -> f64 {
        self.reference_time + self.horizon
    }

    pub fn velocity_low(&self) -> &[f64] {
        &self.velocity_low
    }

    pub fn velocity_high(&self) -> &[f64] {
        &self.velocity_high
    }

    /// The bounds at the reference time.
    pub fn region(&self) -> Region {
        Region::from_corners(self.low.clone(), self.high.clone())
    }

    /// Returns the bounds at time `t`, clipped to the validity interval.
    pub fn bound_at(&self, t: f64) -> Region {
        let t = t.clamp(self.reference_time, self.end_time());
        let low = (0..self.dimension()).map(|d| self.low_at(d, t)).collect();
        let high = (0..self.dimension()).map(|d| self.high_at(d, t)).collect();
        Region::from_corners(low, high)
    }

    /// Returns `true` if both regions overlap at some instant of `[t0, t1]` at
    /// which both are valid.
    ///
    /// Computed in closed form: in every dimension the instants at which the two
    /// moving intervals overlap form an interval, so the answer is whether the
    /// intersection of all of them is non-empty.
    pub fn intersects_in_interval(
        &self,
        other: &MovingRegion,
        t0: f64,
        t1: f64,
    ) -> SpatialResult<bool> {
        SpatialError::dimension(self.dimension(), other.dimension())?;
        Ok(self.intersects_in_interval_unchecked(other, t0, t1))
    }

    pub(crate) fn intersects_in_interval_unchecked(
        &self,
        other: &MovingRegion,
        t0: f64,
        t1: f64,
    ) -> bool {
        let mut lo = t0.max(self.reference_time).max(other.reference_time);
        let mut hi = t1.min(self.end_time()).min(other.end_time());
        if !(lo <= hi) {
            return false;
        }
        for d in 0..self.dimension() {
            let below = |s: f64| other.high_at(d, s) - self.low_at(d, s);
            let above = |s: f64| self.high_at(d, s) - other.low_at(d, s);
            if !restrict(&mut lo, &mut hi, below) || !restrict(&mut lo, &mut hi, above) {
                return false;
            }
        }
        true
    }

    /// Returns `true` if `other` stays inside this region at every instant of
    /// `[t0, t1]` at which `other` is valid.
    ///
    /// An empty common interval yields `false`.
    pub(crate) fn contains_during(&self, other: &MovingRegion, t0: f64, t1: f64) -> bool {
        let lo = t0.max(other.reference_time).max(self.reference_time);
        let hi = t1.min(other.end_time()).min(self.end_time());
        if !(lo <= hi) {
            return false;
        }
        self.encloses_at(other, lo) && self.encloses_at(other, hi)
    }

    fn encloses_at(&self, other: &MovingRegion, s: f64) -> bool {
        (0..self.dimension()).all(|d| {
            approx_le(self.low_at(d, s), other.low_at(d, s))
                && approx_le(other.high_at(d, s), self.high_at(d, s))
        })
    }

    // Unclipped bounds; callers keep `s` inside the relevant validity interval.
    fn low_at(&self, d: usize, s: f64) -> f64 {
        self.low[d] + self.velocity_low[d] * (s - self.reference_time)
    }

    fn high_at(&self, d: usize, s: f64) -> f64 {
        self.high[d] + self.velocity_high[d] * (s - self.reference_time)
    }

    fn union_unchecked(&self, other: &MovingRegion) -> MovingRegion {
        let t = self.reference_time.min(other.reference_time);
        let end = self.end_time().max(other.end_time());
        let dim = self.dimension();

        let mut low = Vec::with_capacity(dim);
        let mut high = Vec::with_capacity(dim);
        let mut velocity_low = Vec::with_capacity(dim);
        let mut velocity_high = Vec::with_capacity(dim);
        for d in 0..dim {
            let l = self.low_at(d, t).min(other.low_at(d, t));
            let h = self.high_at(d, t).max(other.high_at(d, t)).max(l);
            let vl = self.velocity_low[d].min(other.velocity_low[d]);
            let vh = self.velocity_high[d].max(other.velocity_high[d]).max(vl);
            low.push(l);
            high.push(h);
            velocity_low.push(vl);
            velocity_high.push(vh);
        }

        MovingRegion {
            low,
            high,
            velocity_low,
            velocity_high,
            reference_time: t,
            horizon: (end - t).max(f64::MIN_POSITIVE),
        }
    }

    fn overlap_unchecked(&self, other: &MovingRegion) -> f64 {
        let lo = self.reference_time.max(other.reference_time);
        let hi = self.end_time().min(other.end_time());
        if !(lo < hi) {
            return 0.0;
        }
        let volume_at = |s: f64| -> f64 {
            let mut volume = 1.0;
            for d in 0..self.dimension() {
                let l = self.low_at(d, s).max(other.low_at(d, s));
                let h = self.high_at(d, s).min(other.high_at(d, s));
                if h <= l {
                    return 0.0;
                }
                volume *= h - l;
            }
            volume
        };

        let step = (hi - lo) / OVERLAP_SAMPLES as f64;
        let mut sum = volume_at(lo) + volume_at(hi);
        for i in 1..OVERLAP_SAMPLES {
            let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
            sum += weight * volume_at(lo + step * i as f64);
        }
        sum * step / 3.0
    }
}

impl Bounds for MovingRegion {
    fn dimension(&self) -> usize {
        MovingRegion::dimension(self)
    }

    /// Volume swept over the validity interval, integrated exactly.
    fn area(&self) -> f64 {
        // volume(tau) = prod_d (extent_d + growth_d * tau), expanded into a polynomial
        let mut coefficients = vec![1.0];
        for d in 0..self.dimension() {
            let extent = self.high[d] - self.low[d];
            let growth = self.velocity_high[d] - self.velocity_low[d];
            let mut next = vec![0.0; coefficients.len() + 1];
            for (i, c) in coefficients.iter().enumerate() {
                next[i] += c * extent;
                next[i + 1] += c * growth;
            }
            coefficients = next;
        }
        coefficients
            .iter()
            .enumerate()
            .map(|(i, c)| c * self.horizon.powi(i as i32 + 1) / (i + 1) as f64)
            .sum()
    }

    fn center(&self) -> Vec<f64> {
        self.bound_at(self.reference_time + self.horizon / 2.0).center()
    }

    fn low_bound(&self, dim: usize) -> f64 {
        self.low[dim]
    }

    fn high_bound(&self, dim: usize) -> f64 {
        self.high[dim]
    }

    fn union(&self, other: &Self) -> SpatialResult<Self> {
        SpatialError::dimension(self.dimension(), other.dimension())?;
        Ok(self.union_unchecked(other))
    }

    fn overlap(&self, other: &Self) -> SpatialResult<f64> {
        SpatialError::dimension(self.dimension(), other.dimension())?;
        Ok(self.overlap_unchecked(other))
    }

    /// Checked at both ends of `other`'s validity interval, which must lie inside
    /// this region's own interval.
    fn contains(&self, other: &Self) -> SpatialResult<bool> {
        SpatialError::dimension(self.dimension(), other.dimension())?;
        if !approx_le(self.reference_time, other.reference_time)
            || !approx_le(other.end_time(), self.end_time())
        {
            return Ok(false);
        }
        let start = other.reference_time;
        let end = other.end_time();
        Ok(self.encloses_at(other, start) && self.encloses_at(other, end))
    }

    fn intersects(&self, other: &Self) -> SpatialResult<bool> {
        self.intersects_in_interval(other, f64::NEG_INFINITY, f64::INFINITY)
    }
}

/// Narrows `[lo, hi]` to the instants where the linear function `g` is
/// non-negative. Returns `false` if none remain.
fn restrict(lo: &mut f64, hi: &mut f64, g: impl Fn(f64) -> f64) -> bool {
    let at_lo = g(*lo);
    let at_hi = g(*hi);
    match (at_lo >= 0.0, at_hi >= 0.0) {
        (true, true) => true,
        (false, false) => false,
        (starts_inside, _) => {
            let crossing = *lo + (*hi - *lo) * at_lo / (at_lo - at_hi);
            let crossing = crossing.clamp(*lo, *hi);
            if starts_inside {
                *hi = crossing;
            } else {
                *lo = crossing;
            }
            true
        }
    }
}

fn approx_le(a: f64, b: f64) -> bool {
    a <= b + 1e-9 * (1.0 + a.abs().max(b.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Region {
        Region::new(vec![x0, y0], vec![x1, y1]).unwrap()
    }

    fn moving(region: Region, vx: f64, vy: f64, t: f64, horizon: f64) -> MovingRegion {
        MovingRegion::new(region, vec![vx, vy], t, horizon).unwrap()
    }

    #[test]
    fn test_bound_at() {
        let m = moving(square(0.0, 0.0, 1.0, 1.0), 1.0, 0.0, 0.0, 10.0);
        assert_eq!(m.bound_at(5.0), square(5.0, 0.0, 6.0, 1.0));
        assert_eq!(m.bound_at(0.0), square(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn test_bound_at_is_clipped_to_validity() {
        let m = moving(square(0.0, 0.0, 1.0, 1.0), 1.0, 0.0, 0.0, 10.0);
        assert_eq!(m.bound_at(-3.0), square(0.0, 0.0, 1.0, 1.0));
        assert_eq!(m.bound_at(25.0), square(10.0, 0.0, 11.0, 1.0));
    }

    #[test]
    fn test_invalid_construction() {
        let region = square(0.0, 0.0, 1.0, 1.0);
        assert!(matches!(
            MovingRegion::new(region.clone(), vec![1.0, 0.0], 0.0, 0.0),
            Err(SpatialError::InvalidRegion(_))
        ));
        assert!(matches!(
            MovingRegion::new(region.clone(), vec![f64::INFINITY, 0.0], 0.0, 1.0),
            Err(SpatialError::InvalidRegion(_))
        ));
        assert!(matches!(
            MovingRegion::new(region.clone(), vec![1.0], 0.0, 1.0),
            Err(SpatialError::DimensionMismatch { .. })
        ));
        // upper bound overtaken by the lower bound before the horizon ends
        assert!(matches!(
            MovingRegion::with_velocity_bounds(region, vec![1.0, 0.0], vec![0.0, 0.0], 0.0, 2.0),
            Err(SpatialError::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_intersects_in_interval() {
        // a moves right from x = 0, b sits still at x = 10
        let a = moving(square(0.0, 0.0, 1.0, 1.0), 1.0, 0.0, 0.0, 20.0);
        let b = moving(square(10.0, 0.0, 11.0, 1.0), 0.0, 0.0, 0.0, 20.0);

        assert!(!a.intersects_in_interval(&b, 0.0, 8.0).unwrap());
        assert!(a.intersects_in_interval(&b, 0.0, 9.0).unwrap());
        assert!(a.intersects_in_interval(&b, 10.0, 10.0).unwrap());
        assert!(a.intersects_in_interval(&b, 11.0, 15.0).unwrap());
        assert!(!a.intersects_in_interval(&b, 11.5, 15.0).unwrap());
    }

    #[test]
    fn test_intersects_needs_common_validity() {
        let a = moving(square(0.0, 0.0, 1.0, 1.0), 0.0, 0.0, 0.0, 5.0);
        let b = moving(square(0.0, 0.0, 1.0, 1.0), 0.0, 0.0, 6.0, 5.0);
        assert!(!a.intersects_in_interval(&b, 0.0, 100.0).unwrap());
        assert!(!a.intersects(&b).unwrap());
    }

    #[test]
    fn test_intersects_requires_all_dimensions_at_once() {
        // x overlaps only during [4, 6], y overlaps only during [8, 10]
        let a = moving(square(0.0, 0.0, 1.0, 1.0), 1.0, 1.0, 0.0, 20.0);
        let b = MovingRegion::new(square(5.0, 9.0, 6.0, 10.0), vec![0.0, 0.0], 0.0, 20.0).unwrap();
        assert!(!a.intersects_in_interval(&b, 0.0, 20.0).unwrap());
    }

    #[test]
    fn test_area_is_swept_volume() {
        let still = moving(square(0.0, 0.0, 2.0, 3.0), 5.0, -1.0, 0.0, 4.0);
        assert!((still.area() - 24.0).abs() < 1e-12);

        // x extent grows from 1 to 3 over 2 time units, y extent stays 1
        let growing = MovingRegion::with_velocity_bounds(
            square(0.0, 0.0, 1.0, 1.0),
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            0.0,
            2.0,
        )
        .unwrap();
        assert!((growing.area() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_overlap_of_stationary_regions() {
        let a = moving(square(0.0, 0.0, 2.0, 2.0), 0.0, 0.0, 0.0, 10.0);
        let b = moving(square(1.0, 1.0, 3.0, 3.0), 0.0, 0.0, 5.0, 10.0);
        // unit overlap during the 5 shared time units
        assert!((a.overlap(&b).unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_union_encloses_both_inputs() {
        let a = moving(square(0.0, 0.0, 1.0, 1.0), 1.0, 0.0, 0.0, 10.0);
        let b = moving(square(5.0, 5.0, 6.0, 6.0), -1.0, 0.5, 2.0, 10.0);
        let u = a.union(&b).unwrap();

        assert_eq!(u.reference_time(), 0.0);
        assert_eq!(u.end_time(), 12.0);
        assert!(u.contains(&a).unwrap());
        assert!(u.contains(&b).unwrap());
        for step in 0..=12 {
            let t = step as f64;
            if t >= 2.0 {
                assert!(u.bound_at(t).contains(&b.bound_at(t)).unwrap());
            }
            if t <= 10.0 {
                assert!(u.bound_at(t).contains(&a.bound_at(t)).unwrap());
            }
        }
    }

    #[test]
    fn test_contains_fails_outside_validity() {
        let a = moving(square(0.0, 0.0, 10.0, 10.0), 0.0, 0.0, 0.0, 5.0);
        let b = moving(square(1.0, 1.0, 2.0, 2.0), 0.0, 0.0, 0.0, 10.0);
        assert!(!a.contains(&b).unwrap());

        let escaping = moving(square(1.0, 1.0, 2.0, 2.0), 3.0, 0.0, 0.0, 5.0);
        assert!(!a.contains(&escaping).unwrap());
    }

    #[test]
    fn test_center_at_mid_horizon() {
        let m = moving(square(0.0, 0.0, 2.0, 2.0), 1.0, 0.0, 0.0, 10.0);
        assert_eq!(Bounds::center(&m), vec![6.0, 1.0]);
    }
}
