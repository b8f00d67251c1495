//! Node splitting algorithms.
//!
//! Each policy partitions the `capacity + 1` children of an overflowing node
//! into two groups of at least `min` children each.

use crate::config::SplitPolicy;
use crate::errors::{SpatialError, SpatialResult};
use crate::geometry::Bounds;
use crate::node::Item;

pub(crate) type Groups<B> = (Vec<Item<B>>, Vec<Item<B>>);

pub(crate) fn split<B: Bounds>(
    policy: SplitPolicy,
    items: Vec<Item<B>>,
    min: usize,
) -> SpatialResult<Groups<B>> {
    if items.len() < 2 * min || items.len() < 2 {
        return Err(SpatialError::InvalidOperation(format!(
            "cannot split {} children into groups of at least {}",
            items.len(),
            min
        )));
    }
    let (first, second) = match policy {
        SplitPolicy::RStar => rstar_partition(&items, min)?,
        SplitPolicy::Quadratic => {
            let seeds = quadratic_seeds(&items)?;
            distribute(&items, seeds, min, quadratic_next)?
        }
        SplitPolicy::Linear => {
            let seeds = linear_seeds(&items);
            distribute(&items, seeds, min, linear_next)?
        }
    };
    Ok(take_groups(items, &first, &second))
}

fn take_groups<B>(items: Vec<Item<B>>, first: &[usize], second: &[usize]) -> Groups<B> {
    let mut slots: Vec<Option<Item<B>>> = items.into_iter().map(Some).collect();
    let mut pick = |indices: &[usize]| -> Vec<Item<B>> {
        indices.iter().filter_map(|i| slots[*i].take()).collect()
    };
    let a = pick(first);
    let b = pick(second);
    (a, b)
}

// ============================================================================
// R*
// ============================================================================

/// Tries every split point of every sort order and keeps the candidate with the
/// smallest (overlap, total area). The earliest candidate wins ties: dimensions
/// ascending, low-bound sort before high-bound sort, split point ascending.
fn rstar_partition<B: Bounds>(
    items: &[Item<B>],
    min: usize,
) -> SpatialResult<(Vec<usize>, Vec<usize>)> {
    let n = items.len();
    let dims = items[0].region().dimension();
    let mut best: Option<(f64, f64, Vec<usize>, usize)> = None;

    for dim in 0..dims {
        for by_high in [false, true] {
            let key = |i: usize| {
                let region = items[i].region();
                if by_high {
                    region.high_bound(dim)
                } else {
                    region.low_bound(dim)
                }
            };
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|a, b| key(*a).total_cmp(&key(*b)));

            // prefix[i] bounds order[..=i], suffix[i] bounds order[i..]
            let mut prefix: Vec<B> = Vec::with_capacity(n);
            for (pos, &i) in order.iter().enumerate() {
                let region = items[i].region();
                let next = if pos == 0 {
                    region.clone()
                } else {
                    prefix[pos - 1].union(region)?
                };
                prefix.push(next);
            }
            let mut suffix: Vec<Option<B>> = vec![None; n];
            for pos in (0..n).rev() {
                let region = items[order[pos]].region();
                suffix[pos] = Some(match suffix.get(pos + 1).and_then(|s| s.as_ref()) {
                    Some(after) => after.union(region)?,
                    None => region.clone(),
                });
            }

            for k in min..=(n - min) {
                let (Some(left), Some(right)) = (prefix.get(k - 1), suffix[k].as_ref()) else {
                    continue;
                };
                let overlap = left.overlap(right)?;
                let area = left.area() + right.area();
                let better = match &best {
                    None => true,
                    Some((best_overlap, best_area, _, _)) => {
                        overlap < *best_overlap || (overlap == *best_overlap && area < *best_area)
                    }
                };
                if better {
                    best = Some((overlap, area, order.clone(), k));
                }
            }
        }
    }

    let (_, _, order, k) = best.ok_or_else(|| {
        SpatialError::InvalidOperation("no valid split candidate".into())
    })?;
    Ok((order[..k].to_vec(), order[k..].to_vec()))
}

// ============================================================================
// Guttman
// ============================================================================

struct Group<B> {
    members: Vec<usize>,
    region: B,
}

type PickNext<B> = fn(&[Item<B>], &[usize], &Group<B>, &Group<B>) -> SpatialResult<usize>;

/// Grows two groups from the seeds, forcing the remaining children into a
/// group once it needs all of them to reach `min`.
fn distribute<B: Bounds>(
    items: &[Item<B>],
    (seed_a, seed_b): (usize, usize),
    min: usize,
    pick_next: PickNext<B>,
) -> SpatialResult<(Vec<usize>, Vec<usize>)> {
    let mut a = Group {
        members: vec![seed_a],
        region: items[seed_a].region().clone(),
    };
    let mut b = Group {
        members: vec![seed_b],
        region: items[seed_b].region().clone(),
    };
    let mut remaining: Vec<usize> = (0..items.len())
        .filter(|i| *i != seed_a && *i != seed_b)
        .collect();

    while !remaining.is_empty() {
        if a.members.len() + remaining.len() <= min {
            a.members.append(&mut remaining);
            break;
        }
        if b.members.len() + remaining.len() <= min {
            b.members.append(&mut remaining);
            break;
        }

        let pos = pick_next(items, &remaining, &a, &b)?;
        let i = remaining.remove(pos);
        let region = items[i].region();
        let grow_a = a.region.enlargement(region)?;
        let grow_b = b.region.enlargement(region)?;

        let into_a = if grow_a != grow_b {
            grow_a < grow_b
        } else if a.region.area() != b.region.area() {
            a.region.area() < b.region.area()
        } else {
            a.members.len() <= b.members.len()
        };
        let group = if into_a { &mut a } else { &mut b };
        group.region = group.region.union(region)?;
        group.members.push(i);
    }

    Ok((a.members, b.members))
}

/// The pair wasting the most area when grouped together.
fn quadratic_seeds<B: Bounds>(items: &[Item<B>]) -> SpatialResult<(usize, usize)> {
    let mut seeds = (0, 1);
    let mut worst = f64::NEG_INFINITY;
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            let a = items[i].region();
            let b = items[j].region();
            let waste = a.union(b)?.area() - a.area() - b.area();
            if waste > worst {
                worst = waste;
                seeds = (i, j);
            }
        }
    }
    Ok(seeds)
}

/// The child with the strongest preference for one group.
fn quadratic_next<B: Bounds>(
    items: &[Item<B>],
    remaining: &[usize],
    a: &Group<B>,
    b: &Group<B>,
) -> SpatialResult<usize> {
    let mut best = 0;
    let mut best_diff = f64::NEG_INFINITY;
    for (pos, &i) in remaining.iter().enumerate() {
        let region = items[i].region();
        let diff = (a.region.enlargement(region)? - b.region.enlargement(region)?).abs();
        if diff > best_diff {
            best_diff = diff;
            best = pos;
        }
    }
    Ok(best)
}

/// Along the dimension with the greatest normalized separation, the child with
/// the highest low side and the child with the lowest high side.
fn linear_seeds<B: Bounds>(items: &[Item<B>]) -> (usize, usize) {
    let dims = items[0].region().dimension();
    let mut seeds = (0, 1);
    let mut best_separation = f64::NEG_INFINITY;

    for dim in 0..dims {
        let mut highest_low = 0;
        let mut lowest_high = 0;
        let mut min_low = f64::INFINITY;
        let mut max_high = f64::NEG_INFINITY;
        for (i, item) in items.iter().enumerate() {
            let region = item.region();
            if region.low_bound(dim) > items[highest_low].region().low_bound(dim) {
                highest_low = i;
            }
            if region.high_bound(dim) < items[lowest_high].region().high_bound(dim) {
                lowest_high = i;
            }
            min_low = min_low.min(region.low_bound(dim));
            max_high = max_high.max(region.high_bound(dim));
        }

        let width = max_high - min_low;
        let raw = items[highest_low].region().low_bound(dim)
            - items[lowest_high].region().high_bound(dim);
        let separation = if width > 0.0 { raw / width } else { 0.0 };
        if separation > best_separation {
            best_separation = separation;
            seeds = (highest_low, lowest_high);
        }
    }

    if seeds.0 == seeds.1 {
        seeds.1 = if seeds.0 == 0 { 1 } else { 0 };
    }
    seeds
}

/// Linear split assigns the remaining children in their stored order.
fn linear_next<B: Bounds>(
    _items: &[Item<B>],
    _remaining: &[usize],
    _a: &Group<B>,
    _b: &Group<B>,
) -> SpatialResult<usize> {
    Ok(0)
}
