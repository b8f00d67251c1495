//! Bottom-up tree construction.
//!
//! Entries are ordered (Sort-Tile-Recursive or Hilbert), cut into leaf-sized
//! groups, and the resulting node regions are packed again level by level
//! until a single root remains. Group sizes on a level differ by at most one
//! and the group count is chosen so every node stays within
//! `[min_entries, capacity]`.

use log::debug;

use super::insert::require_region;
use super::pending::Mutation;
use crate::config::{BulkLoadOrder, IndexConfig};
use crate::errors::{SpatialError, SpatialResult};
use crate::geometry::Bounds;
use crate::hilbert::hilbert_key_bounded;
use crate::node::{ChildRef, Entry, Item, Node};
use crate::storage::NodeStore;
use crate::stream::DataStream;

/// Pulls every entry from `stream`, checking dimensions.
///
/// Never touches the stream again once it reports exhaustion.
pub(crate) fn drain<B: Bounds, D: DataStream<B> + ?Sized>(
    stream: &mut D,
    dimension: usize,
) -> SpatialResult<Vec<Entry<B>>> {
    let mut entries = Vec::new();
    while stream.has_next() {
        let Some(entry) = stream.next_entry() else {
            break;
        };
        SpatialError::dimension(dimension, entry.region.dimension())?;
        entries.push(entry);
    }
    Ok(entries)
}

impl<'a, B: Bounds, S: NodeStore<B>> Mutation<'a, B, S> {
    /// Builds a complete tree from `entries` and makes it the current tree.
    pub(crate) fn bulk_build(&mut self, entries: Vec<Entry<B>>) -> SpatialResult<()> {
        let total = entries.len();
        self.header.entry_count = total as u64;
        if entries.is_empty() {
            let root = self.create(Node::empty_leaf())?;
            self.header.root = root;
            self.header.height = 1;
            debug!("Bulk loaded an empty tree");
            return Ok(());
        }

        let config = self.config().clone();
        let mut items: Vec<Item<B>> = entries.into_iter().map(Item::Data).collect();
        let mut level = 0u32;
        loop {
            let groups = pack(items, &config)?;
            let mut parents = Vec::with_capacity(groups.len());
            for group in groups {
                let node = Node::from_items(level, group)?;
                let region = require_region(&node, 0)?;
                let node_id = self.create(node)?;
                parents.push(Item::Child(ChildRef { region, node_id }));
            }

            if parents.len() == 1 {
                if let Some(Item::Child(root)) = parents.pop() {
                    self.header.root = root.node_id;
                }
                self.header.height = level + 1;
                break;
            }
            items = parents;
            level += 1;
        }

        debug!(
            "Bulk loaded {} entries into {} nodes (height {})",
            total, self.header.node_count, self.header.height
        );
        Ok(())
    }
}

/// Number of groups for `n` items: as close to `n / target` as the fill
/// limits allow.
///
/// For `n >= 2` the result is always below `n`, so every level is smaller
/// than the one it packs and construction reaches a single root.
pub(crate) fn group_count(n: usize, config: &IndexConfig) -> usize {
    let capacity = config.capacity;
    let min = config.min_entries();
    let target = config.bulk_target();

    let fewest = n.div_ceil(capacity).max(1);
    // with one-entry minimum fill, pairs are the smallest groups that still shrink
    let most = (n / min).min(n.div_ceil(2)).max(fewest);
    n.div_ceil(target).clamp(fewest, most)
}

/// Sizes of `groups` groups sharing `n` items as evenly as possible.
fn balanced_sizes(n: usize, groups: usize) -> Vec<usize> {
    let base = n / groups;
    let extra = n % groups;
    (0..groups).map(|g| base + usize::from(g < extra)).collect()
}

fn pack<B: Bounds>(items: Vec<Item<B>>, config: &IndexConfig) -> SpatialResult<Vec<Vec<Item<B>>>> {
    let groups = group_count(items.len(), config);
    let keyed: Vec<(Vec<f64>, Item<B>)> = items
        .into_iter()
        .map(|item| (item.region().center(), item))
        .collect();

    let ordered = match config.bulk_load_order {
        BulkLoadOrder::SortTileRecursive => {
            let dims = config.dimension;
            str_partition(keyed, groups, 0, dims)
        }
        BulkLoadOrder::Hilbert => hilbert_partition(keyed, groups),
    };
    Ok(ordered
        .into_iter()
        .map(|group| group.into_iter().map(|(_, item)| item).collect())
        .collect())
}

fn chunk<T>(items: Vec<T>, sizes: &[usize]) -> Vec<Vec<T>> {
    let mut iter = items.into_iter();
    sizes
        .iter()
        .map(|size| iter.by_ref().take(*size).collect())
        .collect()
}

/// Sort-Tile-Recursive: sort by the center along `dim`, cut into slabs of whole
/// groups and recurse into each slab along the next dimension.
fn str_partition<T>(
    mut items: Vec<(Vec<f64>, T)>,
    groups: usize,
    dim: usize,
    dims: usize,
) -> Vec<Vec<(Vec<f64>, T)>> {
    if groups <= 1 {
        return vec![items];
    }
    items.sort_by(|a, b| a.0[dim].total_cmp(&b.0[dim]));
    let sizes = balanced_sizes(items.len(), groups);
    if dim + 1 >= dims {
        return chunk(items, &sizes);
    }

    let remaining_dims = (dims - dim) as f64;
    let slabs = ((groups as f64).powf(1.0 / remaining_dims).ceil() as usize).clamp(1, groups);
    let groups_per_slab = balanced_sizes(groups, slabs);

    let mut slab_sizes = Vec::with_capacity(slabs);
    let mut first_group = 0;
    for slab_groups in &groups_per_slab {
        let items_in_slab: usize = sizes[first_group..first_group + slab_groups].iter().sum();
        slab_sizes.push(items_in_slab);
        first_group += slab_groups;
    }

    chunk(items, &slab_sizes)
        .into_iter()
        .zip(groups_per_slab)
        .flat_map(|(slab, slab_groups)| str_partition(slab, slab_groups, dim + 1, dims))
        .collect()
}

/// Orders items by the Hilbert key of their centers and cuts the sequence.
fn hilbert_partition<T>(items: Vec<(Vec<f64>, T)>, groups: usize) -> Vec<Vec<(Vec<f64>, T)>> {
    let Some(dims) = items.first().map(|(center, _)| center.len()) else {
        return vec![items];
    };
    let mut low = vec![f64::INFINITY; dims];
    let mut high = vec![f64::NEG_INFINITY; dims];
    for (center, _) in &items {
        for d in 0..dims {
            low[d] = low[d].min(center[d]);
            high[d] = high[d].max(center[d]);
        }
    }

    let mut keyed: Vec<(u128, (Vec<f64>, T))> = items
        .into_iter()
        .map(|item| (hilbert_key_bounded(&item.0, &low, &high), item))
        .collect();
    keyed.sort_by_key(|(key, _)| *key);

    let sizes = balanced_sizes(keyed.len(), groups);
    chunk(keyed.into_iter().map(|(_, item)| item).collect(), &sizes)
}
