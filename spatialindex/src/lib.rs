//! # spatialindex - R-tree family spatial indexing
//!
//! A balanced multi-way tree indexing axis-aligned bounding regions, with a
//! time-parameterized variant for moving objects.
//!
//! ## Features
//!
//! - **R\* Insertion**: enlargement-driven subtree choice, forced reinsertion
//!   and overlap-minimizing splits (Guttman quadratic and linear splits too)
//! - **Deletion**: exact-match removal with condensation of underfull nodes
//! - **Bulk Loading**: Sort-Tile-Recursive or Hilbert packing from a
//!   pull-based stream
//! - **Visitors**: one traversal routine for range, containment, counting,
//!   nearest-neighbour and self-join queries
//! - **Moving Objects**: regions with linear motion over a finite horizon,
//!   queried over time windows
//! - **Pluggable Storage**: nodes live in a [`NodeStore`]; an in-memory store
//!   and a paged, checksummed file store with an LRU cache are included
//! - **All-or-Nothing Mutations**: a failed operation leaves the stored tree
//!   unchanged
//!
//! ## Quick Start
//!
//! ```rust
//! use std::ops::ControlFlow;
//! use spatialindex::{visitor, Entry, IndexConfig, MemoryStore, RTree, Region};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut tree = RTree::create(MemoryStore::new(), IndexConfig::new(2))?;
//! for i in 0..100 {
//!     let x = i as f64;
//!     tree.insert(Entry::new(i, Region::new(vec![x, x], vec![x + 0.5, x + 0.5])?))?;
//! }
//!
//! let window = Region::new(vec![10.0, 10.0], vec![20.0, 20.0])?;
//! assert_eq!(tree.count(&window)?, 11);
//!
//! let mut first = None;
//! tree.intersects_with(
//!     &window,
//!     visitor::from_fn(|entry: &Entry<Region>| {
//!         first = Some(entry.id);
//!         ControlFlow::Break(())
//!     }),
//! )?;
//! assert!(first.is_some());
//!
//! assert_eq!(tree.nearest(1, &Region::point(&[50.2, 50.2])?)?, vec![50]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Persistent Trees
//!
//! ```rust,no_run
//! use spatialindex::{DiskStore, DiskStoreConfig, Entry, IndexConfig, RTree, Region};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = DiskStore::create("places.idx", DiskStoreConfig::default())?;
//! let mut tree = RTree::create(store, IndexConfig::new(2))?;
//! tree.insert(Entry::new(7, Region::point(&[1.0, 2.0])?))?;
//! tree.flush()?;
//! drop(tree);
//!
//! let tree: RTree<Region, _> = RTree::open(DiskStore::open("places.idx", DiskStoreConfig::default())?)?;
//! assert_eq!(tree.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod geometry;
pub mod hilbert;
pub mod node;
pub mod query;
pub mod rtree;
pub mod stats;
pub mod storage;
pub mod stream;
pub mod visitor;

pub use config::{BulkLoadOrder, IndexConfig, SplitPolicy};
pub use errors::{EntryId, NodeId, SpatialError, SpatialResult};
pub use geometry::{Bounds, MovingRegion, Region};
pub use node::{ChildRef, Entry, Node};
pub use query::{FullSpace, MovingQuery, Query};
pub use rtree::{RTree, TprTree};
pub use stats::Statistics;
pub use storage::{DiskStore, DiskStoreConfig, MemoryStore, NodeStore, StoreStats, TreeHeader};
pub use stream::{DataStream, IterStream, VecStream};
pub use visitor::{BoundsVisitor, CountVisitor, FnVisitor, IdVisitor, NodeView, Visitor};
