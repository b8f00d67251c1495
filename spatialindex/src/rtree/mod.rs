//! The tree engine.
//!
//! [`RTree`] owns the tree header and drives every algorithm against its
//! [`NodeStore`](crate::storage::NodeStore):
//!
//! - insertion with R* subtree choice, forced reinsertion and splitting
//! - deletion with condensation of underfull nodes
//! - bottom-up bulk loading from a [`DataStream`](crate::stream::DataStream)
//! - visitor-driven range, containment, nearest-neighbour and self-join queries
//!
//! Mutations run against a staged write set that is committed only when the
//! operation succeeds.

mod bulk_load;
mod condense;
mod insert;
mod pending;
mod rtree_impl;
mod search;
mod split;

pub use rtree_impl::{RTree, TprTree};
