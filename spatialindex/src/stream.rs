//! Pull-based entry streams consumed by bulk loading.

use std::iter::{Fuse, Peekable};

use crate::errors::{SpatialError, SpatialResult};
use crate::node::Entry;

/// A source of entries pulled one at a time.
///
/// `size` and `rewind` are optional: streams that cannot provide them report
/// `Unsupported`.
pub trait DataStream<B> {
    fn has_next(&mut self) -> bool;

    /// Consumes and returns the next entry, `None` once exhausted.
    fn next_entry(&mut self) -> Option<Entry<B>>;

    fn size(&self) -> SpatialResult<u64> {
        Err(SpatialError::Unsupported("stream size".into()))
    }

    fn rewind(&mut self) -> SpatialResult<()> {
        Err(SpatialError::Unsupported("stream rewind".into()))
    }
}

/// One-pass stream over any iterator. Exhaustion is sticky.
pub struct IterStream<I: Iterator> {
    inner: Peekable<Fuse<I>>,
}

impl<I: Iterator> IterStream<I> {
    pub fn new<T: IntoIterator<IntoIter = I>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().fuse().peekable(),
        }
    }
}

impl<B, I> DataStream<B> for IterStream<I>
where
    I: Iterator<Item = Entry<B>>,
{
    fn has_next(&mut self) -> bool {
        self.inner.peek().is_some()
    }

    fn next_entry(&mut self) -> Option<Entry<B>> {
        self.inner.next()
    }
}

/// Rewindable, sized in-memory stream.
#[derive(Debug, Clone)]
pub struct VecStream<B> {
    entries: Vec<Entry<B>>,
    position: usize,
}

impl<B> VecStream<B> {
    pub fn new(entries: Vec<Entry<B>>) -> Self {
        Self {
            entries,
            position: 0,
        }
    }
}

impl<B> From<Vec<Entry<B>>> for VecStream<B> {
    fn from(entries: Vec<Entry<B>>) -> Self {
        Self::new(entries)
    }
}

impl<B: Clone> DataStream<B> for VecStream<B> {
    fn has_next(&mut self) -> bool {
        self.position < self.entries.len()
    }

    fn next_entry(&mut self) -> Option<Entry<B>> {
        let entry = self.entries.get(self.position).cloned();
        if entry.is_some() {
            self.position += 1;
        }
        entry
    }

    fn size(&self) -> SpatialResult<u64> {
        Ok(self.entries.len() as u64)
    }

    fn rewind(&mut self) -> SpatialResult<()> {
        self.position = 0;
        Ok(())
    }
}
