//! Error and identifier types shared by every layer of the index.

use std::io;
use thiserror::Error;

/// Caller-assigned identifier of a data entry.
pub type EntryId = i64;

/// Identifier of a node inside a [`NodeStore`](crate::storage::NodeStore).
pub type NodeId = u64;

/// Errors that can occur in spatial indexing operations
#[derive(Debug, Error)]
pub enum SpatialError {
    /// An operand's dimensionality differs from the tree's (or the other operand's).
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A delete target `(id, region)` is not present in the tree.
    #[error("Entry {0} not found")]
    EntryNotFound(EntryId),

    /// The index configuration was rejected at construction time.
    #[error("Capacity misconfigured: {0}")]
    CapacityMisconfigured(String),

    /// A stream (or store) does not implement an optional operation.
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Node {0} not found in storage")]
    NodeNotFound(NodeId),

    #[error("Index corrupted: {0}")]
    Corrupted(String),
}

impl SpatialError {
    /// Returns `true` for failures raised by the storage collaborator.
    ///
    /// These are propagated unchanged from [`NodeStore`](crate::storage::NodeStore)
    /// implementations; a failure during commit may leave the store partially
    /// written and the caller is responsible for recovery.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            SpatialError::Io(_)
                | SpatialError::Serialization(_)
                | SpatialError::NodeNotFound(_)
                | SpatialError::Corrupted(_)
        )
    }

    pub(crate) fn dimension(expected: usize, actual: usize) -> SpatialResult<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(SpatialError::DimensionMismatch { expected, actual })
        }
    }
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_check() {
        assert!(SpatialError::dimension(2, 2).is_ok());
        match SpatialError::dimension(2, 3) {
            Err(SpatialError::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_storage_failure_classification() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing page");
        assert!(SpatialError::Io(io_err).is_storage_failure());
        assert!(SpatialError::NodeNotFound(7).is_storage_failure());
        assert!(SpatialError::Corrupted("bad checksum".into()).is_storage_failure());
        assert!(!SpatialError::EntryNotFound(1).is_storage_failure());
        assert!(!SpatialError::Unsupported("rewind".into()).is_storage_failure());
    }

    #[test]
    fn test_error_messages() {
        let err = SpatialError::DimensionMismatch { expected: 2, actual: 3 };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 2, got 3");
        assert_eq!(SpatialError::EntryNotFound(42).to_string(), "Entry 42 not found");
    }
}
