//! Error types for view operations.

use thiserror::Error;
use tsview_registry::RuntimeTypeId;

/// Errors produced by view construction, access and bulk operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    /// A `(start, length)` pair does not fit the available elements.
    #[error("range {start}..{start}+{length} does not fit in {available} elements")]
    Range {
        /// First element of the range.
        start: usize,
        /// Number of elements in the range.
        length: usize,
        /// Number of elements available.
        available: usize,
    },

    /// An element index is outside `0..length`.
    #[error("index {index} out of range for view of length {length}")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Length of the view.
        length: usize,
    },

    /// A raw view was requested over a null pointer with a non-zero length.
    #[error("null pointer with non-zero length {length}")]
    NullPointer {
        /// Requested length.
        length: usize,
    },

    /// The element type differs from the one requested.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type the operation required.
        expected: &'static str,
        /// Type actually present.
        found: &'static str,
    },

    /// The element type contains references and cannot live in raw memory.
    #[error("{type_name} contains references and cannot be viewed over raw memory")]
    UnsupportedType {
        /// The rejected type.
        type_name: &'static str,
    },

    /// The array is not a rank-1, zero-based vector.
    #[error("array of rank {rank} with lower bound {lower_bound} is not a vector")]
    ArrayShape {
        /// Number of dimensions.
        rank: usize,
        /// Lower bound of the array.
        lower_bound: isize,
    },

    /// The dimensions given for a new array do not hold its elements.
    #[error("shape {dims:?} does not hold {len} elements")]
    ShapeMismatch {
        /// Requested dimensions.
        dims: Vec<usize>,
        /// Number of elements supplied.
        len: usize,
    },

    /// The destination of a copy is shorter than the source.
    #[error("destination too short: need {required} elements, have {available}")]
    DestinationTooShort {
        /// Elements to copy.
        required: usize,
        /// Elements in the destination.
        available: usize,
    },

    /// No element type is registered under the id.
    #[error("unknown element type {0}")]
    UnknownType(RuntimeTypeId),

    /// A tracked array could not be allocated.
    #[error("tracked array allocation failed: {0}")]
    AllocationFailed(String),
}

/// Coarse classification of [`ViewError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Offsets, lengths or indices out of range.
    Range,
    /// Null pointer with a non-zero length.
    NullOrZeroLength,
    /// Wrong or unknown element type.
    TypeMismatch,
    /// Reference-containing type over raw memory.
    UnsupportedType,
    /// Not a vector, or dimensions that do not fit the elements.
    ArrayShape,
    /// Tracked array allocation.
    Allocation,
}

impl ViewError {
    /// The coarse kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Range { .. } | Self::IndexOutOfRange { .. } | Self::DestinationTooShort { .. } => {
                ErrorKind::Range
            }
            Self::NullPointer { .. } => ErrorKind::NullOrZeroLength,
            Self::TypeMismatch { .. } | Self::UnknownType(_) => ErrorKind::TypeMismatch,
            Self::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            Self::ArrayShape { .. } | Self::ShapeMismatch { .. } => ErrorKind::ArrayShape,
            Self::AllocationFailed(_) => ErrorKind::Allocation,
        }
    }
}

/// Result type for view operations.
pub type ViewResult<T> = Result<T, ViewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = ViewError::Range {
            start: 3,
            length: 4,
            available: 5,
        };
        assert_eq!(err.to_string(), "range 3..3+4 does not fit in 5 elements");

        let err = ViewError::TypeMismatch {
            expected: "f64",
            found: "i32",
        };
        assert_eq!(err.to_string(), "type mismatch: expected f64, found i32");

        let err = ViewError::UnknownType(RuntimeTypeId::from_raw(9));
        assert_eq!(err.to_string(), "unknown element type #9");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            ViewError::IndexOutOfRange { index: 1, length: 0 }.kind(),
            ErrorKind::Range
        );
        assert_eq!(
            ViewError::DestinationTooShort {
                required: 2,
                available: 1
            }
            .kind(),
            ErrorKind::Range
        );
        assert_eq!(ViewError::NullPointer { length: 5 }.kind(), ErrorKind::NullOrZeroLength);
        assert_eq!(
            ViewError::UnknownType(RuntimeTypeId::from_raw(0)).kind(),
            ErrorKind::TypeMismatch
        );
        assert_eq!(
            ViewError::AllocationFailed(String::new()).kind(),
            ErrorKind::Allocation
        );
    }
}
