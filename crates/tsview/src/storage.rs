//! Where a view's elements live, and the range checks shared by both views.

use crate::error::{ViewError, ViewResult};
use crate::tracked::TrackedArray;

/// Backing memory of a view.
#[derive(Clone)]
pub(crate) enum Storage {
    /// Inside a tracked array. `offset` is in bytes from the array's first
    /// element.
    Owned { array: TrackedArray, offset: usize },
    /// Unmanaged memory starting at `address`.
    Raw { address: *mut u8 },
}

impl Storage {
    /// Address of the view's first element. `array_offset` is the distance
    /// from a tracked array's identity to its first element for the view's
    /// element type.
    #[inline]
    pub(crate) fn base(&self, array_offset: usize) -> *mut u8 {
        match self {
            Self::Owned { array, offset } => {
                debug_assert_eq!(array.data_ptr() as usize - array.identity() as usize, array_offset);
                array.identity().wrapping_add(array_offset + offset)
            }
            Self::Raw { address } => *address,
        }
    }

    /// The same memory, `bytes` further on.
    #[inline]
    pub(crate) fn advance(&self, bytes: usize) -> Self {
        match self {
            Self::Owned { array, offset } => Self::Owned {
                array: array.clone(),
                offset: offset + bytes,
            },
            Self::Raw { address } => Self::Raw {
                address: address.wrapping_add(bytes),
            },
        }
    }

    #[inline]
    pub(crate) fn owner(&self) -> Option<&TrackedArray> {
        match self {
            Self::Owned { array, .. } => Some(array),
            Self::Raw { .. } => None,
        }
    }

    #[inline]
    pub(crate) fn is_raw(&self) -> bool {
        matches!(self, Self::Raw { .. })
    }

    /// Same owner and offset, or same raw address.
    pub(crate) fn same_start(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Owned { array, offset },
                Self::Owned {
                    array: other_array,
                    offset: other_offset,
                },
            ) => array.ptr_eq(other_array) && offset == other_offset,
            (Self::Raw { address }, Self::Raw { address: other }) => address == other,
            _ => false,
        }
    }
}

/// Check that `start..start + length` fits in `available` elements.
#[inline]
pub(crate) fn check_range(start: usize, length: usize, available: usize) -> ViewResult<()> {
    if start <= available && length <= available - start {
        Ok(())
    } else {
        Err(ViewError::Range {
            start,
            length,
            available,
        })
    }
}

/// Check that `start` is at most `available`, returning the remaining length.
#[inline]
pub(crate) fn check_start(start: usize, available: usize) -> ViewResult<usize> {
    available.checked_sub(start).ok_or(ViewError::Range {
        start,
        length: 0,
        available,
    })
}

#[inline]
pub(crate) fn check_index(index: usize, length: usize) -> ViewResult<()> {
    if index < length {
        Ok(())
    } else {
        Err(ViewError::IndexOutOfRange { index, length })
    }
}

/// Validate the arguments of a raw view: non-null unless empty, and a byte
/// length that fits in `isize`.
pub(crate) fn check_raw(address: *const u8, length: usize, size: usize) -> ViewResult<()> {
    if address.is_null() && length != 0 {
        return Err(ViewError::NullPointer { length });
    }
    let max = if size == 0 {
        usize::MAX
    } else {
        isize::MAX as usize / size
    };
    if length > max {
        return Err(ViewError::Range {
            start: 0,
            length,
            available: max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_range() {
        assert!(check_range(0, 0, 0).is_ok());
        assert!(check_range(5, 0, 5).is_ok());
        assert!(check_range(2, 3, 5).is_ok());
        assert!(check_range(2, 4, 5).is_err());
        assert!(check_range(6, 0, 5).is_err());
        assert!(check_range(1, usize::MAX, 5).is_err());
    }

    #[test]
    fn test_check_start() {
        assert_eq!(check_start(0, 3), Ok(3));
        assert_eq!(check_start(3, 3), Ok(0));
        assert!(check_start(4, 3).is_err());
    }

    #[test]
    fn test_check_raw() {
        assert!(check_raw(std::ptr::null(), 0, 4).is_ok());
        assert_eq!(
            check_raw(std::ptr::null(), 5, 4),
            Err(ViewError::NullPointer { length: 5 })
        );
        let dangling = std::ptr::NonNull::<u64>::dangling().as_ptr().cast::<u8>();
        assert!(check_raw(dangling, usize::MAX / 8 + 1, 8).is_err());
        assert!(check_raw(dangling, usize::MAX, 0).is_ok());
    }

    #[test]
    fn test_raw_storage() {
        let mut bytes = [0u8; 8];
        let storage = Storage::Raw {
            address: bytes.as_mut_ptr(),
        };
        assert!(storage.is_raw());
        assert!(storage.owner().is_none());
        let later = storage.advance(3);
        assert_eq!(later.base(0), bytes.as_mut_ptr().wrapping_add(3));
        assert!(!later.same_start(&storage));
        assert!(storage.advance(0).same_start(&storage));
    }
}
