//! Tracked array header layout.
//!
//! A tracked array is a single allocation:
//!
//! ```text
//! +----------------+---------+-------------------------------+
//! |  ArrayHeader   | padding |  element 0 | element 1 | ...   |
//! +----------------+---------+-------------------------------+
//! ^ identity                 ^ identity + array_element_offset::<T>()
//! ```
//!
//! The distance from the identity to the first element depends only on the
//! element type's alignment, so it is computed once per type and cached by
//! the registry.

use crate::DropFn;
use std::alloc::{Layout, LayoutError};
use std::cell::Cell;

/// Dimensions and lower bound of a tracked array.
///
/// Only a rank-1, zero-based shape is a vector; views refuse anything else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayShape {
    dims: Box<[usize]>,
    lower_bound: isize,
}

impl ArrayShape {
    /// A zero-based vector of `len` elements.
    #[must_use]
    pub fn vector(len: usize) -> Self {
        Self {
            dims: Box::new([len]),
            lower_bound: 0,
        }
    }

    /// An arbitrary shape.
    #[must_use]
    pub fn new(dims: &[usize], lower_bound: isize) -> Self {
        Self {
            dims: dims.into(),
            lower_bound,
        }
    }

    /// Number of dimensions.
    #[inline]
    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Extent of each dimension.
    #[inline]
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Index of the first element along each dimension.
    #[inline]
    #[must_use]
    pub const fn lower_bound(&self) -> isize {
        self.lower_bound
    }

    /// Whether this is a rank-1, zero-based shape.
    #[inline]
    #[must_use]
    pub fn is_vector(&self) -> bool {
        self.dims.len() == 1 && self.lower_bound == 0
    }

    /// Total number of elements, or `None` on overflow.
    #[must_use]
    pub fn element_count(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }
}

/// Header stored at the identity address of every tracked array.
///
/// The reference count is not atomic: a tracked array and every view of it
/// stay on the thread that created them.
#[derive(Debug)]
#[repr(C)]
pub struct ArrayHeader {
    /// Strong reference count.
    refs: Cell<usize>,
    /// Number of elements.
    len: usize,
    /// Byte offset from the header to the first element.
    data_offset: usize,
    /// Layout of the whole allocation.
    layout: Layout,
    /// Registry tag of the element type.
    type_tag: u32,
    /// Array shape.
    shape: ArrayShape,
    /// Drops `len` elements starting at the first element.
    drop_elements: DropFn,
}

impl ArrayHeader {
    /// Create a header with a reference count of one.
    #[must_use]
    pub fn new(
        len: usize,
        data_offset: usize,
        layout: Layout,
        type_tag: u32,
        shape: ArrayShape,
        drop_elements: DropFn,
    ) -> Self {
        Self {
            refs: Cell::new(1),
            len,
            data_offset,
            layout,
            type_tag,
            shape,
            drop_elements,
        }
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the array holds no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte offset from the header to the first element.
    #[inline]
    #[must_use]
    pub const fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// Layout of the whole allocation.
    #[inline]
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Registry tag of the element type.
    #[inline]
    #[must_use]
    pub const fn type_tag(&self) -> u32 {
        self.type_tag
    }

    /// Array shape.
    #[inline]
    #[must_use]
    pub const fn shape(&self) -> &ArrayShape {
        &self.shape
    }

    /// Drop glue for the elements.
    #[inline]
    #[must_use]
    pub const fn drop_elements(&self) -> DropFn {
        self.drop_elements
    }

    /// Current strong reference count.
    #[inline]
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.refs.get()
    }

    /// Add a strong reference.
    #[inline]
    pub fn retain(&self) {
        let old = self.refs.get();
        if old == usize::MAX {
            std::process::abort();
        }
        self.refs.set(old + 1);
    }

    /// Drop a strong reference. Returns `true` when it was the last one and
    /// the array must be destroyed.
    #[inline]
    #[must_use]
    pub fn release(&self) -> bool {
        let old = self.refs.get();
        debug_assert!(old > 0, "released a dead tracked array");
        self.refs.set(old - 1);
        old == 1
    }
}

/// Byte distance from a tracked array's identity to its first element.
#[inline]
#[must_use]
pub const fn array_element_offset<T>() -> usize {
    crate::align_up(
        std::mem::size_of::<ArrayHeader>(),
        std::mem::align_of::<T>(),
    )
}

/// Layout of a tracked array of `len` elements, and the offset of its first
/// element.
///
/// # Errors
///
/// Returns an error if the total size overflows `isize::MAX`.
pub fn array_layout<T>(len: usize) -> Result<(Layout, usize), LayoutError> {
    let (layout, offset) = Layout::new::<ArrayHeader>().extend(Layout::array::<T>(len)?)?;
    Ok((layout.pad_to_align(), offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(64))]
    struct CacheLine([u8; 64]);

    #[test]
    fn test_offset_matches_layout() {
        assert_eq!(array_element_offset::<u8>(), array_layout::<u8>(3).unwrap().1);
        assert_eq!(array_element_offset::<f64>(), array_layout::<f64>(0).unwrap().1);
        assert_eq!(
            array_element_offset::<CacheLine>(),
            array_layout::<CacheLine>(2).unwrap().1
        );
        assert_eq!(array_element_offset::<CacheLine>() % 64, 0);
        assert_eq!(std::mem::size_of::<CacheLine>(), 64);
    }

    #[test]
    fn test_offset_never_overlaps_header() {
        assert!(array_element_offset::<u8>() >= std::mem::size_of::<ArrayHeader>());
        assert!(array_element_offset::<u128>() >= std::mem::size_of::<ArrayHeader>());
    }

    #[test]
    fn test_layout_overflow() {
        assert!(array_layout::<u64>(usize::MAX / 4).is_err());
    }

    #[test]
    fn test_shape() {
        let v = ArrayShape::vector(5);
        assert!(v.is_vector());
        assert_eq!(v.element_count(), Some(5));

        let m = ArrayShape::new(&[2, 3], 0);
        assert!(!m.is_vector());
        assert_eq!(m.rank(), 2);
        assert_eq!(m.element_count(), Some(6));

        let offset = ArrayShape::new(&[4], 1);
        assert!(!offset.is_vector());
        assert_eq!(offset.lower_bound(), 1);

        assert_eq!(ArrayShape::new(&[usize::MAX, 2], 0).element_count(), None);
    }

    #[test]
    fn test_refcount() {
        unsafe fn noop(_: *mut u8, _: usize) {}
        let header = ArrayHeader::new(0, 64, Layout::new::<u8>(), 0, ArrayShape::vector(0), noop);
        assert_eq!(header.ref_count(), 1);
        header.retain();
        assert_eq!(header.ref_count(), 2);
        assert!(!header.release());
        assert!(header.release());
    }
}
