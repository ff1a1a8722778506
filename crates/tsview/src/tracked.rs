//! Reference-counted arrays that own their elements.
//!
//! A [`TrackedArray`] is one allocation holding an [`ArrayHeader`] followed
//! by the elements. Cloning it adds a reference; the elements are dropped and
//! the allocation freed when the last reference goes away. Views keep their
//! owner alive by holding one of these references.

use crate::error::{ViewError, ViewResult};
use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::{self, NonNull};
use tsview_dispatch::{array_layout, ArrayHeader, ArrayShape, Element};
use tsview_registry::{info_of, RuntimeTypeId, RuntimeTypeInfo};

/// A runtime-owned, reference-counted array of one element type.
///
/// Tracked arrays are confined to the thread that created them, together
/// with every view over them.
pub struct TrackedArray {
    header: NonNull<ArrayHeader>,
    info: &'static RuntimeTypeInfo,
}

impl TrackedArray {
    /// Move the elements of `items` into a new zero-based vector.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailed` if the array size overflows `isize::MAX`.
    pub fn from_vec<T: Element>(items: Vec<T>) -> ViewResult<Self> {
        let shape = ArrayShape::vector(items.len());
        Self::allocate(items, shape)
    }

    /// Move the elements of `items` into a new array with the given shape.
    ///
    /// Views only accept rank-1, zero-based arrays; other shapes exist so
    /// that callers holding them get a proper error.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the shape does not hold exactly
    /// `items.len()` elements, `AllocationFailed` if the size overflows.
    pub fn with_shape<T: Element>(
        items: Vec<T>,
        dims: &[usize],
        lower_bound: isize,
    ) -> ViewResult<Self> {
        let shape = ArrayShape::new(dims, lower_bound);
        if shape.element_count() != Some(items.len()) {
            return Err(ViewError::ShapeMismatch {
                dims: dims.to_vec(),
                len: items.len(),
            });
        }
        Self::allocate(items, shape)
    }

    fn allocate<T: Element>(mut items: Vec<T>, shape: ArrayShape) -> ViewResult<Self> {
        let info = info_of::<T>();
        let len = items.len();
        let (layout, offset) = array_layout::<T>(len)
            .map_err(|e| ViewError::AllocationFailed(format!("invalid layout: {e}")))?;
        debug_assert_eq!(offset, info.array_offset());

        // Safety: the layout includes the header, so its size is non-zero.
        let base = unsafe { alloc::alloc(layout) };
        let base = match NonNull::new(base) {
            Some(base) => base,
            None => alloc::handle_alloc_error(layout),
        };

        let header = ArrayHeader::new(
            len,
            offset,
            layout,
            info.id().as_u32(),
            shape,
            info.drop_fn(),
        );

        // Safety: `base` is valid for `layout`, which places the header at
        // offset zero and `len` elements of `T` at `offset`. The elements are
        // moved out of `items`, which forgets them before freeing its buffer.
        unsafe {
            base.as_ptr().cast::<ArrayHeader>().write(header);
            let data = base.as_ptr().add(offset).cast::<T>();
            ptr::copy_nonoverlapping(items.as_ptr(), data, len);
            items.set_len(0);
        }

        tracing::trace!(
            type_name = info.type_name(),
            len,
            bytes = layout.size(),
            "allocated tracked array"
        );

        Ok(Self {
            header: base.cast(),
            info,
        })
    }

    #[inline]
    pub(crate) fn header(&self) -> &ArrayHeader {
        // Safety: the header lives as long as any reference to the array.
        unsafe { self.header.as_ref() }
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.header().len()
    }

    /// Check if the array holds no elements.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.header().is_empty()
    }

    /// Registry id of the element type.
    #[inline]
    #[must_use]
    pub fn type_id(&self) -> RuntimeTypeId {
        RuntimeTypeId::from_raw(self.header().type_tag())
    }

    /// Descriptor of the element type.
    #[inline]
    #[must_use]
    pub fn element_info(&self) -> &'static RuntimeTypeInfo {
        self.info
    }

    /// Name of the element type.
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.info.type_name()
    }

    /// Shape of the array.
    #[inline]
    #[must_use]
    pub fn shape(&self) -> &ArrayShape {
        self.header().shape()
    }

    /// Whether this is a rank-1, zero-based array.
    #[inline]
    #[must_use]
    pub fn is_vector(&self) -> bool {
        self.shape().is_vector()
    }

    /// Address of the header, which identifies the array.
    #[inline]
    #[must_use]
    pub fn identity(&self) -> *mut u8 {
        self.header.as_ptr().cast::<u8>()
    }

    /// Address of the first element.
    #[inline]
    #[must_use]
    pub fn data_ptr(&self) -> *mut u8 {
        // Safety: the data offset lies within the allocation.
        unsafe { self.identity().add(self.header().data_offset()) }
    }

    /// Whether both handles refer to the same array.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.header == other.header
    }

    /// Number of live references, views included.
    #[inline]
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.header().ref_count()
    }

    /// Clone the elements out.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the elements are not `T`.
    pub fn to_vec<T: Element>(&self) -> ViewResult<Vec<T>> {
        self.expect_type::<T>()?;
        let data = self.data_ptr().cast::<T>();
        // Safety: the type matches, the data is aligned for `T` and holds
        // `len` initialized elements.
        let elements = unsafe { std::slice::from_raw_parts(data, self.len()) };
        Ok(elements.to_vec())
    }

    pub(crate) fn expect_type<T: Element>(&self) -> ViewResult<()> {
        if self.info.is::<T>() {
            Ok(())
        } else {
            Err(ViewError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                found: self.info.type_name(),
            })
        }
    }

    pub(crate) fn expect_vector(&self) -> ViewResult<()> {
        let shape = self.shape();
        if shape.is_vector() {
            Ok(())
        } else {
            Err(ViewError::ArrayShape {
                rank: shape.rank(),
                lower_bound: shape.lower_bound(),
            })
        }
    }
}

impl Clone for TrackedArray {
    fn clone(&self) -> Self {
        self.header().retain();
        Self {
            header: self.header,
            info: self.info,
        }
    }
}

impl Drop for TrackedArray {
    fn drop(&mut self) {
        if !self.header().release() {
            return;
        }

        let header = self.header.as_ptr();
        // Safety: this was the last reference. The elements and header were
        // initialized by `allocate` with the recorded layout and drop glue.
        unsafe {
            let layout: Layout = (*header).layout();
            let drop_elements = (*header).drop_elements();
            drop_elements(self.data_ptr(), (*header).len());
            ptr::drop_in_place(header);
            alloc::dealloc(header.cast::<u8>(), layout);
        }
    }
}

impl fmt::Debug for TrackedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedArray")
            .field("type", &self.type_name())
            .field("len", &self.len())
            .field("shape", &self.shape().dims())
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tsview_registry::id_of;

    #[test]
    fn test_from_vec() {
        let array = TrackedArray::from_vec(vec![1i32, 2, 3]).unwrap();
        assert_eq!(array.len(), 3);
        assert!(array.is_vector());
        assert_eq!(array.type_id(), id_of::<i32>());
        assert_eq!(array.type_name(), "i32");
        assert_eq!(array.to_vec::<i32>().unwrap(), [1, 2, 3]);
        assert_eq!(
            array.data_ptr() as usize - array.identity() as usize,
            array.element_info().array_offset()
        );
    }

    #[test]
    fn test_empty() {
        let array = TrackedArray::from_vec(Vec::<f64>::new()).unwrap();
        assert!(array.is_empty());
        assert_eq!(array.to_vec::<f64>().unwrap(), Vec::<f64>::new());
    }

    #[test]
    fn test_wrong_type() {
        let array = TrackedArray::from_vec(vec![1u8]).unwrap();
        let err = array.to_vec::<i8>().unwrap_err();
        assert_eq!(
            err,
            ViewError::TypeMismatch {
                expected: "i8",
                found: "u8"
            }
        );
    }

    #[test]
    fn test_shape_must_match() {
        let matrix = TrackedArray::with_shape(vec![0u16; 6], &[2, 3], 0).unwrap();
        assert!(!matrix.is_vector());
        assert_eq!(matrix.shape().rank(), 2);
        assert!(matches!(matrix.expect_vector(), Err(ViewError::ArrayShape { rank: 2, .. })));

        let err = TrackedArray::with_shape(vec![0u16; 5], &[2, 3], 0).unwrap_err();
        assert_eq!(
            err,
            ViewError::ShapeMismatch {
                dims: vec![2, 3],
                len: 5
            }
        );
        assert_eq!(err.kind(), crate::ErrorKind::ArrayShape);
        assert_eq!(err.to_string(), "shape [2, 3] does not hold 5 elements");
    }

    #[test]
    fn test_clone_shares_storage() {
        let a = TrackedArray::from_vec(vec![String::from("x")]).unwrap();
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.ref_count(), 2);
        drop(b);
        assert_eq!(a.ref_count(), 1);

        let c = TrackedArray::from_vec(vec![String::from("x")]).unwrap();
        assert!(!a.ptr_eq(&c));
    }

    #[test]
    fn test_last_reference_drops_elements() {
        let shared = Arc::new(7u8);
        let array = TrackedArray::from_vec(vec![Arc::clone(&shared), Arc::clone(&shared)]).unwrap();
        let other = array.clone();
        assert_eq!(Arc::strong_count(&shared), 3);

        drop(array);
        assert_eq!(Arc::strong_count(&shared), 3);
        drop(other);
        assert_eq!(Arc::strong_count(&shared), 1);
    }
}
