//! Statically typed views.

use crate::error::{ViewError, ViewResult};
use crate::storage::{check_index, check_range, check_raw, check_start, Storage};
use crate::tracked::TrackedArray;
use crate::untyped::UntypedView;
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr::{self, NonNull};
use tsview_dispatch::{array_element_offset, read_at, write_at, Element};
use tsview_registry::{id_of, info_of, RuntimeTypeId};

/// A window of `len` elements of type `T`, over a tracked array or raw
/// memory.
///
/// Views are cheap to clone and never own element memory. Writes go through
/// `&self`: every clone of a view, and every other view of the same memory,
/// observes them.
#[derive(Clone)]
pub struct TypedView<T: Element> {
    storage: Storage,
    len: usize,
    type_id: RuntimeTypeId,
    _marker: PhantomData<T>,
}

impl<T: Element> TypedView<T> {
    pub(crate) fn from_storage(storage: Storage, len: usize, type_id: RuntimeTypeId) -> Self {
        Self {
            storage,
            len,
            type_id,
            _marker: PhantomData,
        }
    }

    /// View every element of `array`.
    ///
    /// # Errors
    ///
    /// `ArrayShape` if the array is not a zero-based vector, `TypeMismatch`
    /// if its elements are not `T`.
    pub fn from_array(array: &TrackedArray) -> ViewResult<Self> {
        Self::from_array_range(array, 0, array.len())
    }

    /// View the elements of `array` from `start` to the end.
    ///
    /// # Errors
    ///
    /// As [`from_array`](Self::from_array), plus `Range` if `start` is past
    /// the end.
    pub fn from_array_start(array: &TrackedArray, start: usize) -> ViewResult<Self> {
        array.expect_vector()?;
        array.expect_type::<T>()?;
        let length = check_start(start, array.len())?;
        Self::from_array_range(array, start, length)
    }

    /// View `length` elements of `array` starting at `start`.
    ///
    /// # Errors
    ///
    /// As [`from_array`](Self::from_array), plus `Range` if the range does
    /// not fit.
    pub fn from_array_range(array: &TrackedArray, start: usize, length: usize) -> ViewResult<Self> {
        array.expect_vector()?;
        array.expect_type::<T>()?;
        check_range(start, length, array.len())?;

        let storage = Storage::Owned {
            array: array.clone(),
            offset: start * size_of::<T>(),
        };
        Ok(Self::from_storage(storage, length, array.type_id()))
    }

    /// View `len` elements of unmanaged memory starting at `ptr`.
    ///
    /// `ptr` need not be aligned for `T`. A null `ptr` is accepted when
    /// `len` is zero.
    ///
    /// # Errors
    ///
    /// `UnsupportedType` if `T` contains references, `NullPointer` if `ptr`
    /// is null and `len` is not, `Range` if the byte length overflows
    /// `isize`.
    ///
    /// # Safety
    ///
    /// `len * size_of::<T>()` bytes at `ptr` must stay valid, unmoved and
    /// initialized for the lifetime of the view and all views derived from
    /// it.
    pub unsafe fn from_raw_parts(ptr: *mut T, len: usize) -> ViewResult<Self> {
        if T::CONTAINS_REFERENCES {
            return Err(ViewError::UnsupportedType {
                type_name: std::any::type_name::<T>(),
            });
        }
        check_raw(ptr.cast::<u8>(), len, size_of::<T>())?;

        let storage = Storage::Raw {
            address: ptr.cast::<u8>(),
        };
        Ok(Self::from_storage(storage, len, id_of::<T>()))
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the view has no elements.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the view is over unmanaged memory rather than a tracked array.
    #[inline]
    #[must_use]
    pub fn is_raw(&self) -> bool {
        self.storage.is_raw()
    }

    /// Registry id of `T`.
    #[inline]
    #[must_use]
    pub fn type_id(&self) -> RuntimeTypeId {
        self.type_id
    }

    /// The tracked array backing the view, if any.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> Option<&TrackedArray> {
        self.storage.owner()
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        self.storage.base(array_element_offset::<T>())
    }

    #[inline]
    fn address(&self, index: usize) -> *mut u8 {
        self.base().wrapping_add(index * size_of::<T>())
    }

    /// Read the element at `index`.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` if `index >= len`.
    #[inline]
    pub fn get(&self, index: usize) -> ViewResult<T> {
        check_index(index, self.len)?;
        // Safety: bounds checked above.
        Ok(unsafe { self.get_unchecked(index) })
    }

    /// Read the element at `index` without a bounds check.
    ///
    /// # Safety
    ///
    /// `index` must be less than `len`.
    #[inline]
    pub unsafe fn get_unchecked(&self, index: usize) -> T {
        debug_assert!(index < self.len);
        unsafe { read_at::<T>(self.address(index)) }
    }

    /// Overwrite the element at `index`.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` if `index >= len`.
    #[inline]
    pub fn set(&self, index: usize, value: T) -> ViewResult<()> {
        check_index(index, self.len)?;
        // Safety: bounds checked above.
        unsafe { self.set_unchecked(index, value) };
        Ok(())
    }

    /// Overwrite the element at `index` without a bounds check.
    ///
    /// # Safety
    ///
    /// `index` must be less than `len`.
    #[inline]
    pub unsafe fn set_unchecked(&self, index: usize, value: T) {
        debug_assert!(index < self.len);
        unsafe { write_at::<T>(self.address(index), value) }
    }

    /// Pointer to the slot at `index`.
    ///
    /// Over raw memory the pointer may be unaligned; use
    /// `read_unaligned`/`write_unaligned` unless [`is_aligned`](Self::is_aligned)
    /// holds.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` if `index >= len`.
    pub fn get_ref(&self, index: usize) -> ViewResult<NonNull<T>> {
        check_index(index, self.len)?;
        // Safety: bounds checked above.
        Ok(unsafe { self.get_ref_unchecked(index) })
    }

    /// Pointer to the slot at `index` without a bounds check.
    ///
    /// # Safety
    ///
    /// `index` must be less than `len`.
    pub unsafe fn get_ref_unchecked(&self, index: usize) -> NonNull<T> {
        debug_assert!(index < self.len);
        // Safety: in-bounds slots of a valid view are never null.
        unsafe { NonNull::new_unchecked(self.address(index).cast::<T>()) }
    }

    /// The elements from `start` to the end.
    ///
    /// # Errors
    ///
    /// `Range` if `start > len`.
    pub fn slice_from(&self, start: usize) -> ViewResult<Self> {
        let length = check_start(start, self.len)?;
        self.slice(start, length)
    }

    /// `length` elements starting at `start`, sharing this view's memory.
    ///
    /// # Errors
    ///
    /// `Range` if the range does not fit.
    pub fn slice(&self, start: usize, length: usize) -> ViewResult<Self> {
        check_range(start, length, self.len)?;
        let storage = self.storage.advance(start * size_of::<T>());
        Ok(Self::from_storage(storage, length, self.type_id))
    }

    /// The same elements, typed at runtime.
    #[must_use]
    pub fn as_untyped(&self) -> UntypedView {
        UntypedView::from_storage(self.storage.clone(), self.len, info_of::<T>())
    }

    /// Whether both views describe exactly the same elements.
    #[must_use]
    pub fn same_memory(&self, other: &Self) -> bool {
        self.len == other.len
            && self.type_id == other.type_id
            && self.storage.same_start(&other.storage)
    }

    /// Copy every element into the front of `dest`.
    ///
    /// The views may overlap.
    ///
    /// # Errors
    ///
    /// `DestinationTooShort` if `dest` has fewer elements than `self`.
    pub fn copy_to(&self, dest: &TypedView<T>) -> ViewResult<()> {
        if dest.len < self.len {
            return Err(ViewError::DestinationTooShort {
                required: self.len,
                available: dest.len,
            });
        }
        // Safety: both ranges are in bounds of valid views.
        unsafe { copy_elements::<T>(self.base(), dest.base(), self.len) };
        Ok(())
    }

    /// Like [`copy_to`](Self::copy_to), returning `false` instead of an
    /// error when `dest` is too short.
    pub fn try_copy_to(&self, dest: &TypedView<T>) -> bool {
        self.copy_to(dest).is_ok()
    }

    /// Move `length` elements from `start` to `destination` within the view.
    ///
    /// The source and destination ranges may overlap.
    ///
    /// # Errors
    ///
    /// `Range` if either range does not fit.
    pub fn move_block(&self, start: usize, length: usize, destination: usize) -> ViewResult<()> {
        check_range(start, length, self.len)?;
        check_range(destination, length, self.len)?;
        // Safety: both ranges were checked.
        unsafe { copy_elements::<T>(self.address(start), self.address(destination), length) };
        Ok(())
    }

    /// Set every element to `value`.
    pub fn fill(&self, value: T) {
        for index in 0..self.len {
            // Safety: `index < len`.
            unsafe { self.set_unchecked(index, value.clone()) };
        }
    }

    /// Set every element to its default.
    pub fn clear(&self)
    where
        T: Default,
    {
        self.fill(T::default());
    }

    /// Clone the elements into a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Iterate over clones of the elements.
    #[inline]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            view: self,
            index: 0,
        }
    }

    /// Address of the first element.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.base().cast::<T>()
    }

    /// Mutable address of the first element.
    #[inline]
    #[must_use]
    pub fn as_mut_ptr(&self) -> *mut T {
        self.base().cast::<T>()
    }

    /// Size of the viewed memory in bytes.
    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.len * size_of::<T>()
    }

    /// Whether the first element is aligned for `T`. Always true for views
    /// of tracked arrays.
    #[inline]
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        self.len == 0 || tsview_dispatch::is_aligned(self.base(), std::mem::align_of::<T>())
    }

    /// Borrow the elements as a slice.
    ///
    /// # Safety
    ///
    /// The view must be [aligned](Self::is_aligned), and no element may be
    /// written through any view of the same memory while the slice lives.
    pub unsafe fn as_slice(&self) -> &[T] {
        if self.len == 0 {
            return &[];
        }
        debug_assert!(self.is_aligned());
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len) }
    }

    /// Borrow the elements as a mutable slice.
    ///
    /// # Safety
    ///
    /// The view must be [aligned](Self::is_aligned), and no element may be
    /// accessed through any other view of the same memory while the slice
    /// lives.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [T] {
        if self.len == 0 {
            return &mut [];
        }
        debug_assert!(self.is_aligned());
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), self.len) }
    }
}

/// Copy `len` elements of `T` from `src` to `dst`, allowing overlap.
///
/// # Safety
///
/// Both ranges must be valid views of `len` elements of `T`.
pub(crate) unsafe fn copy_elements<T: Element>(src: *const u8, dst: *mut u8, len: usize) {
    if len == 0 || ptr::eq(src, dst) {
        return;
    }
    let size = size_of::<T>();
    if T::CONTAINS_REFERENCES {
        // Clone everything out first so overlapping ranges read old values.
        let staged: Vec<T> = (0..len)
            .map(|i| unsafe { read_at::<T>(src.add(i * size)) })
            .collect();
        for (i, value) in staged.into_iter().enumerate() {
            unsafe { write_at::<T>(dst.add(i * size), value) };
        }
    } else {
        unsafe { ptr::copy(src, dst, len * size) };
    }
}

impl<T: Element> fmt::Display for TypedView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedView<{}>[{}]", std::any::type_name::<T>(), self.len)
    }
}

impl<T: Element> fmt::Debug for TypedView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedView")
            .field("type", &std::any::type_name::<T>())
            .field("len", &self.len)
            .field("raw", &self.is_raw())
            .field("address", &self.as_ptr())
            .finish()
    }
}

/// Iterator over clones of a view's elements.
pub struct Iter<'a, T: Element> {
    view: &'a TypedView<T>,
    index: usize,
}

impl<T: Element> Iterator for Iter<'_, T> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<T> {
        if self.index >= self.view.len {
            return None;
        }
        // Safety: `index < len`.
        let value = unsafe { self.view.get_unchecked(self.index) };
        self.index += 1;
        Some(value)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.view.len - self.index;
        (remaining, Some(remaining))
    }
}

impl<T: Element> ExactSizeIterator for Iter<'_, T> {}

impl<T: Element> FusedIterator for Iter<'_, T> {}

impl<'a, T: Element> IntoIterator for &'a TypedView<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i32]) -> TypedView<i32> {
        let array = TrackedArray::from_vec(values.to_vec()).unwrap();
        TypedView::from_array(&array).unwrap()
    }

    #[test]
    fn test_whole_array() {
        let view = ints(&[1, 2, 3]);
        assert_eq!(view.len(), 3);
        assert!(!view.is_raw());
        assert_eq!(view.get(0).unwrap(), 1);
        assert_eq!(view.get(2).unwrap(), 3);
        assert_eq!(
            view.get(3),
            Err(ViewError::IndexOutOfRange { index: 3, length: 3 })
        );
        assert_eq!(view.to_string(), "TypedView<i32>[3]");
    }

    #[test]
    fn test_view_keeps_owner_alive() {
        let view = {
            let array = TrackedArray::from_vec(vec![String::from("kept")]).unwrap();
            TypedView::<String>::from_array(&array).unwrap()
        };
        assert_eq!(view.owner().map(TrackedArray::ref_count), Some(1));
        assert_eq!(view.get(0).unwrap(), "kept");
    }

    #[test]
    fn test_array_ranges() {
        let array = TrackedArray::from_vec(vec![10u8, 11, 12, 13]).unwrap();
        let tail = TypedView::<u8>::from_array_start(&array, 1).unwrap();
        assert_eq!(tail.to_vec(), [11, 12, 13]);

        let mid = TypedView::<u8>::from_array_range(&array, 1, 2).unwrap();
        assert_eq!(mid.to_vec(), [11, 12]);

        assert!(TypedView::<u8>::from_array_start(&array, 4).unwrap().is_empty());
        assert!(matches!(
            TypedView::<u8>::from_array_start(&array, 5),
            Err(ViewError::Range { .. })
        ));
        assert!(matches!(
            TypedView::<u8>::from_array_range(&array, 3, 2),
            Err(ViewError::Range { .. })
        ));
    }

    #[test]
    fn test_array_type_and_shape() {
        let array = TrackedArray::from_vec(vec![1i32]).unwrap();
        assert_eq!(
            TypedView::<f64>::from_array(&array).unwrap_err(),
            ViewError::TypeMismatch {
                expected: "f64",
                found: "i32"
            }
        );

        let matrix = TrackedArray::with_shape(vec![1i32; 4], &[2, 2], 0).unwrap();
        assert!(matches!(
            TypedView::<i32>::from_array(&matrix),
            Err(ViewError::ArrayShape { rank: 2, .. })
        ));
    }

    #[test]
    fn test_raw_parts() {
        let mut data = [1.5f64, 2.5, 3.5];
        let view = unsafe { TypedView::from_raw_parts(data.as_mut_ptr(), data.len()) }.unwrap();
        assert!(view.is_raw());
        assert!(view.owner().is_none());
        view.set(1, 9.0).unwrap();
        assert_eq!(data[1], 9.0);

        let empty = unsafe { TypedView::<u32>::from_raw_parts(ptr::null_mut(), 0) }.unwrap();
        assert!(empty.is_empty());
        assert_eq!(unsafe { empty.as_slice() }, &[] as &[u32]);

        let err = unsafe { TypedView::<u32>::from_raw_parts(ptr::null_mut(), 5) }.unwrap_err();
        assert_eq!(err, ViewError::NullPointer { length: 5 });
    }

    #[test]
    fn test_raw_rejects_reference_types() {
        let mut strings = vec![String::new()];
        let err = unsafe { TypedView::from_raw_parts(strings.as_mut_ptr(), 1) }.unwrap_err();
        assert!(matches!(err, ViewError::UnsupportedType { .. }));
    }

    #[test]
    fn test_unaligned_raw_memory() {
        let mut words = [0u64; 3];
        let ptr = words.as_mut_ptr().cast::<u8>().wrapping_add(1).cast::<u64>();
        let view = unsafe { TypedView::from_raw_parts(ptr, 2) }.unwrap();
        assert!(!view.is_aligned());
        view.set(0, u64::MAX).unwrap();
        view.set(1, 7).unwrap();
        assert_eq!(view.to_vec(), [u64::MAX, 7]);

        let bytes = unsafe { TypedView::from_raw_parts(words.as_mut_ptr().cast::<u8>(), 24) }.unwrap();
        assert_eq!(bytes.get(0).unwrap(), 0);
        assert_eq!(bytes.get(1).unwrap(), 0xff);
        assert_eq!(bytes.get(8).unwrap(), 0xff);
        assert_eq!(bytes.get(17).unwrap(), 0);
    }

    #[test]
    fn test_slicing_shares_memory() {
        let view = ints(&[0, 1, 2, 3, 4]);
        let slice = view.slice(1, 3).unwrap();
        assert_eq!(slice.to_vec(), [1, 2, 3]);

        slice.set(0, 100).unwrap();
        assert_eq!(view.get(1).unwrap(), 100);

        let inner = slice.slice_from(2).unwrap();
        assert_eq!(inner.to_vec(), [3]);
        assert!(slice.slice_from(3).unwrap().is_empty());
        assert!(slice.slice_from(4).is_err());
        assert!(slice.slice(2, 2).is_err());
    }

    #[test]
    fn test_same_memory() {
        let view = ints(&[1, 2, 3]);
        assert!(view.same_memory(&view.clone()));
        assert!(view.same_memory(&view.slice(0, 3).unwrap()));
        assert!(!view.same_memory(&view.slice(0, 2).unwrap()));
        assert!(!view.same_memory(&view.slice(1, 2).unwrap()));
        assert!(!view.same_memory(&ints(&[1, 2, 3])));
    }

    #[test]
    fn test_get_ref() {
        let view = ints(&[5, 6]);
        let slot = view.get_ref(1).unwrap();
        unsafe { slot.as_ptr().write(60) };
        assert_eq!(view.get(1).unwrap(), 60);
        assert!(view.get_ref(2).is_err());
    }

    #[test]
    fn test_copy_to() {
        let source = ints(&[1, 2]);
        let dest = ints(&[0, 0, 0]);
        source.copy_to(&dest).unwrap();
        assert_eq!(dest.to_vec(), [1, 2, 0]);

        assert_eq!(
            dest.copy_to(&source),
            Err(ViewError::DestinationTooShort {
                required: 3,
                available: 2
            })
        );
        assert!(!dest.try_copy_to(&source));
        assert_eq!(source.to_vec(), [1, 2]);
    }

    #[test]
    fn test_overlapping_copy_with_references() {
        let strings: Vec<String> = ["a", "b", "c", "d"].into_iter().map(String::from).collect();
        let array = TrackedArray::from_vec(strings).unwrap();
        let view = TypedView::<String>::from_array(&array).unwrap();
        view.move_block(0, 3, 1).unwrap();
        assert_eq!(view.to_vec(), ["a", "a", "b", "c"]);

        view.slice(1, 3).unwrap().copy_to(&view).unwrap();
        assert_eq!(view.to_vec(), ["a", "b", "c", "c"]);
    }

    #[test]
    fn test_fill_and_clear() {
        let view = ints(&[1, 2, 3]);
        view.slice(1, 2).unwrap().fill(7);
        assert_eq!(view.to_vec(), [1, 7, 7]);
        view.clear();
        assert_eq!(view.to_vec(), [0, 0, 0]);
    }

    #[test]
    fn test_iter() {
        let view = ints(&[4, 5, 6]);
        let mut iter = view.iter();
        assert_eq!(iter.len(), 3);
        assert_eq!(iter.next(), Some(4));
        assert_eq!(iter.len(), 2);
        let rest: Vec<_> = iter.collect();
        assert_eq!(rest, [5, 6]);

        let mut total = 0;
        for value in &view {
            total += value;
        }
        assert_eq!(total, 15);
    }

    #[test]
    fn test_as_slice() {
        let mut view = ints(&[1, 2, 3]);
        assert!(view.is_aligned());
        assert_eq!(view.byte_len(), 12);
        assert_eq!(unsafe { view.as_slice() }, &[1, 2, 3]);
        unsafe { view.as_mut_slice()[0] = 10 };
        assert_eq!(view.get(0).unwrap(), 10);
    }
}
