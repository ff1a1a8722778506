//! Views whose element type is only known at runtime.

use crate::error::{ViewError, ViewResult};
use crate::storage::{check_index, check_range, check_raw, check_start, Storage};
use crate::tracked::TrackedArray;
use crate::typed::{copy_elements, TypedView};
use std::fmt;
use std::iter::FusedIterator;
use std::ptr::{self, NonNull};
use tsview_dispatch::{read_at, read_indirect, write_at, write_indirect, Element, Value};
use tsview_registry::{RuntimeTypeId, RuntimeTypeInfo};

/// A window of `len` elements whose type is described by a
/// [`RuntimeTypeInfo`].
///
/// Elements are read and written as [`Value`]s through the dispatch
/// functions recorded at registration, or as a concrete `T` through the
/// `*_as` methods after a type check.
#[derive(Clone)]
pub struct UntypedView {
    storage: Storage,
    len: usize,
    info: &'static RuntimeTypeInfo,
}

impl UntypedView {
    pub(crate) fn from_storage(storage: Storage, len: usize, info: &'static RuntimeTypeInfo) -> Self {
        Self { storage, len, info }
    }

    /// View every element of `array`, whatever its element type.
    ///
    /// # Errors
    ///
    /// `ArrayShape` if the array is not a zero-based vector.
    pub fn from_array(array: &TrackedArray) -> ViewResult<Self> {
        Self::from_array_range(array, 0, array.len())
    }

    /// View the elements of `array` from `start` to the end.
    ///
    /// # Errors
    ///
    /// `ArrayShape` as for [`from_array`](Self::from_array), `Range` if
    /// `start` is past the end.
    pub fn from_array_start(array: &TrackedArray, start: usize) -> ViewResult<Self> {
        array.expect_vector()?;
        let length = check_start(start, array.len())?;
        Self::from_array_range(array, start, length)
    }

    /// View `length` elements of `array` starting at `start`.
    ///
    /// # Errors
    ///
    /// `ArrayShape` as for [`from_array`](Self::from_array), `Range` if the
    /// range does not fit.
    pub fn from_array_range(array: &TrackedArray, start: usize, length: usize) -> ViewResult<Self> {
        array.expect_vector()?;
        check_range(start, length, array.len())?;

        let info = array.element_info();
        let storage = Storage::Owned {
            array: array.clone(),
            offset: start * info.size(),
        };
        Ok(Self::from_storage(storage, length, info))
    }

    /// View `len` elements of the registered type `type_id` in unmanaged
    /// memory starting at `ptr`.
    ///
    /// # Errors
    ///
    /// `UnknownType` if nothing is registered under `type_id`,
    /// `UnsupportedType` if the type contains references, `NullPointer` if
    /// `ptr` is null and `len` is not, `Range` if the byte length overflows
    /// `isize`.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` initialized elements of the registered type
    /// that stay valid and unmoved for the lifetime of the view and all
    /// views derived from it.
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize, type_id: RuntimeTypeId) -> ViewResult<Self> {
        let info = tsview_registry::info(type_id).ok_or(ViewError::UnknownType(type_id))?;
        if info.contains_references() {
            return Err(ViewError::UnsupportedType {
                type_name: info.type_name(),
            });
        }
        check_raw(ptr, len, info.size())?;

        Ok(Self::from_storage(Storage::Raw { address: ptr }, len, info))
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

    /// Registry id of the element type.
    #[inline]
    #[must_use]
    pub fn type_id(&self) -> RuntimeTypeId {
        self.info.id()
    }

    /// Descriptor of the element type.
    #[inline]
    #[must_use]
    pub fn info(&self) -> &'static RuntimeTypeInfo {
        self.info
    }

    /// Name of the element type.
    #[inline]
    #[must_use]
    pub fn item_type_name(&self) -> &'static str {
        self.info.type_name()
    }

    /// The tracked array backing the view, if any.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> Option<&TrackedArray> {
        self.storage.owner()
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        self.storage.base(self.info.array_offset())
    }

    #[inline]
    fn address(&self, index: usize) -> *mut u8 {
        self.base().wrapping_add(index * self.info.size())
    }

    fn expect_type<T: Element>(&self) -> ViewResult<()> {
        if self.info.is::<T>() {
            Ok(())
        } else {
            Err(ViewError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                found: self.info.type_name(),
            })
        }
    }

    /// Read the element at `index` as a dynamic value.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` if `index >= len`.
    pub fn get(&self, index: usize) -> ViewResult<Value> {
        check_index(index, self.len)?;
        // Safety: bounds checked above.
        Ok(unsafe { self.get_unchecked(index) })
    }

    /// Read the element at `index` without a bounds check.
    ///
    /// # Safety
    ///
    /// `index` must be less than `len`.
    pub unsafe fn get_unchecked(&self, index: usize) -> Value {
        debug_assert!(index < self.len);
        unsafe { read_indirect(self.info.get_fn(), self.address(index)) }
    }

    /// Overwrite the element at `index` with a dynamic value.
    ///
    /// Besides the element type's own variant, values convert only where
    /// the conversion is implicit and widening: a narrower integer into a
    /// wider one of the same signedness, or an unsigned one into a wider
    /// signed one; any integer or `f32` into a float. Narrowing, such as
    /// `Value::I64(255)` into a `u8` element, is a `TypeMismatch` even when
    /// the value would fit.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` if `index >= len`, `TypeMismatch` if the value does
    /// not convert to the element type.
    pub fn set(&self, index: usize, value: Value) -> ViewResult<()> {
        check_index(index, self.len)?;
        // Safety: bounds checked above.
        unsafe { self.set_unchecked(index, value) }
    }

    /// Overwrite the element at `index` without a bounds check.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if the value does not convert to the element type.
    ///
    /// # Safety
    ///
    /// `index` must be less than `len`.
    pub unsafe fn set_unchecked(&self, index: usize, value: Value) -> ViewResult<()> {
        debug_assert!(index < self.len);
        unsafe { write_indirect(self.info.set_fn(), self.address(index), value) }.map_err(|rejected| {
            ViewError::TypeMismatch {
                expected: self.info.type_name(),
                found: rejected.kind_name(),
            }
        })
    }

    /// Read the element at `index` as a `T`.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if the elements are not `T`, `IndexOutOfRange` if
    /// `index >= len`.
    pub fn get_as<T: Element>(&self, index: usize) -> ViewResult<T> {
        self.expect_type::<T>()?;
        check_index(index, self.len)?;
        // Safety: type and bounds checked above.
        Ok(unsafe { read_at::<T>(self.address(index)) })
    }

    /// Overwrite the element at `index` with a `T`.
    ///
    /// # Errors
    ///
    /// As [`get_as`](Self::get_as).
    pub fn set_as<T: Element>(&self, index: usize, value: T) -> ViewResult<()> {
        self.expect_type::<T>()?;
        check_index(index, self.len)?;
        // Safety: type and bounds checked above.
        unsafe { write_at::<T>(self.address(index), value) };
        Ok(())
    }

    /// Pointer to the slot at `index`, typed as `T`.
    ///
    /// # Errors
    ///
    /// As [`get_as`](Self::get_as).
    pub fn get_ref_as<T: Element>(&self, index: usize) -> ViewResult<NonNull<T>> {
        self.expect_type::<T>()?;
        Ok(self.get_ref(index)?.cast::<T>())
    }

    /// Pointer to the first byte of the slot at `index`.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` if `index >= len`.
    pub fn get_ref(&self, index: usize) -> ViewResult<NonNull<u8>> {
        check_index(index, self.len)?;
        // Safety: bounds checked above.
        Ok(unsafe { self.get_ref_unchecked(index) })
    }

    /// Pointer to the slot at `index` without a bounds check.
    ///
    /// # Safety
    ///
    /// `index` must be less than `len`.
    pub unsafe fn get_ref_unchecked(&self, index: usize) -> NonNull<u8> {
        debug_assert!(index < self.len);
        // Safety: in-bounds slots of a valid view are never null.
        unsafe { NonNull::new_unchecked(self.address(index)) }
    }

    /// The same elements as a [`TypedView`].
    ///
    /// # Errors
    ///
    /// `TypeMismatch` unless the elements are `T`.
    pub fn as_typed<T: Element>(&self) -> ViewResult<TypedView<T>> {
        self.expect_type::<T>()?;
        Ok(TypedView::from_storage(
            self.storage.clone(),
            self.len,
            self.info.id(),
        ))
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
        let storage = self.storage.advance(start * self.info.size());
        Ok(Self::from_storage(storage, length, self.info))
    }

    /// Whether both views describe exactly the same elements.
    #[must_use]
    pub fn same_memory(&self, other: &Self) -> bool {
        self.len == other.len
            && self.info.id() == other.info.id()
            && self.storage.same_start(&other.storage)
    }

    /// Copy every element into the front of `dest`.
    ///
    /// The views may overlap.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if the element types differ, `DestinationTooShort` if
    /// `dest` has fewer elements than `self`.
    pub fn copy_to(&self, dest: &UntypedView) -> ViewResult<()> {
        if self.info.id() != dest.info.id() {
            return Err(ViewError::TypeMismatch {
                expected: dest.item_type_name(),
                found: self.item_type_name(),
            });
        }
        if dest.len < self.len {
            return Err(ViewError::DestinationTooShort {
                required: self.len,
                available: dest.len,
            });
        }
        // Safety: same element type, both ranges in bounds.
        unsafe { self.copy_block(self.base(), dest.base(), self.len) }
    }

    /// Like [`copy_to`](Self::copy_to), returning `false` instead of an
    /// error.
    pub fn try_copy_to(&self, dest: &UntypedView) -> bool {
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
        unsafe { self.copy_block(self.address(start), self.address(destination), length) }
    }

    /// Copy `len` elements of this view's type, allowing overlap.
    ///
    /// # Safety
    ///
    /// Both ranges must hold `len` elements of this view's type.
    unsafe fn copy_block(&self, src: *const u8, dst: *mut u8, len: usize) -> ViewResult<()> {
        if len == 0 || ptr::eq(src, dst) {
            return Ok(());
        }
        let size = self.info.size();
        if !self.info.contains_references() {
            unsafe { ptr::copy(src, dst, len * size) };
            return Ok(());
        }

        let get = self.info.get_fn();
        let set = self.info.set_fn();
        let staged: Vec<Value> = (0..len)
            .map(|i| unsafe { read_indirect(get, src.add(i * size)) })
            .collect();
        for (i, value) in staged.into_iter().enumerate() {
            unsafe { write_indirect(set, dst.add(i * size), value) }.map_err(|rejected| {
                ViewError::TypeMismatch {
                    expected: self.info.type_name(),
                    found: rejected.kind_name(),
                }
            })?;
        }
        Ok(())
    }

    /// Read every element as a dynamic value.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.iter().collect()
    }

    /// Iterate over the elements as dynamic values.
    #[inline]
    pub fn iter(&self) -> UntypedIter<'_> {
        UntypedIter {
            view: self,
            index: 0,
        }
    }

    /// Address of the first element.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.base()
    }

    /// Mutable address of the first element.
    #[inline]
    #[must_use]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.base()
    }

    /// Size of the viewed memory in bytes.
    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.len * self.info.size()
    }

    /// Whether the first element is aligned for the element type.
    #[inline]
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        self.len == 0 || tsview_dispatch::is_aligned(self.base(), self.info.align())
    }
}

impl UntypedView {
    /// Copy into a typed destination of the same element type.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if the elements are not `T`, `DestinationTooShort` if
    /// `dest` is shorter than `self`.
    pub fn copy_to_typed<T: Element>(&self, dest: &TypedView<T>) -> ViewResult<()> {
        self.expect_type::<T>()?;
        if dest.len() < self.len {
            return Err(ViewError::DestinationTooShort {
                required: self.len,
                available: dest.len(),
            });
        }
        // Safety: same element type, both ranges in bounds.
        unsafe { copy_elements::<T>(self.base(), dest.as_mut_ptr().cast::<u8>(), self.len) };
        Ok(())
    }
}

impl fmt::Display for UntypedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UntypedView[{}] of {}", self.len, self.info.type_name())
    }
}

impl fmt::Debug for UntypedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UntypedView")
            .field("type", &self.info.type_name())
            .field("type_id", &self.info.id())
            .field("len", &self.len)
            .field("raw", &self.is_raw())
            .field("address", &self.as_ptr())
            .finish()
    }
}

/// Iterator over the elements of an [`UntypedView`] as dynamic values.
pub struct UntypedIter<'a> {
    view: &'a UntypedView,
    index: usize,
}

impl Iterator for UntypedIter<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if self.index >= self.view.len {
            return None;
        }
        // Safety: `index < len`.
        let value = unsafe { self.view.get_unchecked(self.index) };
        self.index += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.view.len - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for UntypedIter<'_> {}

impl FusedIterator for UntypedIter<'_> {}

impl<'a> IntoIterator for &'a UntypedView {
    type Item = Value;
    type IntoIter = UntypedIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
