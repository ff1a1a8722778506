//! # tsview indirect dispatch
//!
//! Low-level primitives shared by the typed and untyped views:
//!
//! - **Element contract**: [`Element`] says whether a type contains owning
//!   references and how it converts to a dynamic [`Value`].
//! - **Array layout**: [`ArrayHeader`] and [`array_element_offset`] describe
//!   where the first element of a tracked array lives.
//! - **Indirect access**: [`read_at`] / [`write_at`] load and store one element
//!   at a computed address; [`get_fn`] / [`set_fn`] / [`drop_fn`] produce
//!   function pointers specialised for a type that can be stored once and
//!   called later without compile-time knowledge of that type.
//!
//! ## Access model
//!
//! ```text
//!   typed path                       untyped path
//!   ----------                       ------------
//!   read_at::<T>(addr) -> T          (info.get)(addr) -> Value
//!         |                                |
//!         |    monomorphised at            |  fn pointer taken once
//!         |    the call site               |  at registration
//!         v                                v
//!   +---------------------------------------------------------+
//!   | plain T:     ptr::read_unaligned / ptr::write_unaligned  |
//!   | T with refs: aligned clone / assignment (tracked arrays) |
//!   +---------------------------------------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod element;
pub mod header;
pub mod value;

pub use element::{contains_references, Element};
pub use header::{array_element_offset, array_layout, ArrayHeader, ArrayShape};
pub use value::{OtherValue, Value};

use std::ptr;

/// Reads the element at an address into a dynamic value.
pub type GetFn = unsafe fn(*const u8) -> Value;

/// Writes a dynamic value into the element at an address. Hands the value
/// back if it is not convertible to the element type.
pub type SetFn = unsafe fn(*mut u8, Value) -> Result<(), Value>;

/// Drops a run of elements in place.
pub type DropFn = unsafe fn(*mut u8, usize);

/// Load one element from `address`.
///
/// # Safety
///
/// `address` must point to an initialized `T`. If `T` contains references the
/// address must also be aligned for `T`.
#[inline]
pub unsafe fn read_at<T: Element>(address: *const u8) -> T {
    if T::CONTAINS_REFERENCES {
        debug_assert!(is_aligned(address, std::mem::align_of::<T>()));
        unsafe { (*address.cast::<T>()).clone() }
    } else {
        unsafe { ptr::read_unaligned(address.cast::<T>()) }
    }
}

/// Store one element at `address`, dropping the previous value.
///
/// # Safety
///
/// Same requirements as [`read_at`], and the caller must have exclusive
/// access to the slot for the duration of the call.
#[inline]
pub unsafe fn write_at<T: Element>(address: *mut u8, value: T) {
    if T::CONTAINS_REFERENCES {
        debug_assert!(is_aligned(address, std::mem::align_of::<T>()));
        unsafe { *address.cast::<T>() = value }
    } else {
        unsafe { ptr::write_unaligned(address.cast::<T>(), value) }
    }
}

unsafe fn get_erased<T: Element>(address: *const u8) -> Value {
    unsafe { read_at::<T>(address) }.into_value()
}

unsafe fn set_erased<T: Element>(address: *mut u8, value: Value) -> Result<(), Value> {
    let value = T::from_value(value)?;
    unsafe { write_at::<T>(address, value) };
    Ok(())
}

unsafe fn drop_erased<T>(data: *mut u8, len: usize) {
    unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(data.cast::<T>(), len)) }
}

/// Getter specialised for `T`.
#[inline]
#[must_use]
pub fn get_fn<T: Element>() -> GetFn {
    get_erased::<T>
}

/// Setter specialised for `T`.
#[inline]
#[must_use]
pub fn set_fn<T: Element>() -> SetFn {
    set_erased::<T>
}

/// Drop glue specialised for `T`.
#[inline]
#[must_use]
pub fn drop_fn<T>() -> DropFn {
    drop_erased::<T>
}

/// Read the element at `address` through a previously obtained getter.
///
/// # Safety
///
/// `get` must have been produced by [`get_fn`] for the type actually stored
/// at `address`, and the requirements of [`read_at`] apply.
#[inline]
pub unsafe fn read_indirect(get: GetFn, address: *const u8) -> Value {
    unsafe { get(address) }
}

/// Write `value` at `address` through a previously obtained setter.
///
/// # Safety
///
/// `set` must have been produced by [`set_fn`] for the type actually stored
/// at `address`, and the requirements of [`write_at`] apply.
///
/// # Errors
///
/// Returns the value unchanged if it does not convert to the element type.
#[inline]
pub unsafe fn write_indirect(set: SetFn, address: *mut u8, value: Value) -> Result<(), Value> {
    unsafe { set(address, value) }
}

/// Round `size` up to a multiple of `align`.
#[inline]
#[must_use]
pub const fn align_up(size: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (size + align - 1) & !(align - 1)
}

/// Check whether a pointer is aligned to `align` bytes.
#[inline]
#[must_use]
pub fn is_aligned(ptr: *const u8, align: usize) -> bool {
    debug_assert!(align.is_power_of_two());
    (ptr as usize) & (align - 1) == 0
}
