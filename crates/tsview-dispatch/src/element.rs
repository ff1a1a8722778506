//! The element contract.
//!
//! Every type stored in a view implements [`Element`]. The trait carries the
//! two facts the view layer needs about a type beyond its size: whether it
//! contains references (and so must stay inside a tracked array), and how it
//! converts to and from a dynamic [`Value`].

use crate::value::Value;
use std::sync::Arc;

/// Marker trait for types that can live in a view.
///
/// # Safety
///
/// If `CONTAINS_REFERENCES` is `false` the implementor must be plain data:
/// - valid to duplicate with a bitwise copy (`ptr::read_unaligned`)
/// - free of drop glue
/// - free of pointers whose referents must be kept alive by their owner
///
/// Such types may be viewed over raw memory at any alignment. Types that set
/// the flag are only ever accessed in place inside a tracked array, through
/// properly aligned references.
pub unsafe trait Element: Clone + Send + Sync + 'static {
    /// Whether the type is, or transitively contains, an owning reference.
    const CONTAINS_REFERENCES: bool;

    /// Convert into a dynamic value.
    #[inline]
    fn into_value(self) -> Value {
        Value::other(self)
    }

    /// Convert from a dynamic value, handing it back if incompatible.
    ///
    /// # Errors
    ///
    /// Returns the original value when it does not hold a `Self`.
    #[inline]
    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Other(other) => other.downcast::<Self>().map_err(Value::Other),
            value => Err(value),
        }
    }
}

/// Whether `T` is, or transitively contains, an owning reference.
#[inline]
#[must_use]
pub const fn contains_references<T: Element>() -> bool {
    T::CONTAINS_REFERENCES
}

/// Implement [`Element`] for plain-data `Copy` types.
///
/// The types are never reference-containing, so views over raw memory
/// accept them.
///
/// ```
/// use tsview_dispatch::{plain_element, Element};
///
/// #[derive(Clone, Copy)]
/// #[repr(C)]
/// struct Tick {
///     price: f64,
///     volume: u32,
/// }
///
/// plain_element!(Tick);
/// assert!(!Tick::CONTAINS_REFERENCES);
/// ```
#[macro_export]
macro_rules! plain_element {
    ($($ty:ty),+ $(,)?) => {$(
        const _: () = {
            #[allow(dead_code)]
            fn assert_copy<T: ::core::marker::Copy>() {}
            #[allow(dead_code)]
            fn check() {
                assert_copy::<$ty>();
            }
        };

        unsafe impl $crate::Element for $ty {
            const CONTAINS_REFERENCES: bool = false;
        }
    )+};
}

/// Numeric elements accept their own variant plus every variant that
/// converts to them implicitly: integers widen without loss, and any integer
/// or `f32` widens to a float.
macro_rules! int_element {
    ($($ty:ty => $variant:ident [$($from:ident),*]),* $(,)?) => {$(
        unsafe impl Element for $ty {
            const CONTAINS_REFERENCES: bool = false;

            #[inline]
            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            #[inline]
            fn from_value(value: Value) -> Result<Self, Value> {
                match value {
                    Value::$variant(v) => Ok(v),
                    $(Value::$from(v) => Ok(<$ty>::from(v)),)*
                    value => Err(value),
                }
            }
        }
    )*};
}

int_element! {
    i8 => I8 [],
    i16 => I16 [I8, U8],
    i32 => I32 [I8, I16, U8, U16],
    i64 => I64 [I8, I16, I32, U8, U16, U32],
    isize => Isize [I8, I16, U8],
    u8 => U8 [],
    u16 => U16 [U8],
    u32 => U32 [U8, U16],
    u64 => U64 [U8, U16, U32],
    usize => Usize [U8, U16],
}

macro_rules! float_element {
    ($($ty:ty => $variant:ident [$($exact:ident),*]),* $(,)?) => {$(
        unsafe impl Element for $ty {
            const CONTAINS_REFERENCES: bool = false;

            #[inline]
            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            #[inline]
            #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
            fn from_value(value: Value) -> Result<Self, Value> {
                match value {
                    Value::$variant(v) => Ok(v),
                    $(Value::$exact(v) => Ok(<$ty>::from(v)),)*
                    Value::I8(v) => Ok(v as $ty),
                    Value::I16(v) => Ok(v as $ty),
                    Value::I32(v) => Ok(v as $ty),
                    Value::I64(v) => Ok(v as $ty),
                    Value::Isize(v) => Ok(v as $ty),
                    Value::U8(v) => Ok(v as $ty),
                    Value::U16(v) => Ok(v as $ty),
                    Value::U32(v) => Ok(v as $ty),
                    Value::U64(v) => Ok(v as $ty),
                    Value::Usize(v) => Ok(v as $ty),
                    value => Err(value),
                }
            }
        }
    )*};
}

float_element! {
    f32 => F32 [],
    f64 => F64 [F32],
}

macro_rules! exact_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        unsafe impl Element for $ty {
            const CONTAINS_REFERENCES: bool = false;

            #[inline]
            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            #[inline]
            fn from_value(value: Value) -> Result<Self, Value> {
                match value {
                    Value::$variant(v) => Ok(v),
                    value => Err(value),
                }
            }
        }
    )*};
}

exact_element! {
    bool => Bool,
    char => Char,
}

unsafe impl Element for () {
    const CONTAINS_REFERENCES: bool = false;

    #[inline]
    fn into_value(self) -> Value {
        Value::Unit
    }

    #[inline]
    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Unit => Ok(()),
            value => Err(value),
        }
    }
}

unsafe impl Element for i128 {
    const CONTAINS_REFERENCES: bool = false;
}

unsafe impl Element for u128 {
    const CONTAINS_REFERENCES: bool = false;
}

// Owning references.

unsafe impl Element for String {
    const CONTAINS_REFERENCES: bool = true;
}

unsafe impl<T: Element> Element for Box<T> {
    const CONTAINS_REFERENCES: bool = true;
}

unsafe impl<T: Element> Element for Vec<T> {
    const CONTAINS_REFERENCES: bool = true;
}

unsafe impl<T: ?Sized + Send + Sync + 'static> Element for Arc<T> {
    const CONTAINS_REFERENCES: bool = true;
}

// Composites inherit from their components. `Option` unwraps one level.

unsafe impl<T: Element> Element for Option<T> {
    const CONTAINS_REFERENCES: bool = T::CONTAINS_REFERENCES;
}

unsafe impl<T: Element, const N: usize> Element for [T; N] {
    const CONTAINS_REFERENCES: bool = T::CONTAINS_REFERENCES;
}

unsafe impl<A: Element> Element for (A,) {
    const CONTAINS_REFERENCES: bool = A::CONTAINS_REFERENCES;
}

unsafe impl<A: Element, B: Element> Element for (A, B) {
    const CONTAINS_REFERENCES: bool = A::CONTAINS_REFERENCES || B::CONTAINS_REFERENCES;
}

unsafe impl<A: Element, B: Element, C: Element> Element for (A, B, C) {
    const CONTAINS_REFERENCES: bool =
        A::CONTAINS_REFERENCES || B::CONTAINS_REFERENCES || C::CONTAINS_REFERENCES;
}

unsafe impl<A: Element, B: Element, C: Element, D: Element> Element for (A, B, C, D) {
    const CONTAINS_REFERENCES: bool = A::CONTAINS_REFERENCES
        || B::CONTAINS_REFERENCES
        || C::CONTAINS_REFERENCES
        || D::CONTAINS_REFERENCES;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    #[repr(C)]
    struct Quote {
        bid: f64,
        ask: f64,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Side {
        Buy,
        Sell,
    }

    plain_element!(Quote, Side);

    #[test]
    fn test_primitives_are_plain() {
        assert!(!contains_references::<i32>());
        assert!(!contains_references::<f64>());
        assert!(!contains_references::<bool>());
        assert!(!contains_references::<char>());
        assert!(!contains_references::<u128>());
    }

    #[test]
    fn test_owning_types_contain_references() {
        assert!(contains_references::<String>());
        assert!(contains_references::<Box<u8>>());
        assert!(contains_references::<Vec<u8>>());
        assert!(contains_references::<Arc<str>>());
    }

    #[test]
    fn test_option_unwraps_one_level() {
        assert!(!contains_references::<Option<i64>>());
        assert!(contains_references::<Option<String>>());
        assert!(contains_references::<Option<Option<Box<u8>>>>());
    }

    #[test]
    fn test_composites_are_transitive() {
        assert!(!contains_references::<[u32; 4]>());
        assert!(contains_references::<[String; 2]>());
        assert!(!contains_references::<(i32, f64, Quote)>());
        assert!(contains_references::<(i32, Vec<u8>)>());
        assert!(contains_references::<(u8, u8, u8, Option<String>)>());
    }

    #[test]
    fn test_user_types() {
        assert!(!contains_references::<Quote>());
        assert!(!contains_references::<Side>());
        assert!(!contains_references::<Option<Side>>());
    }

    #[test]
    fn test_integer_values_only_widen() {
        assert_eq!(i32::from_value(Value::U8(123)).unwrap(), 123);
        assert_eq!(i64::from_value(Value::U32(u32::MAX)).unwrap(), i64::from(u32::MAX));
        assert_eq!(u64::from_value(Value::U16(7)).unwrap(), 7);
        assert!(u8::from_value(Value::I64(255)).is_err());
        assert!(i32::from_value(Value::I64(1)).is_err());
        assert!(u32::from_value(Value::I8(1)).is_err());
        assert!(i32::from_value(Value::U32(1)).is_err());
        assert!(i32::from_value(Value::F64(1.0)).is_err());
    }

    #[test]
    fn test_float_values() {
        assert_eq!(f64::from_value(Value::F32(1.5)).unwrap(), 1.5);
        assert_eq!(f64::from_value(Value::I32(1)).unwrap(), 1.0);
        assert_eq!(f64::from_value(Value::U64(3)).unwrap(), 3.0);
        assert_eq!(f32::from_value(Value::I16(-2)).unwrap(), -2.0);
        assert!(f32::from_value(Value::F64(1.5)).is_err());
        assert!(f64::from_value(Value::Bool(true)).is_err());
    }

    #[test]
    fn test_boxed_values() {
        let q = Quote { bid: 1.0, ask: 2.0 };
        let value = q.into_value();
        assert_eq!(value.kind_name(), std::any::type_name::<Quote>());
        assert_eq!(Quote::from_value(value).unwrap(), q);

        let rejected = Side::from_value(Value::other(String::from("buy"))).unwrap_err();
        assert_eq!(String::from_value(rejected).unwrap(), "buy");
        assert_eq!(Side::from_value(Side::Sell.into_value()).unwrap(), Side::Sell);
        assert_ne!(Side::Buy, Side::Sell);
    }
}
