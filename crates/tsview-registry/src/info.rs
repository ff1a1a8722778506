//! Per-type runtime descriptors.

use std::any::TypeId;
use std::fmt;
use tsview_dispatch::{array_element_offset, drop_fn, get_fn, set_fn, DropFn, Element, GetFn, SetFn};

/// Dense integer id of a registered element type.
///
/// Ids are assigned in registration order starting at zero and are never
/// reused within a registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeTypeId(u32);

impl RuntimeTypeId {
    /// Rebuild an id from its raw value, e.g. a tracked array's type tag.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Position in the registry's store.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RuntimeTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything the view layer needs to handle an element type it only knows
/// by id.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeTypeInfo {
    id: RuntimeTypeId,
    type_id: TypeId,
    type_name: &'static str,
    size: usize,
    align: usize,
    array_offset: usize,
    contains_references: bool,
    get: GetFn,
    set: SetFn,
    drop: DropFn,
}

impl RuntimeTypeInfo {
    /// Describe `T` under the given id.
    pub(crate) fn describe<T: Element>(id: RuntimeTypeId) -> Self {
        Self {
            id,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            array_offset: array_element_offset::<T>(),
            contains_references: T::CONTAINS_REFERENCES,
            get: get_fn::<T>(),
            set: set_fn::<T>(),
            drop: drop_fn::<T>(),
        }
    }

    /// Registry id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> RuntimeTypeId {
        self.id
    }

    /// Rust type identity.
    #[inline]
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name, for diagnostics.
    #[inline]
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Element size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Element alignment in bytes.
    #[inline]
    #[must_use]
    pub const fn align(&self) -> usize {
        self.align
    }

    /// Distance from a tracked array's identity to its first element.
    #[inline]
    #[must_use]
    pub const fn array_offset(&self) -> usize {
        self.array_offset
    }

    /// Whether the type contains owning references.
    #[inline]
    #[must_use]
    pub const fn contains_references(&self) -> bool {
        self.contains_references
    }

    /// Dynamic getter.
    #[inline]
    #[must_use]
    pub const fn get_fn(&self) -> GetFn {
        self.get
    }

    /// Dynamic setter.
    #[inline]
    #[must_use]
    pub const fn set_fn(&self) -> SetFn {
        self.set
    }

    /// Drop glue for a run of elements.
    #[inline]
    #[must_use]
    pub const fn drop_fn(&self) -> DropFn {
        self.drop
    }

    /// Whether this describes `T`.
    #[inline]
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Display for RuntimeTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.type_name)
    }
}
