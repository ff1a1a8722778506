//! # tsview runtime type registry
//!
//! Maps each element type used with a view to a dense [`RuntimeTypeId`] and
//! a [`RuntimeTypeInfo`] holding its size, alignment, tracked-array element
//! offset and the dispatch functions used for untyped access.
//!
//! Types are registered lazily on first use. A registered type keeps its id
//! and its descriptor for the lifetime of the registry; the process-wide
//! registry returned by [`TypeRegistry::global`] lives until exit, so
//! descriptors borrowed from it are `'static`.
//!
//! ## Registration
//!
//! ```text
//!   get_or_register::<T>()
//!          |
//!          v
//!   lookup[TypeId::of::<T>()] --hit--> id
//!          | miss
//!          v
//!   lock registration
//!   lookup again          --hit--> id   (another thread won)
//!          | miss
//!          v
//!   infos.push(describe::<T>())  -> index == id
//!   lookup.insert(TypeId, id)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod info;
pub mod store;

pub use info::{RuntimeTypeId, RuntimeTypeInfo};
pub use store::AppendOnlyStore;

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHasher;
use std::any::TypeId;
use std::hash::BuildHasherDefault;
use std::sync::OnceLock;
use tsview_dispatch::Element;

/// Configuration for a [`TypeRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Number of descriptors the registry can hold before it allocates its
    /// second chunk. Rounded up to a power of two and capped at
    /// [`MAX_FIRST_CHUNK_LEN`](store::MAX_FIRST_CHUNK_LEN).
    pub initial_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: store::DEFAULT_FIRST_CHUNK_LEN,
        }
    }
}

type FxDashMap<K, V> = DashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Registry of element types.
pub struct TypeRegistry {
    /// Rust type identity to registry id.
    lookup: FxDashMap<TypeId, RuntimeTypeId>,
    /// Descriptors indexed by id.
    infos: AppendOnlyStore<RuntimeTypeInfo>,
    /// Held while a new type is registered.
    registration: Mutex<()>,
}

impl TypeRegistry {
    /// Create an empty registry with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with the given configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            lookup: FxDashMap::default(),
            infos: AppendOnlyStore::with_first_chunk_len(config.initial_capacity),
            registration: Mutex::new(()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static TypeRegistry {
        static GLOBAL: OnceLock<TypeRegistry> = OnceLock::new();
        GLOBAL.get_or_init(TypeRegistry::new)
    }

    /// The id of `T`, if it has been registered.
    #[inline]
    #[must_use]
    pub fn lookup<T: Element>(&self) -> Option<RuntimeTypeId> {
        self.lookup.get(&TypeId::of::<T>()).map(|entry| *entry)
    }

    /// The id of `T`, registering it on first use.
    ///
    /// Concurrent first calls for the same type all observe the same id.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` types are registered.
    #[inline]
    pub fn get_or_register<T: Element>(&self) -> RuntimeTypeId {
        match self.lookup::<T>() {
            Some(id) => id,
            None => self.register::<T>(),
        }
    }

    #[cold]
    fn register<T: Element>(&self) -> RuntimeTypeId {
        let _guard = self.registration.lock();

        if let Some(id) = self.lookup::<T>() {
            return id;
        }

        debug_assert!(
            T::CONTAINS_REFERENCES || !std::mem::needs_drop::<T>(),
            "{} is declared plain but has drop glue",
            std::any::type_name::<T>()
        );

        let next = self.infos.len();
        let raw = match u32::try_from(next) {
            Ok(raw) => raw,
            Err(_) => panic!("runtime type id space exhausted"),
        };
        let id = RuntimeTypeId::from_raw(raw);
        let index = self.infos.push_with(|_| RuntimeTypeInfo::describe::<T>(id));
        debug_assert_eq!(index, id.index());
        self.lookup.insert(TypeId::of::<T>(), id);

        tracing::debug!(
            id = id.as_u32(),
            type_name = std::any::type_name::<T>(),
            size = std::mem::size_of::<T>(),
            contains_references = T::CONTAINS_REFERENCES,
            "registered element type"
        );
        id
    }

    /// The descriptor for `id`.
    #[inline]
    #[must_use]
    pub fn info(&self, id: RuntimeTypeId) -> Option<&RuntimeTypeInfo> {
        self.infos.get(id.index())
    }

    /// The descriptor for `T`, registering it on first use.
    pub fn info_of<T: Element>(&self) -> &RuntimeTypeInfo {
        let id = self.get_or_register::<T>();
        match self.infos.get(id.index()) {
            Some(info) => info,
            None => unreachable!("registered id {id} has no descriptor"),
        }
    }

    /// Number of registered types.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Check if no types are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Iterate over the registered descriptors in id order.
    pub fn iter(&self) -> impl Iterator<Item = &RuntimeTypeInfo> + '_ {
        self.infos.iter()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.len())
            .finish_non_exhaustive()
    }
}

/// The id of `T` in the process-wide registry.
#[inline]
pub fn id_of<T: Element>() -> RuntimeTypeId {
    TypeRegistry::global().get_or_register::<T>()
}

/// The descriptor for `id` in the process-wide registry.
#[inline]
#[must_use]
pub fn info(id: RuntimeTypeId) -> Option<&'static RuntimeTypeInfo> {
    TypeRegistry::global().info(id)
}

/// The descriptor for `T` in the process-wide registry.
#[inline]
pub fn info_of<T: Element>() -> &'static RuntimeTypeInfo {
    TypeRegistry::global().info_of::<T>()
}
