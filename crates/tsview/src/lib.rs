//! # tsview
//!
//! Typed and type-erased views over contiguous memory, shared by the native
//! bindings of the time-series store.
//!
//! A view is a window of `len` elements over one of two kinds of storage:
//!
//! - a [`TrackedArray`]: reference-counted, owns its elements, and may hold
//!   element types containing references (`String`, `Box<T>`, ...)
//! - raw memory handed over by a foreign allocator: plain data only, any
//!   alignment
//!
//! The same indexing, slicing and bulk-copy code serves both.
//! [`TypedView<T>`] knows its element type at compile time and reads and
//! writes `T` directly. [`UntypedView`] carries a runtime type id and goes
//! through the dispatch functions stored in the type registry, exchanging
//! elements as [`Value`]s. The two convert into each other without copying.
//!
//! ```
//! use tsview::{TrackedArray, TypedView, Value};
//!
//! let array = TrackedArray::from_vec(vec![1i32, 2, 3, 4, 5])?;
//! let view = TypedView::<i32>::from_array(&array)?;
//!
//! view.move_block(0, 3, 2)?;
//! assert_eq!(view.to_vec(), [1, 2, 1, 2, 3]);
//!
//! let erased = view.slice(1, 2)?.as_untyped();
//! assert_eq!(erased.get(0)?, Value::I32(2));
//! erased.set(1, Value::U8(9))?;
//! assert_eq!(view.get(2)?, 9);
//! # Ok::<(), tsview::ViewError>(())
//! ```
//!
//! ## Threading
//!
//! Views alias and mutate element memory without synchronisation, so a
//! tracked array and every view over it stay on the thread that created
//! them. The type registry is shared by all threads.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
mod storage;
pub mod tracked;
pub mod typed;
pub mod untyped;

pub use error::{ErrorKind, ViewError, ViewResult};
pub use tracked::TrackedArray;
pub use typed::{Iter, TypedView};
pub use untyped::{UntypedIter, UntypedView};

pub use tsview_dispatch::{contains_references, plain_element, ArrayShape, Element, OtherValue, Value};
pub use tsview_registry::{id_of, info, info_of, RegistryConfig, RuntimeTypeId, RuntimeTypeInfo, TypeRegistry};
