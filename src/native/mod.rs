//! Native heap model - what lives on the C side of a crossing
//!
//! Design: every payload a slot can point at has an allocator and a
//! matching free that both record into `tally`, so ownership bugs show
//! up as counter mismatches in tests.
//!
//! Architecture:
//! - `slot.rs` - `Argument` (typed slot) and `RawArgument` (C union)
//! - `string.rs` - NUL-terminated strings, filename transcoding
//! - `array.rs` - growable arrays
//! - `list.rs` - singly/doubly linked lists
//! - `hash.rs` - refcounted hash tables
//! - `object.rs` - refcounted object handles
//! - `value.rs` - variant values
//! - `closure.rs` - closures over host callables
//! - `error.rs` - error payloads and cells
//! - `tally.rs` - allocation counters

pub mod array;
pub mod closure;
pub mod error;
pub mod hash;
pub mod list;
pub mod object;
pub mod slot;
pub mod string;
pub mod tally;
pub mod value;

pub use array::NativeArray;
pub use closure::NativeClosure;
pub use error::{error_cell_free, error_cell_new, NativeError};
pub use hash::{DestroyFn, KeyEquality, NativeHashTable};
pub use list::{ListNode, Node, SListNode};
pub use object::{
    typthon_object_new, typthon_object_ref, typthon_object_refcount, typthon_object_unref,
    NativeObject, ObjectRef,
};
pub use slot::{Argument, RawArgument};
pub use tally::HeapKind;
pub use value::{NativeValue, ValueData};
