//! Unmanaged object model - objects as native code sees them
//!
//! Design: Every object lives in a block from the runtime's allocator and
//! starts with the reference ABI header. Operations are methods on `Runtime`
//! because they need its allocator, its builtin types and its bridge:
//! 1. `types` - readiness and slot inheritance, generic alloc/new, builtin types
//! 2. `refcount` - incref/decref and the dealloc/free chain
//! 3. `string` / `tuple` - variable-sized layouts
//! 4. `marshal` - host value <-> native object conversion

mod marshal;
mod refcount;
mod string;
mod tuple;
mod types;


pub use string::{latin1_decode, latin1_encode};
pub use types::{ready_type, BuiltinTypes, TypeRoots};

pub(crate) use string::payload as string_payload;
