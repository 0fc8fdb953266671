//! Typthon extension bridge
//!
//! Loads extension modules compiled against the CPython 2.5 C API into a
//! managed host object model. Native code sees byte-exact object headers in
//! unmanaged memory; the host sees ordinary classes, functions and values.

// Core modules
pub mod abi;
pub mod allocator;
pub mod bridge;
pub mod capi;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod logging;
pub mod objects;
pub mod runtime;

// Re-export commonly used items
pub use abi::{Address, MethodFlags, PyMethodDef, PyObject, PyTypeObject, TypeFlags};
pub use allocator::{Allocator, AllocatorStats, HeapAllocator};
pub use bridge::{Ownership, PtrMap, Strength, SweepStats};
pub use config::{RuntimeConfig, SweepPolicy};
pub use dispatch::{CallingConvention, DispatchTable, Dispatcher, NativeEntry};
pub use error::{Error, NativeError, Result};
pub use host::{HostFunction, HostObject, HostValue, Kwargs};
pub use runtime::{Runtime, RuntimeGuard};
