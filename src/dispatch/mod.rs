//! Dispatch bridge - host calls into native function pointers
//!
//! Design: Method tables and type descriptors are turned into host functions
//! and classes. Each generated shim is a closure over a qualified key; the key
//! selects a typed entry in the dispatch table, so no code is emitted at runtime:
//! 1. `convention` - classify `ml_flags`; unsupported combinations are skipped
//! 2. `table` - qualified name -> `NativeEntry`
//! 3. `dispatcher` - the per-call protocol (marshal, call, error check, cleanup)
//! 4. `module` / `class` - `Py_InitModule4`, `PyModule_AddObject`, type -> class

mod class;
mod convention;
mod dispatcher;
mod module;
mod table;


pub use convention::CallingConvention;
pub use dispatcher::Dispatcher;
pub use module::Receiver;
pub use table::{DispatchTable, NativeEntry};
