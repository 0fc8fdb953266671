//! Pointer-object bridge - the bidirectional address/host-object map
//!
//! Design: Two binding regimes over one map:
//! 1. Owned - the map holds the host object; native code never decides its lifetime
//! 2. Bridged - the host owns the object; while the native refcount says native
//!    code holds extra references, the map pins it in a strong set
//!
//! Architecture:
//! - `handle.rs` - capabilities the map needs from host handles
//! - `map.rs` - `PtrMap`, its sweep and snapshot iteration

mod handle;
mod map;


pub use handle::{HostRef, WeakHandle};
pub use map::{Ownership, PtrMap, Strength, SweepStats};
