//! Reference ABI - byte-exact layouts of the emulated C object model
//!
//! Design: Every struct is `#[repr(C)]` with the field order of the CPython 2.5
//! headers, because extension code compiled against those headers reads and
//! writes the fields directly:
//! 1. `object` - common header plus the variable-sized string/tuple layouts
//! 2. `typeobject` - the type descriptor and its behavior slots
//! 3. `method` - method descriptor tables
//!
//! Offsets are pinned by tests for LP64 targets.

mod object;
mod typeobject;
mod method;

#[cfg(test)]
mod tests;

pub use object::{
    read_refcnt, read_type, write_refcnt, write_type, PyFloatObject, PyIntObject, PyObject,
    PyStringObject, PyTupleObject, PyVarObject,
};
pub use typeobject::{
    AllocFunc, Destructor, FreeFunc, GetIterFunc, InitProc, IterNextFunc, NewFunc, OpaqueFn,
    PrintFunc, PyTypeObject, ReprFunc, TernaryFunc, TypeFlags,
};
pub use method::{MethodFlags, PyCFunction, PyCFunctionWithKeywords, PyMethodDef};

use std::ffi::{c_char, CStr};
use std::fmt;

/// Address in the emulated unmanaged address space
///
/// Plain integer so it can cross threads and key hash maps; converting back to a
/// pointer is the caller's (unsafe) business.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(usize);

impl Address {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    /// Address `bytes` past this one
    #[inline]
    pub const fn offset(self, bytes: usize) -> Self {
        Self(self.0 + bytes)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl<T> From<*mut T> for Address {
    fn from(ptr: *mut T) -> Self {
        Self::from_ptr(ptr)
    }
}

/// Read a NUL-terminated C string, `None` for NULL
///
/// # Safety
/// - `ptr` must be NULL or point to a NUL-terminated buffer
pub unsafe fn read_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}
