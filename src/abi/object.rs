//! Object headers - the common prefix of every emulated object
//!
//! `ob_refcnt` sits at offset 0 and `ob_type` right after it; variable-sized
//! objects add `ob_size`, and their payload follows at a fixed offset.

use super::{Address, PyTypeObject};
use std::ffi::{c_char, c_int, c_long};

/// Fixed object header (`PyObject_HEAD`)
#[repr(C)]
#[derive(Debug)]
pub struct PyObject {
    pub ob_refcnt: isize,
    pub ob_type: *mut PyTypeObject,
}

/// Header of variable-sized objects (`PyObject_VAR_HEAD`)
#[repr(C)]
#[derive(Debug)]
pub struct PyVarObject {
    pub ob_refcnt: isize,
    pub ob_type: *mut PyTypeObject,
    pub ob_size: isize,
}

/// Byte string with inline, NUL-terminated payload starting at `ob_sval`
#[repr(C)]
#[derive(Debug)]
pub struct PyStringObject {
    pub ob_refcnt: isize,
    pub ob_type: *mut PyTypeObject,
    pub ob_size: isize,
    pub ob_shash: c_long,
    pub ob_sstate: c_int,
    pub ob_sval: [c_char; 1],
}

impl PyStringObject {
    /// Offset of the first payload byte
    pub const PAYLOAD_OFFSET: usize = std::mem::offset_of!(PyStringObject, ob_sval);

    /// Bytes needed for a string of `len` bytes plus terminator
    #[inline]
    pub const fn alloc_size(len: usize) -> usize {
        Self::PAYLOAD_OFFSET + len + 1
    }
}

/// Tuple with inline item pointers starting at `ob_item`
#[repr(C)]
#[derive(Debug)]
pub struct PyTupleObject {
    pub ob_refcnt: isize,
    pub ob_type: *mut PyTypeObject,
    pub ob_size: isize,
    pub ob_item: [*mut PyObject; 1],
}

impl PyTupleObject {
    pub const ITEMS_OFFSET: usize = std::mem::offset_of!(PyTupleObject, ob_item);

    #[inline]
    pub const fn alloc_size(len: usize) -> usize {
        Self::ITEMS_OFFSET + len * std::mem::size_of::<*mut PyObject>()
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct PyIntObject {
    pub ob_refcnt: isize,
    pub ob_type: *mut PyTypeObject,
    pub ob_ival: c_long,
}

#[repr(C)]
#[derive(Debug)]
pub struct PyFloatObject {
    pub ob_refcnt: isize,
    pub ob_type: *mut PyTypeObject,
    pub ob_fval: f64,
}

/// Read `ob_refcnt`
///
/// # Safety
/// - `addr` must point to a live object header
#[inline]
pub unsafe fn read_refcnt(addr: Address) -> isize {
    (*addr.as_ptr::<PyObject>()).ob_refcnt
}

/// # Safety
/// - `addr` must point to a live object header
#[inline]
pub unsafe fn write_refcnt(addr: Address, value: isize) {
    (*addr.as_ptr::<PyObject>()).ob_refcnt = value;
}

/// Read `ob_type`
///
/// # Safety
/// - `addr` must point to a live object header
#[inline]
pub unsafe fn read_type(addr: Address) -> Address {
    Address::from_ptr((*addr.as_ptr::<PyObject>()).ob_type)
}

/// # Safety
/// - `addr` must point to a live object header
#[inline]
pub unsafe fn write_type(addr: Address, type_addr: Address) {
    (*addr.as_ptr::<PyObject>()).ob_type = type_addr.as_ptr();
}
