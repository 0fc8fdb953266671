//! Method descriptors - `PyMethodDef` tables terminated by a NULL name

use super::PyObject;
use std::ffi::{c_char, c_int};

pub type PyCFunction = unsafe extern "C" fn(*mut PyObject, *mut PyObject) -> *mut PyObject;
pub type PyCFunctionWithKeywords =
    unsafe extern "C" fn(*mut PyObject, *mut PyObject, *mut PyObject) -> *mut PyObject;

bitflags::bitflags! {
    /// `ml_flags` bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodFlags: c_int {
        const VARARGS = 0x0001;
        const KEYWORDS = 0x0002;
        const NOARGS = 0x0004;
        const O = 0x0008;
        const CLASS = 0x0010;
        const STATIC = 0x0020;
        const COEXIST = 0x0040;
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PyMethodDef {
    pub ml_name: *const c_char,
    /// Keyword functions are stored here cast to `PyCFunction`, as in C
    pub ml_meth: Option<PyCFunction>,
    pub ml_flags: c_int,
    pub ml_doc: *const c_char,
}

impl PyMethodDef {
    /// Table terminator
    pub const SENTINEL: Self = Self {
        ml_name: std::ptr::null(),
        ml_meth: None,
        ml_flags: 0,
        ml_doc: std::ptr::null(),
    };

    pub const fn new(
        name: *const c_char,
        meth: PyCFunction,
        flags: MethodFlags,
        doc: *const c_char,
    ) -> Self {
        Self { ml_name: name, ml_meth: Some(meth), ml_flags: flags.bits(), ml_doc: doc }
    }

    pub fn with_keywords(
        name: *const c_char,
        meth: PyCFunctionWithKeywords,
        doc: *const c_char,
    ) -> Self {
        // SAFETY: both are plain C function pointers; the dispatcher casts back
        // to the three-argument signature only for keyword conventions.
        let meth = unsafe { std::mem::transmute::<PyCFunctionWithKeywords, PyCFunction>(meth) };
        Self {
            ml_name: name,
            ml_meth: Some(meth),
            ml_flags: (MethodFlags::VARARGS | MethodFlags::KEYWORDS).bits(),
            ml_doc: doc,
        }
    }

    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.ml_name.is_null()
    }
}
