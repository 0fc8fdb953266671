//! Type descriptor - `PyTypeObject` as laid out by CPython 2.5

use super::{PyMethodDef, PyObject};
use std::ffi::{c_char, c_int, c_long, c_void};

pub type Destructor = unsafe extern "C" fn(*mut PyObject);
pub type FreeFunc = unsafe extern "C" fn(*mut c_void);
pub type PrintFunc = unsafe extern "C" fn(*mut PyObject, *mut c_void, c_int) -> c_int;
pub type ReprFunc = unsafe extern "C" fn(*mut PyObject) -> *mut PyObject;
pub type TernaryFunc =
    unsafe extern "C" fn(*mut PyObject, *mut PyObject, *mut PyObject) -> *mut PyObject;
pub type GetIterFunc = unsafe extern "C" fn(*mut PyObject) -> *mut PyObject;
pub type IterNextFunc = unsafe extern "C" fn(*mut PyObject) -> *mut PyObject;
pub type InitProc = unsafe extern "C" fn(*mut PyObject, *mut PyObject, *mut PyObject) -> c_int;
pub type AllocFunc = unsafe extern "C" fn(*mut PyTypeObject, isize) -> *mut PyObject;
pub type NewFunc =
    unsafe extern "C" fn(*mut PyTypeObject, *mut PyObject, *mut PyObject) -> *mut PyObject;

/// Slot the bridge never calls; kept only so later fields land at the right offset
pub type OpaqueFn = Option<unsafe extern "C" fn()>;

bitflags::bitflags! {
    /// `tp_flags` bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeFlags: c_long {
        const HAVE_GETCHARBUFFER = 1 << 0;
        const HAVE_SEQUENCE_IN = 1 << 1;
        const GC = 1 << 2;
        const HAVE_INPLACEOPS = 1 << 3;
        const CHECKTYPES = 1 << 4;
        const HAVE_RICHCOMPARE = 1 << 5;
        const HAVE_WEAKREFS = 1 << 6;
        const HAVE_ITER = 1 << 7;
        const HAVE_CLASS = 1 << 8;
        const HEAPTYPE = 1 << 9;
        const BASETYPE = 1 << 10;
        const READY = 1 << 12;
        const READYING = 1 << 13;
        const HAVE_GC = 1 << 14;

        const DEFAULT = Self::HAVE_GETCHARBUFFER.bits()
            | Self::HAVE_SEQUENCE_IN.bits()
            | Self::HAVE_INPLACEOPS.bits()
            | Self::HAVE_RICHCOMPARE.bits()
            | Self::HAVE_WEAKREFS.bits()
            | Self::HAVE_ITER.bits()
            | Self::HAVE_CLASS.bits();
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct PyTypeObject {
    pub ob_refcnt: isize,
    pub ob_type: *mut PyTypeObject,
    pub ob_size: isize,
    pub tp_name: *const c_char,
    pub tp_basicsize: isize,
    pub tp_itemsize: isize,

    pub tp_dealloc: Option<Destructor>,
    pub tp_print: Option<PrintFunc>,
    pub tp_getattr: OpaqueFn,
    pub tp_setattr: OpaqueFn,
    pub tp_compare: OpaqueFn,
    pub tp_repr: Option<ReprFunc>,

    pub tp_as_number: *mut c_void,
    pub tp_as_sequence: *mut c_void,
    pub tp_as_mapping: *mut c_void,

    pub tp_hash: OpaqueFn,
    pub tp_call: Option<TernaryFunc>,
    pub tp_str: Option<ReprFunc>,
    pub tp_getattro: OpaqueFn,
    pub tp_setattro: OpaqueFn,

    pub tp_as_buffer: *mut c_void,
    pub tp_flags: c_long,
    pub tp_doc: *const c_char,

    pub tp_traverse: OpaqueFn,
    pub tp_clear: OpaqueFn,
    pub tp_richcompare: OpaqueFn,
    pub tp_weaklistoffset: isize,

    pub tp_iter: Option<GetIterFunc>,
    pub tp_iternext: Option<IterNextFunc>,

    pub tp_methods: *mut PyMethodDef,
    pub tp_members: *mut c_void,
    pub tp_getset: *mut c_void,
    pub tp_base: *mut PyTypeObject,
    pub tp_dict: *mut PyObject,
    pub tp_descr_get: OpaqueFn,
    pub tp_descr_set: OpaqueFn,
    pub tp_dictoffset: isize,
    pub tp_init: Option<InitProc>,
    pub tp_alloc: Option<AllocFunc>,
    pub tp_new: Option<NewFunc>,
    pub tp_free: Option<FreeFunc>,
    pub tp_is_gc: OpaqueFn,
    pub tp_bases: *mut PyObject,
    pub tp_mro: *mut PyObject,
    pub tp_cache: *mut PyObject,
    pub tp_subclasses: *mut PyObject,
    pub tp_weaklist: *mut PyObject,
    pub tp_del: Option<Destructor>,
}

impl PyTypeObject {
    /// All-zero descriptor: every slot unset, every pointer NULL
    pub const fn zeroed() -> Self {
        // SAFETY: every field is an integer, a raw pointer or an `Option` of a
        // function pointer, all of which are valid when zeroed.
        unsafe { std::mem::zeroed() }
    }

    #[inline]
    pub fn flags(&self) -> TypeFlags {
        TypeFlags::from_bits_retain(self.tp_flags)
    }

    #[inline]
    pub fn set_flags(&mut self, flags: TypeFlags) {
        self.tp_flags = flags.bits();
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.flags().contains(TypeFlags::READY)
    }
}
