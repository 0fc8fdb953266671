//! C API - the entry points extension code links against
//!
//! Design: Every function acts on the runtime entered on the calling thread.
//! Outside an entered runtime they log and return the ABI's failure value.
//! Failures inside are reported the C way: a pending error plus NULL / -1.

#![allow(non_snake_case)]

use crate::abi::{self, Address, PyFloatObject, PyIntObject, PyMethodDef, PyObject, PyTypeObject};
use crate::error::{Error, Result};
use crate::host::HostValue;
use crate::logging::{error, warn};
use crate::objects::string_payload;
use crate::runtime::Runtime;
use std::ffi::{c_char, c_double, c_int, c_long, c_void, CStr};
use std::ptr;

fn with_runtime<T>(function: &'static str, failure: T, f: impl FnOnce(&Runtime) -> T) -> T {
    match Runtime::current() {
        Some(runtime) => f(&runtime),
        None => {
            error!(target: "capi", function, "called with no entered runtime");
            failure
        }
    }
}

/// Object pointer, or NULL with the error left pending
fn object_or_null(runtime: &Runtime, result: Result<Address>) -> *mut PyObject {
    match result {
        Ok(addr) => addr.as_ptr(),
        Err(err) => {
            runtime.raise_error(&err);
            ptr::null_mut()
        }
    }
}

/// 0, or -1 with the error left pending
fn status(runtime: &Runtime, result: Result<()>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(err) => {
            runtime.raise_error(&err);
            -1
        }
    }
}

fn length(len: isize) -> Result<usize> {
    usize::try_from(len)
        .map_err(|_| Error::Host { kind: "SystemError", message: format!("negative size {}", len) })
}

unsafe fn expect_type(obj: *mut PyObject, type_addr: Address, what: &str) -> Result<Address> {
    let addr = Address::from_ptr(obj);
    if addr.is_null() || abi::read_type(addr) != type_addr {
        return Err(Error::type_error(format!("expected {} object", what)));
    }
    Ok(addr)
}

// ===== Reference counting =====

#[no_mangle]
pub unsafe extern "C" fn Py_IncRef(obj: *mut PyObject) {
    if !obj.is_null() {
        (*obj).ob_refcnt += 1;
    }
}

#[no_mangle]
pub unsafe extern "C" fn Py_DecRef(obj: *mut PyObject) {
    with_runtime("Py_DecRef", (), |rt| {
        if let Err(err) = rt.decref(Address::from_ptr(obj)) {
            warn!(target: "capi", error = %err, "decref failed");
        }
    })
}

// ===== Types =====

#[no_mangle]
pub unsafe extern "C" fn PyType_Ready(ty: *mut PyTypeObject) -> c_int {
    with_runtime("PyType_Ready", -1, |rt| status(rt, rt.ready_type(Address::from_ptr(ty))))
}

#[no_mangle]
pub unsafe extern "C" fn PyType_GenericAlloc(ty: *mut PyTypeObject, nitems: isize) -> *mut PyObject {
    with_runtime("PyType_GenericAlloc", ptr::null_mut(), |rt| {
        let result = length(nitems).and_then(|n| rt.generic_alloc(Address::from_ptr(ty), n));
        object_or_null(rt, result)
    })
}

#[no_mangle]
pub unsafe extern "C" fn PyType_GenericNew(
    ty: *mut PyTypeObject,
    _args: *mut PyObject,
    _kwargs: *mut PyObject,
) -> *mut PyObject {
    with_runtime("PyType_GenericNew", ptr::null_mut(), |rt| {
        object_or_null(rt, rt.generic_new(Address::from_ptr(ty)))
    })
}

#[no_mangle]
pub unsafe extern "C" fn PyType_IsSubtype(a: *mut PyTypeObject, b: *mut PyTypeObject) -> c_int {
    with_runtime("PyType_IsSubtype", 0, |rt| {
        rt.is_subtype(Address::from_ptr(a), Address::from_ptr(b)) as c_int
    })
}

#[no_mangle]
pub unsafe extern "C" fn PyBaseObject_Init(
    _obj: *mut PyObject,
    _args: *mut PyObject,
    _kwargs: *mut PyObject,
) -> c_int {
    0
}

#[no_mangle]
pub unsafe extern "C" fn PyBaseObject_Dealloc(obj: *mut PyObject) {
    with_runtime("PyBaseObject_Dealloc", (), |rt| {
        if let Err(err) = rt.dealloc_object(Address::from_ptr(obj)) {
            warn!(target: "capi", error = %err, "dealloc failed");
        }
    })
}

// ===== Memory =====

#[no_mangle]
pub unsafe extern "C" fn PyObject_Malloc(size: usize) -> *mut c_void {
    with_runtime("PyObject_Malloc", ptr::null_mut(), |rt| match rt.allocator().alloc(size) {
        Ok(addr) => addr.as_ptr(),
        Err(err) => {
            rt.raise_error(&err);
            ptr::null_mut()
        }
    })
}

/// On failure the original block is left untouched
#[no_mangle]
pub unsafe extern "C" fn PyObject_Realloc(block: *mut c_void, size: usize) -> *mut c_void {
    with_runtime("PyObject_Realloc", ptr::null_mut(), |rt| {
        match rt.allocator().realloc(Address::from_ptr(block), size) {
            Ok(addr) => addr.as_ptr(),
            Err(err) => {
                rt.raise_error(&err);
                ptr::null_mut()
            }
        }
    })
}

/// Frees the block and drops any binding it had
#[no_mangle]
pub unsafe extern "C" fn PyObject_Free(block: *mut c_void) {
    with_runtime("PyObject_Free", (), |rt| {
        if let Err(err) = rt.free_object(Address::from_ptr(block)) {
            warn!(target: "capi", error = %err, "free failed");
        }
    })
}

// ===== Errors =====

#[no_mangle]
pub unsafe extern "C" fn PyErr_SetString(exc_type: *mut PyObject, message: *const c_char) {
    with_runtime("PyErr_SetString", (), |rt| {
        let message = abi::read_c_string(message).unwrap_or_default();
        rt.set_error(Address::from_ptr(exc_type), message);
    })
}

/// Borrowed exception type of the pending error, or NULL
#[no_mangle]
pub unsafe extern "C" fn PyErr_Occurred() -> *mut PyObject {
    with_runtime("PyErr_Occurred", ptr::null_mut(), |rt| match rt.pending_error() {
        Some(pending) if !pending.exc_type.is_null() => pending.exc_type.as_ptr(),
        // An error without a type object still has to read as "set"
        Some(_) => rt.types().exception("SystemError").unwrap_or(Address::NULL).as_ptr(),
        None => ptr::null_mut(),
    })
}

#[no_mangle]
pub unsafe extern "C" fn PyErr_Clear() {
    with_runtime("PyErr_Clear", (), |rt| rt.clear_error())
}

#[no_mangle]
pub unsafe extern "C" fn PyErr_NoMemory() -> *mut PyObject {
    with_runtime("PyErr_NoMemory", ptr::null_mut(), |rt| {
        rt.raise("MemoryError", "out of memory");
        ptr::null_mut()
    })
}

// ===== Strings =====

#[no_mangle]
pub unsafe extern "C" fn PyString_FromString(text: *const c_char) -> *mut PyObject {
    with_runtime("PyString_FromString", ptr::null_mut(), |rt| {
        if text.is_null() {
            return object_or_null(rt, Err(Error::Host {
                kind: "SystemError",
                message: "NULL passed to PyString_FromString".into(),
            }));
        }
        object_or_null(rt, rt.string_from_bytes(CStr::from_ptr(text).to_bytes()))
    })
}

/// NULL `text` gives a zero-filled string for the caller to fill in
#[no_mangle]
pub unsafe extern "C" fn PyString_FromStringAndSize(text: *const c_char, len: isize) -> *mut PyObject {
    with_runtime("PyString_FromStringAndSize", ptr::null_mut(), |rt| {
        let result = length(len).and_then(|len| {
            if text.is_null() {
                rt.string_alloc(len)
            } else {
                rt.string_from_bytes(std::slice::from_raw_parts(text.cast::<u8>(), len))
            }
        });
        object_or_null(rt, result)
    })
}

/// On failure `*string` is freed and set to NULL
#[no_mangle]
pub unsafe extern "C" fn _PyString_Resize(string: *mut *mut PyObject, len: isize) -> c_int {
    with_runtime("_PyString_Resize", -1, |rt| {
        if string.is_null() {
            return status(rt, Err(Error::Host { kind: "SystemError", message: "bad string pointer".into() }));
        }
        let len = match length(len) {
            Ok(len) => len,
            Err(err) => return status(rt, Err(err)),
        };

        let mut addr = Address::from_ptr(*string);
        // The pending MemoryError is already set on failure
        let result = rt.string_resize(&mut addr, len);
        *string = addr.as_ptr();
        if result.is_ok() { 0 } else { -1 }
    })
}

#[no_mangle]
pub unsafe extern "C" fn PyString_Size(obj: *mut PyObject) -> isize {
    with_runtime("PyString_Size", -1, |rt| match expect_type(obj, rt.types().str_, "string") {
        Ok(addr) => rt.string_size(addr) as isize,
        Err(err) => {
            rt.raise_error(&err);
            -1
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn PyString_AsString(obj: *mut PyObject) -> *mut c_char {
    with_runtime("PyString_AsString", ptr::null_mut(), |rt| {
        match expect_type(obj, rt.types().str_, "string") {
            Ok(addr) => string_payload(addr).cast(),
            Err(err) => {
                rt.raise_error(&err);
                ptr::null_mut()
            }
        }
    })
}

// ===== Tuples =====

#[no_mangle]
pub unsafe extern "C" fn PyTuple_New(len: isize) -> *mut PyObject {
    with_runtime("PyTuple_New", ptr::null_mut(), |rt| {
        object_or_null(rt, length(len).and_then(|len| rt.tuple_new(len)))
    })
}

#[no_mangle]
pub unsafe extern "C" fn PyTuple_Size(obj: *mut PyObject) -> isize {
    with_runtime("PyTuple_Size", -1, |rt| match expect_type(obj, rt.types().tuple, "tuple") {
        Ok(addr) => rt.tuple_len(addr) as isize,
        Err(err) => {
            rt.raise_error(&err);
            -1
        }
    })
}

/// Borrowed item
#[no_mangle]
pub unsafe extern "C" fn PyTuple_GetItem(obj: *mut PyObject, index: isize) -> *mut PyObject {
    with_runtime("PyTuple_GetItem", ptr::null_mut(), |rt| {
        let result = expect_type(obj, rt.types().tuple, "tuple")
            .and_then(|addr| rt.tuple_item(addr, length(index)?));
        object_or_null(rt, result)
    })
}

/// Steals the reference to `item`, even on failure
#[no_mangle]
pub unsafe extern "C" fn PyTuple_SetItem(obj: *mut PyObject, index: isize, item: *mut PyObject) -> c_int {
    with_runtime("PyTuple_SetItem", -1, |rt| {
        let item = Address::from_ptr(item);
        let result = match (expect_type(obj, rt.types().tuple, "tuple"), length(index)) {
            (Ok(addr), Ok(index)) => rt.tuple_set_item(addr, index, item),
            (Err(err), _) | (_, Err(err)) => rt.decref(item).and(Err(err)),
        };
        status(rt, result)
    })
}

#[no_mangle]
pub unsafe extern "C" fn PyTuple_Dealloc(obj: *mut PyObject) {
    with_runtime("PyTuple_Dealloc", (), |rt| {
        if let Err(err) = rt.tuple_dealloc(Address::from_ptr(obj)) {
            warn!(target: "capi", error = %err, "tuple dealloc failed");
        }
    })
}

// ===== Numbers and dicts =====

#[no_mangle]
pub unsafe extern "C" fn PyInt_FromLong(value: c_long) -> *mut PyObject {
    with_runtime("PyInt_FromLong", ptr::null_mut(), |rt| object_or_null(rt, rt.int_new(value as i64)))
}

/// -1 with a pending `TypeError` for non-integers
#[no_mangle]
pub unsafe extern "C" fn PyInt_AsLong(obj: *mut PyObject) -> c_long {
    with_runtime("PyInt_AsLong", -1, |rt| {
        let addr = Address::from_ptr(obj);
        if !addr.is_null() && abi::read_type(addr) == rt.types().int {
            return (*addr.as_ptr::<PyIntObject>()).ob_ival;
        }

        match rt.retrieve(addr).ok().and_then(|value| value.as_int()) {
            Some(value) => value as c_long,
            None => {
                rt.raise("TypeError", "an integer is required");
                -1
            }
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn PyFloat_FromDouble(value: c_double) -> *mut PyObject {
    with_runtime("PyFloat_FromDouble", ptr::null_mut(), |rt| object_or_null(rt, rt.float_new(value)))
}

#[no_mangle]
pub unsafe extern "C" fn PyFloat_AsDouble(obj: *mut PyObject) -> c_double {
    with_runtime("PyFloat_AsDouble", -1.0, |rt| {
        let addr = Address::from_ptr(obj);
        if !addr.is_null() && abi::read_type(addr) == rt.types().float {
            return (*addr.as_ptr::<PyFloatObject>()).ob_fval;
        }

        let value = rt.retrieve(addr).ok().and_then(|v| v.as_float().or_else(|| v.as_int().map(|i| i as f64)));
        value.unwrap_or_else(|| {
            rt.raise("TypeError", "a float is required");
            -1.0
        })
    })
}

#[no_mangle]
pub unsafe extern "C" fn PyDict_Size(obj: *mut PyObject) -> isize {
    with_runtime("PyDict_Size", -1, |rt| match rt.retrieve(Address::from_ptr(obj)) {
        Ok(value) => match value.value() {
            HostValue::Dict(items) => items.len() as isize,
            _ => {
                rt.raise("TypeError", "expected dict object");
                -1
            }
        },
        Err(err) => {
            rt.raise_error(&err);
            -1
        }
    })
}

// ===== Modules =====

/// Create a module from a method table; returns a borrowed reference
#[no_mangle]
pub unsafe extern "C" fn Py_InitModule4(
    name: *const c_char,
    methods: *mut PyMethodDef,
    doc: *const c_char,
    module_self: *mut PyObject,
    _api_version: c_int,
) -> *mut PyObject {
    with_runtime("Py_InitModule4", ptr::null_mut(), |rt| {
        let Some(name) = abi::read_c_string(name) else {
            return object_or_null(rt, Err(Error::Host {
                kind: "SystemError",
                message: "module name is NULL".into(),
            }));
        };
        let result = rt.dispatcher().init_module(
            &name,
            methods,
            abi::read_c_string(doc),
            Address::from_ptr(module_self),
        );
        object_or_null(rt, result)
    })
}

/// Steals the reference to `item` when it becomes a module variable
#[no_mangle]
pub unsafe extern "C" fn PyModule_AddObject(
    module: *mut PyObject,
    name: *const c_char,
    item: *mut PyObject,
) -> c_int {
    with_runtime("PyModule_AddObject", -1, |rt| {
        let Some(name) = abi::read_c_string(name) else {
            return status(rt, Err(Error::Host { kind: "SystemError", message: "name is NULL".into() }));
        };
        let result = rt.dispatcher().add_object(Address::from_ptr(module), &name, Address::from_ptr(item));
        status(rt, result)
    })
}

// ===== Rust-side accessors for extension code =====

/// Borrowed `None` of the entered runtime, NULL outside one
pub fn none() -> *mut PyObject {
    with_runtime("Py_None", ptr::null_mut(), |rt| rt.types().none.as_ptr())
}

/// Builtin exception type object by name, NULL if unknown
///
/// Stands in for the `PyExc_*` globals, which are per runtime here.
pub fn exception(name: &str) -> *mut PyObject {
    with_runtime("PyExc", ptr::null_mut(), |rt| {
        rt.types().exception(name).unwrap_or(Address::NULL).as_ptr()
    })
}
