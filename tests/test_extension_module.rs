//! A small extension written against the C API, loaded end to end

use std::ffi::{c_int, c_long};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use typthon_ext::capi::*;
use typthon_ext::{
    Error, HostObject, MethodFlags, PyMethodDef, PyObject, PyTypeObject, Runtime,
    RuntimeConfig, TypeFlags,
};

// ===== The extension =====

#[repr(C)]
struct Counter {
    ob_refcnt: isize,
    ob_type: *mut PyTypeObject,
    current: c_long,
    limit: c_long,
}

static EGGS_CALLS: AtomicUsize = AtomicUsize::new(0);
static KEPT: AtomicUsize = AtomicUsize::new(0);

unsafe fn new_none() -> *mut PyObject {
    let none = none();
    Py_IncRef(none);
    none
}

unsafe extern "C" fn spam_eggs(_module: *mut PyObject, _args: *mut PyObject) -> *mut PyObject {
    EGGS_CALLS.fetch_add(1, Ordering::SeqCst);
    PyString_FromString(c"eggs".as_ptr())
}

/// Concatenate string arguments, growing the result in place
unsafe extern "C" fn spam_join(_module: *mut PyObject, args: *mut PyObject) -> *mut PyObject {
    let mut result = PyString_FromStringAndSize(ptr::null(), 0);
    for index in 0..PyTuple_Size(args) {
        let part = PyTuple_GetItem(args, index);
        let len = PyString_Size(part);
        if len < 0 {
            Py_DecRef(result);
            return ptr::null_mut();
        }
        let offset = PyString_Size(result);
        if _PyString_Resize(&mut result, offset + len) < 0 {
            return ptr::null_mut();
        }
        ptr::copy_nonoverlapping(
            PyString_AsString(part),
            PyString_AsString(result).add(offset as usize),
            len as usize,
        );
    }
    result
}

unsafe extern "C" fn spam_describe(
    _module: *mut PyObject,
    args: *mut PyObject,
    kwargs: *mut PyObject,
) -> *mut PyObject {
    let kw = if kwargs.is_null() { 0 } else { PyDict_Size(kwargs) };
    let result = PyTuple_New(2);
    PyTuple_SetItem(result, 0, PyInt_FromLong(PyTuple_Size(args) as c_long));
    PyTuple_SetItem(result, 1, PyInt_FromLong(kw as c_long));
    result
}

unsafe extern "C" fn spam_fail(_module: *mut PyObject, _args: *mut PyObject) -> *mut PyObject {
    PyErr_SetString(exception("ValueError"), c"spam is off".as_ptr());
    ptr::null_mut()
}

unsafe extern "C" fn spam_keep(_module: *mut PyObject, obj: *mut PyObject) -> *mut PyObject {
    Py_IncRef(obj);
    KEPT.store(obj as usize, Ordering::SeqCst);
    new_none()
}

unsafe extern "C" fn spam_drop_kept(_module: *mut PyObject, _args: *mut PyObject) -> *mut PyObject {
    let kept = KEPT.swap(0, Ordering::SeqCst) as *mut PyObject;
    Py_DecRef(kept);
    new_none()
}

unsafe extern "C" fn counter_init(this: *mut PyObject, args: *mut PyObject, _kwargs: *mut PyObject) -> c_int {
    if PyTuple_Size(args) != 1 {
        PyErr_SetString(exception("TypeError"), c"Counter() takes exactly one limit".as_ptr());
        return -1;
    }
    let limit = PyInt_AsLong(PyTuple_GetItem(args, 0));
    if limit == -1 && !PyErr_Occurred().is_null() {
        return -1;
    }
    let counter = this as *mut Counter;
    (*counter).current = 0;
    (*counter).limit = limit;
    0
}

unsafe extern "C" fn counter_limit(this: *mut PyObject, _args: *mut PyObject) -> *mut PyObject {
    PyInt_FromLong((*(this as *mut Counter)).limit)
}

unsafe extern "C" fn counter_reset(this: *mut PyObject, _args: *mut PyObject) -> *mut PyObject {
    (*(this as *mut Counter)).current = 0;
    new_none()
}

unsafe extern "C" fn counter_iter(this: *mut PyObject) -> *mut PyObject {
    Py_IncRef(this);
    this
}

unsafe extern "C" fn counter_next(this: *mut PyObject) -> *mut PyObject {
    let counter = this as *mut Counter;
    if (*counter).current >= (*counter).limit {
        return ptr::null_mut();
    }
    (*counter).current += 1;
    PyInt_FromLong((*counter).current - 1)
}

fn leak_methods(defs: Vec<PyMethodDef>) -> *mut PyMethodDef {
    let mut defs = defs;
    defs.push(PyMethodDef::SENTINEL);
    Box::leak(defs.into_boxed_slice()).as_mut_ptr()
}

fn module_methods() -> *mut PyMethodDef {
    leak_methods(vec![
        PyMethodDef::new(c"eggs".as_ptr(), spam_eggs, MethodFlags::NOARGS, c"Return eggs".as_ptr()),
        PyMethodDef::new(c"join".as_ptr(), spam_join, MethodFlags::VARARGS, ptr::null()),
        PyMethodDef::with_keywords(c"describe".as_ptr(), spam_describe, ptr::null()),
        PyMethodDef::new(c"fail".as_ptr(), spam_fail, MethodFlags::NOARGS, ptr::null()),
        PyMethodDef::new(c"classy".as_ptr(), spam_eggs, MethodFlags::NOARGS | MethodFlags::CLASS, ptr::null()),
        PyMethodDef::new(c"keep".as_ptr(), spam_keep, MethodFlags::O, ptr::null()),
        PyMethodDef::new(c"drop_kept".as_ptr(), spam_drop_kept, MethodFlags::NOARGS, ptr::null()),
    ])
}

fn counter_type() -> *mut PyTypeObject {
    let mut ty = PyTypeObject::zeroed();
    ty.ob_refcnt = 1;
    ty.tp_name = c"spam.Counter".as_ptr();
    ty.tp_basicsize = std::mem::size_of::<Counter>() as isize;
    ty.tp_doc = c"Counts up to a limit".as_ptr();
    ty.set_flags(TypeFlags::DEFAULT);
    ty.tp_init = Some(counter_init);
    ty.tp_iter = Some(counter_iter);
    ty.tp_iternext = Some(counter_next);
    ty.tp_methods = leak_methods(vec![
        PyMethodDef::new(c"limit".as_ptr(), counter_limit, MethodFlags::NOARGS, ptr::null()),
        PyMethodDef::new(c"reset".as_ptr(), counter_reset, MethodFlags::NOARGS, ptr::null()),
    ]);
    Box::leak(Box::new(ty))
}

unsafe extern "C" fn initspam() {
    let module = Py_InitModule4(c"spam".as_ptr(), module_methods(), c"Spam module".as_ptr(), ptr::null_mut(), 1013);
    if module.is_null() {
        return;
    }
    let ty = counter_type();
    if PyType_Ready(ty) < 0 {
        return;
    }
    if PyModule_AddObject(module, c"Counter".as_ptr(), ty as *mut PyObject) < 0 {
        return;
    }
    PyModule_AddObject(module, c"answer".as_ptr(), PyInt_FromLong(42));
}

// ===== Helpers =====

fn load() -> (Arc<Runtime>, HostObject) {
    let rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let module = rt.load_module("spam", initspam).unwrap();
    (rt, module)
}

fn attr(obj: &HostObject, name: &str) -> HostObject {
    obj.get_attr(name).unwrap_or_else(|| panic!("missing attribute {}", name))
}

// ===== Module =====

#[test]
fn test_module_has_supported_functions_only() {
    let (rt, module) = load();

    for name in ["eggs", "join", "describe", "fail", "keep", "drop_kept"] {
        assert!(module.has_attr(name), "{} missing", name);
    }
    assert!(!module.has_attr("classy"));
    assert_eq!(attr(&module, "__doc__").as_str(), Some("Spam module"));
    assert_eq!(attr(&module, "answer").as_int(), Some(42));
    assert!(rt.module("spam").unwrap().ptr_eq(&module));
}

#[test]
fn test_noargs_function_calls_native_once() {
    let (_rt, module) = load();
    let before = EGGS_CALLS.load(Ordering::SeqCst);

    let result = module.call_method("eggs", &[], &[]).unwrap();

    assert_eq!(result.as_str(), Some("eggs"));
    assert_eq!(EGGS_CALLS.load(Ordering::SeqCst), before + 1);
}

#[test]
fn test_varargs_join_resizes_in_place() {
    let (rt, module) = load();
    let blocks = rt.allocator().stats().live_blocks;

    let args = [HostObject::str("ab"), HostObject::str("cd"), HostObject::str("é")];
    let result = module.call_method("join", &args, &[]).unwrap();

    assert_eq!(result.as_str(), Some("abcdé"));
    assert_eq!(rt.allocator().stats().live_blocks, blocks);
}

#[test]
fn test_keyword_arguments() {
    let (_rt, module) = load();
    let kwargs = [("x".to_string(), HostObject::int(1)), ("y".to_string(), HostObject::int(2))];

    let with = module.call_method("describe", &[HostObject::int(0)], &kwargs).unwrap();
    let without = module.call_method("describe", &[], &[]).unwrap();

    let ints = |t: &HostObject| t.as_tuple().unwrap().iter().map(|i| i.as_int().unwrap()).collect::<Vec<_>>();
    assert_eq!(ints(&with), [1, 2]);
    assert_eq!(ints(&without), [0, 0]);
}

#[test]
fn test_native_error_is_raised_and_slot_cleared() {
    let (rt, module) = load();

    let err = module.call_method("fail", &[], &[]).unwrap_err();

    assert!(matches!(err, Error::Native(ref e) if e.kind == "ValueError" && e.message == "spam is off"));
    assert!(!rt.has_error());
    assert!(module.call_method("describe", &[], &[]).is_ok());
}

// ===== Classes =====

#[test]
fn test_class_generated_from_type() {
    let (rt, module) = load();
    let counter = attr(&module, "Counter");

    let info = counter.as_class().unwrap();
    assert_eq!(info.name, "Counter");
    assert_eq!(attr(&counter, "__module__").as_str(), Some("spam"));
    assert_eq!(attr(&counter, "__doc__").as_str(), Some("Counts up to a limit"));
    for name in ["__new__", "__init__", "limit", "reset", "__iter__", "next"] {
        assert!(counter.has_attr(name), "{} missing", name);
    }
    let type_addr = *info.native_type.get().unwrap();
    assert!(rt.bridge().object_at(type_addr).unwrap().ptr_eq(&counter));
    assert!(rt.dispatch_table().contains("Counter.limit"));
}

#[test]
fn test_construct_init_and_methods() {
    let (rt, module) = load();
    let counter = attr(&module, "Counter");

    let instance = counter.call(&[HostObject::int(3)], &[]).unwrap();

    let addr = *instance.as_instance().unwrap().native.get().unwrap();
    assert_eq!(rt.bridge().address_of(&instance).unwrap(), addr);
    assert_eq!(instance.call_method("limit", &[], &[]).unwrap().as_int(), Some(3));
    assert!(instance.call_method("reset", &[], &[]).unwrap().is_none());
}

#[test]
fn test_iteration_until_stop() {
    let (_rt, module) = load();
    let instance = attr(&module, "Counter").call(&[HostObject::int(3)], &[]).unwrap();

    let iter = instance.call_method("__iter__", &[], &[]).unwrap();
    assert!(iter.ptr_eq(&instance));

    let mut seen = Vec::new();
    loop {
        match iter.call_method("next", &[], &[]) {
            Ok(value) => seen.push(value.as_int().unwrap()),
            Err(Error::StopIteration) => break,
            Err(err) => panic!("unexpected error: {}", err),
        }
    }
    assert_eq!(seen, [0, 1, 2]);
}

#[test]
fn test_failed_init_raises_and_frees() {
    let (rt, module) = load();
    let blocks = rt.allocator().stats().live_blocks;

    let err = attr(&module, "Counter").call(&[], &[]).unwrap_err();

    assert!(matches!(err, Error::Native(ref e) if e.kind == "TypeError"));
    assert!(!rt.has_error());
    assert_eq!(rt.allocator().stats().live_blocks, blocks);
}

#[test]
fn test_reclaimed_instance_releases_native_object() {
    let (rt, module) = load();
    let counter = attr(&module, "Counter");
    let blocks = rt.allocator().stats().live_blocks;

    let instance = counter.call(&[HostObject::int(1)], &[]).unwrap();
    let addr = rt.bridge().address_of(&instance).unwrap();
    assert!(rt.allocator().stats().live_blocks > blocks);
    drop(instance);

    assert!(!rt.bridge().has_address(addr));
    assert_eq!(rt.allocator().stats().live_blocks, blocks);
    assert!(rt.sweep().is_ok());
}

#[test]
fn test_native_reference_pins_instance() {
    let (rt, module) = load();
    let instance = attr(&module, "Counter").call(&[HostObject::int(5)], &[]).unwrap();
    let addr = rt.bridge().address_of(&instance).unwrap();

    module.call_method("keep", &[instance.clone()], &[]).unwrap();
    assert!(rt.bridge().is_strong(&instance));
    drop(instance);

    let pinned = rt.bridge().object_at(addr).unwrap();
    assert_eq!(pinned.call_method("limit", &[], &[]).unwrap().as_int(), Some(5));
    drop(pinned);

    module.call_method("drop_kept", &[], &[]).unwrap();
    assert!(!rt.bridge().has_address(addr));
}

// ===== C API edges =====

#[test]
fn test_add_object_to_unknown_module_fails() {
    let (rt, _module) = load();
    let _entered = rt.enter();
    let mut bogus = PyObject { ob_refcnt: 1, ob_type: ptr::null_mut() };

    unsafe {
        let item = PyInt_FromLong(7);
        let status = PyModule_AddObject(&mut bogus, c"x".as_ptr(), item);
        assert_eq!(status, -1);
        assert!(!PyErr_Occurred().is_null());
        PyErr_Clear();
        Py_DecRef(item);
    }
    assert!(!rt.has_error());
}

#[test]
fn test_capi_outside_runtime_is_inert() {
    unsafe {
        assert!(PyInt_FromLong(1).is_null());
        assert!(PyErr_Occurred().is_null());
    }
    assert!(none().is_null());
}
