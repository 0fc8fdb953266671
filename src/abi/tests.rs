//! Layout tests - offsets pinned to the CPython 2.5 headers on LP64

use super::*;
use std::mem::{offset_of, size_of};

#[test]
fn address_null_and_offset() {
    assert!(Address::NULL.is_null());
    let addr = Address::new(0x1000);
    assert_eq!(addr.offset(0x10).raw(), 0x1010);
    assert_eq!(format!("{}", addr), "0x1000");
}

#[test]
fn read_c_string_handles_null() {
    assert_eq!(unsafe { read_c_string(std::ptr::null()) }, None);
    assert_eq!(unsafe { read_c_string(c"spam".as_ptr()) }.as_deref(), Some("spam"));
}

#[test]
fn method_flags_match_reference_values() {
    assert_eq!(MethodFlags::VARARGS.bits(), 1);
    assert_eq!(MethodFlags::KEYWORDS.bits(), 2);
    assert_eq!(MethodFlags::NOARGS.bits(), 4);
    assert_eq!(MethodFlags::O.bits(), 8);
}

#[test]
fn type_flags_match_reference_values() {
    assert_eq!(TypeFlags::HAVE_ITER.bits(), 0x80);
    assert_eq!(TypeFlags::READY.bits(), 0x1000);
    assert!(TypeFlags::DEFAULT.contains(TypeFlags::HAVE_ITER));
    assert!(!TypeFlags::DEFAULT.contains(TypeFlags::READY));
}

#[test]
fn zeroed_type_has_no_slots() {
    let ty = PyTypeObject::zeroed();
    assert!(ty.tp_alloc.is_none());
    assert!(ty.tp_base.is_null());
    assert!(!ty.is_ready());
}

#[test]
fn common_header_leads_every_object() {
    assert_eq!(offset_of!(PyObject, ob_refcnt), 0);
    assert_eq!(offset_of!(PyVarObject, ob_refcnt), 0);
    assert_eq!(offset_of!(PyStringObject, ob_refcnt), 0);
    assert_eq!(offset_of!(PyTupleObject, ob_refcnt), 0);
    assert_eq!(offset_of!(PyTypeObject, ob_refcnt), 0);
    assert_eq!(offset_of!(PyObject, ob_type), offset_of!(PyVarObject, ob_type));
    assert_eq!(offset_of!(PyVarObject, ob_size), offset_of!(PyStringObject, ob_size));
    assert_eq!(offset_of!(PyVarObject, ob_size), offset_of!(PyTupleObject, ob_size));
}

#[cfg(all(target_pointer_width = "64", not(windows)))]
mod lp64 {
    use super::*;

    #[test]
    fn object_layouts() {
        assert_eq!(size_of::<PyObject>(), 16);
        assert_eq!(offset_of!(PyObject, ob_type), 8);
        assert_eq!(offset_of!(PyVarObject, ob_size), 16);

        assert_eq!(offset_of!(PyStringObject, ob_shash), 24);
        assert_eq!(offset_of!(PyStringObject, ob_sstate), 32);
        assert_eq!(PyStringObject::PAYLOAD_OFFSET, 36);
        assert_eq!(PyStringObject::alloc_size(4), 41);

        assert_eq!(PyTupleObject::ITEMS_OFFSET, 24);
        assert_eq!(PyTupleObject::alloc_size(3), 48);

        assert_eq!(offset_of!(PyIntObject, ob_ival), 16);
        assert_eq!(offset_of!(PyFloatObject, ob_fval), 16);
    }

    #[test]
    fn method_def_layout() {
        assert_eq!(size_of::<PyMethodDef>(), 32);
        assert_eq!(offset_of!(PyMethodDef, ml_name), 0);
        assert_eq!(offset_of!(PyMethodDef, ml_meth), 8);
        assert_eq!(offset_of!(PyMethodDef, ml_flags), 16);
        assert_eq!(offset_of!(PyMethodDef, ml_doc), 24);
    }

    #[test]
    fn type_object_layout() {
        assert_eq!(offset_of!(PyTypeObject, tp_name), 24);
        assert_eq!(offset_of!(PyTypeObject, tp_basicsize), 32);
        assert_eq!(offset_of!(PyTypeObject, tp_itemsize), 40);
        assert_eq!(offset_of!(PyTypeObject, tp_dealloc), 48);
        assert_eq!(offset_of!(PyTypeObject, tp_print), 56);
        assert_eq!(offset_of!(PyTypeObject, tp_repr), 88);
        assert_eq!(offset_of!(PyTypeObject, tp_as_number), 96);
        assert_eq!(offset_of!(PyTypeObject, tp_call), 128);
        assert_eq!(offset_of!(PyTypeObject, tp_str), 136);
        assert_eq!(offset_of!(PyTypeObject, tp_flags), 168);
        assert_eq!(offset_of!(PyTypeObject, tp_doc), 176);
        assert_eq!(offset_of!(PyTypeObject, tp_iter), 216);
        assert_eq!(offset_of!(PyTypeObject, tp_iternext), 224);
        assert_eq!(offset_of!(PyTypeObject, tp_methods), 232);
        assert_eq!(offset_of!(PyTypeObject, tp_base), 256);
        assert_eq!(offset_of!(PyTypeObject, tp_init), 296);
        assert_eq!(offset_of!(PyTypeObject, tp_alloc), 304);
        assert_eq!(offset_of!(PyTypeObject, tp_new), 312);
        assert_eq!(offset_of!(PyTypeObject, tp_free), 320);
        assert_eq!(offset_of!(PyTypeObject, tp_del), 376);
        assert_eq!(size_of::<PyTypeObject>(), 384);
    }
}
