//! Type objects - readiness, slot inheritance, generic construction, builtins

use crate::abi::{self, Address, PyFloatObject, PyIntObject, PyObject, PyStringObject};
use crate::abi::{PyTupleObject, PyTypeObject, TypeFlags};
use crate::allocator::Allocator;
use crate::bridge::PtrMap;
use crate::capi;
use crate::error::{Error, Result};
use crate::host::{HostBuiltins, HostObject};
use crate::logging::{debug, trace};
use crate::runtime::Runtime;
use std::ffi::CStr;
use std::mem;

/// Root types every readied type falls back to
#[derive(Debug, Clone, Copy)]
pub struct TypeRoots {
    /// Default base class
    pub object: Address,
    /// Default metatype
    pub type_: Address,
}

/// Copy each listed `Option` slot from `$base` wherever `$ty` leaves it unset
macro_rules! inherit_slots {
    ($ty:expr, $base:expr, $($slot:ident),+ $(,)?) => {
        $(
            if (*$ty).$slot.is_none() {
                (*$ty).$slot = (*$base).$slot;
            }
        )+
    };
}

/// Resolve a type's base, metatype and inherited slots, once
///
/// # Safety
/// - `addr` must be NULL or point to a `PyTypeObject` whose `tp_base` chain
///   consists of valid type objects
pub unsafe fn ready_type(addr: Address, roots: TypeRoots) -> Result<()> {
    if addr.is_null() {
        return Err(Error::Host { kind: "SystemError", message: "cannot ready a NULL type".into() });
    }

    let ty = addr.as_ptr::<PyTypeObject>();
    let flags = (*ty).flags();
    if flags.contains(TypeFlags::READY) {
        return Ok(());
    }
    if flags.contains(TypeFlags::READYING) {
        return Err(Error::type_error("type inherits from itself"));
    }
    (*ty).set_flags(flags | TypeFlags::READYING);

    if (*ty).ob_type.is_null() && addr != roots.type_ {
        (*ty).ob_type = roots.type_.as_ptr();
    }
    if (*ty).tp_base.is_null() && addr != roots.object {
        (*ty).tp_base = roots.object.as_ptr();
    }

    let base = (*ty).tp_base;
    if !base.is_null() {
        if let Err(err) = ready_type(Address::from_ptr(base), roots) {
            (*ty).set_flags((*ty).flags() - TypeFlags::READYING);
            return Err(err);
        }

        inherit_slots!(
            ty, base, tp_alloc, tp_init, tp_new, tp_dealloc, tp_free, tp_print, tp_repr, tp_str,
            tp_call,
        );
        if (*ty).tp_doc.is_null() {
            (*ty).tp_doc = (*base).tp_doc;
        }
        if (*ty).tp_as_number.is_null() {
            (*ty).tp_as_number = (*base).tp_as_number;
        }
    }

    (*ty).set_flags(((*ty).flags() - TypeFlags::READYING) | TypeFlags::READY);
    trace!(
        target: "types",
        name = abi::read_c_string((*ty).tp_name).as_deref().unwrap_or("?"),
        "type ready"
    );
    Ok(())
}

/// Addresses of the type objects (and `None`) every runtime provides
#[derive(Debug)]
pub struct BuiltinTypes {
    pub type_: Address,
    pub object: Address,
    pub str_: Address,
    pub tuple: Address,
    pub dict: Address,
    pub int: Address,
    pub float: Address,
    pub none_type: Address,
    pub module: Address,
    /// The `None` singleton
    pub none: Address,
    exceptions: Vec<(&'static str, Address)>,
}

static EXCEPTIONS: [(&str, &CStr); 10] = [
    ("Exception", c"Exception"),
    ("ValueError", c"ValueError"),
    ("TypeError", c"TypeError"),
    ("RuntimeError", c"RuntimeError"),
    ("MemoryError", c"MemoryError"),
    ("SystemError", c"SystemError"),
    ("StopIteration", c"StopIteration"),
    ("IndexError", c"IndexError"),
    ("KeyError", c"KeyError"),
    ("AttributeError", c"AttributeError"),
];

impl BuiltinTypes {
    /// Allocate and ready the builtin type objects
    pub fn create(allocator: &dyn Allocator) -> Result<Self> {
        let object = new_type(allocator, c"object", mem::size_of::<PyObject>(), 0)?;
        let type_ = new_type(allocator, c"type", mem::size_of::<PyTypeObject>(), 0)?;

        // SAFETY: both were just allocated as zeroed type objects
        unsafe {
            let root = &mut *object.as_ptr::<PyTypeObject>();
            root.tp_alloc = Some(capi::PyType_GenericAlloc);
            root.tp_new = Some(capi::PyType_GenericNew);
            root.tp_init = Some(capi::PyBaseObject_Init);
            root.tp_dealloc = Some(capi::PyBaseObject_Dealloc);
            root.tp_free = Some(capi::PyObject_Free);

            (*type_.as_ptr::<PyTypeObject>()).ob_type = type_.as_ptr();
        }

        let str_ = new_type(allocator, c"str", PyStringObject::alloc_size(0), 1)?;
        let tuple = new_type(
            allocator,
            c"tuple",
            PyTupleObject::ITEMS_OFFSET,
            mem::size_of::<*mut PyObject>(),
        )?;
        // SAFETY: freshly allocated type object
        unsafe { (*tuple.as_ptr::<PyTypeObject>()).tp_dealloc = Some(capi::PyTuple_Dealloc) };

        let dict = new_type(allocator, c"dict", mem::size_of::<PyObject>(), 0)?;
        let int = new_type(allocator, c"int", mem::size_of::<PyIntObject>(), 0)?;
        let float = new_type(allocator, c"float", mem::size_of::<PyFloatObject>(), 0)?;
        let none_type = new_type(allocator, c"NoneType", mem::size_of::<PyObject>(), 0)?;
        let module = new_type(allocator, c"module", mem::size_of::<PyObject>(), 0)?;

        let exceptions = EXCEPTIONS
            .iter()
            .map(|(name, c_name)| {
                new_type(allocator, *c_name, mem::size_of::<PyObject>(), 0).map(|addr| (*name, addr))
            })
            .collect::<Result<Vec<_>>>()?;

        let none = allocator.alloc_zeroed(mem::size_of::<PyObject>())?;
        // SAFETY: `none` is a fresh header-sized block
        unsafe {
            abi::write_refcnt(none, 1);
            abi::write_type(none, none_type);
        }

        let types = Self { type_, object, str_, tuple, dict, int, float, none_type, module, none, exceptions };
        let roots = types.roots();
        for addr in types.all() {
            // SAFETY: every address is one of the type objects allocated above
            unsafe { ready_type(addr, roots)? };
        }

        debug!(target: "types", count = types.all().count(), "builtin types ready");
        Ok(types)
    }

    /// Bind every builtin type (and `None`) to its host counterpart
    pub fn bind(&self, bridge: &PtrMap<HostObject>, builtins: &HostBuiltins) {
        let pairs = [
            (self.type_, &builtins.type_),
            (self.object, &builtins.object),
            (self.str_, &builtins.str_),
            (self.tuple, &builtins.tuple),
            (self.dict, &builtins.dict),
            (self.int, &builtins.int),
            (self.float, &builtins.float),
            (self.none_type, &builtins.none_type),
            (self.module, &builtins.module),
            (self.none, &builtins.none),
        ];
        for (addr, obj) in pairs {
            bind_class(bridge, addr, obj.clone());
        }

        for (name, addr) in &self.exceptions {
            bind_class(bridge, *addr, HostObject::class(*name, None));
        }
    }

    pub fn roots(&self) -> TypeRoots {
        TypeRoots { object: self.object, type_: self.type_ }
    }

    /// Builtin exception type by name
    pub fn exception(&self, name: &str) -> Option<Address> {
        self.exceptions.iter().find(|(n, _)| *n == name).map(|(_, addr)| *addr)
    }

    fn all(&self) -> impl Iterator<Item = Address> + '_ {
        [
            self.object,
            self.type_,
            self.str_,
            self.tuple,
            self.dict,
            self.int,
            self.float,
            self.none_type,
            self.module,
        ]
        .into_iter()
        .chain(self.exceptions.iter().map(|(_, addr)| *addr))
    }
}

fn bind_class(bridge: &PtrMap<HostObject>, addr: Address, obj: HostObject) {
    if let Some(class) = obj.as_class() {
        let _ = class.native_type.set(addr);
    }
    bridge.associate_owned(addr, obj);
}

fn new_type(
    allocator: &dyn Allocator,
    name: &'static CStr,
    basicsize: usize,
    itemsize: usize,
) -> Result<Address> {
    let addr = allocator.alloc_zeroed(mem::size_of::<PyTypeObject>())?;
    // SAFETY: zeroed block large enough for a type object
    let ty = unsafe { &mut *addr.as_ptr::<PyTypeObject>() };
    ty.ob_refcnt = 1;
    ty.tp_name = name.as_ptr();
    ty.tp_basicsize = basicsize as isize;
    ty.tp_itemsize = itemsize as isize;
    ty.set_flags(TypeFlags::DEFAULT | TypeFlags::BASETYPE);
    Ok(addr)
}

impl Runtime {
    /// `PyType_Ready` against this runtime's root types
    ///
    /// # Safety
    /// - see [`ready_type`]
    pub unsafe fn ready_type(&self, addr: Address) -> Result<()> {
        ready_type(addr, self.types().roots())
    }

    /// Zeroed instance of `type_addr` with room for `nitems` items, refcount 1
    ///
    /// # Safety
    /// - `type_addr` must point to a valid type object
    pub unsafe fn generic_alloc(&self, type_addr: Address, nitems: usize) -> Result<Address> {
        let ty = &*type_addr.as_ptr::<PyTypeObject>();
        let mut size = (ty.tp_basicsize.max(0) as usize).max(mem::size_of::<PyObject>());
        if nitems > 0 {
            let items = nitems
                .checked_mul(ty.tp_itemsize.max(0) as usize)
                .ok_or(Error::Allocation { size: usize::MAX })?;
            size = size.checked_add(items).ok_or(Error::Allocation { size: usize::MAX })?;
        }

        let addr = self.allocator().alloc_zeroed(size)?;
        abi::write_refcnt(addr, 1);
        abi::write_type(addr, type_addr);
        if ty.tp_itemsize != 0 {
            (*addr.as_ptr::<abi::PyVarObject>()).ob_size = nitems as isize;
        }
        Ok(addr)
    }

    /// Default constructor: the type's alloc slot with zero items
    ///
    /// # Safety
    /// - `type_addr` must point to a valid type object
    pub unsafe fn generic_new(&self, type_addr: Address) -> Result<Address> {
        let ty = &*type_addr.as_ptr::<PyTypeObject>();
        let Some(alloc) = ty.tp_alloc else {
            return self.generic_alloc(type_addr, 0);
        };

        let _entered = self.enter();
        let addr = Address::from_ptr(alloc(type_addr.as_ptr(), 0));
        if addr.is_null() {
            self.check_error()?;
            return Err(Error::NullResult { name: "tp_alloc".into() });
        }
        Ok(addr)
    }

    /// Walk `a`'s "type of" chain looking for `b`
    ///
    /// The first step is taken before any comparison, so a class is not its own
    /// subtype unless it is its own metatype. This follows metatypes, not bases.
    /// Addresses without a host class are never subtypes.
    pub fn is_subtype(&self, a: Address, b: Address) -> bool {
        let (Ok(mut current), Ok(target)) = (self.bridge().object_at(a), self.bridge().object_at(b))
        else {
            return false;
        };
        if current.as_class().is_none() || target.as_class().is_none() {
            return false;
        }

        let mut seen: Vec<HostObject> = Vec::new();
        loop {
            let next = self.builtins().type_of(&current);
            if next.ptr_eq(&target) {
                return true;
            }
            if next.ptr_eq(&current) || seen.iter().any(|s| s.ptr_eq(&next)) {
                return false;
            }
            seen.push(current);
            current = next;
        }
    }
}
