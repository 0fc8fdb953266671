//! Class generation - type descriptors to host classes

use super::dispatcher::split_receiver;
use super::module::Receiver;
use super::{Dispatcher, NativeEntry};
use crate::abi::{self, Address, PyTypeObject, TypeFlags};
use crate::error::{Error, Result};
use crate::host::{HostFunction, HostObject};
use crate::logging::debug;
use crate::runtime::Runtime;

impl Dispatcher {
    /// Host class for a native type; readies the type first
    ///
    /// `tp_name` is split on its last `.` into `__module__` and the class name.
    /// The type object is bound `Owned` to the class.
    ///
    /// # Safety
    /// - `type_addr` must point at a live `PyTypeObject` that outlives the runtime
    pub unsafe fn generate_class(&self, type_addr: Address) -> Result<HostObject> {
        let runtime = self.runtime()?;
        if let Ok(existing) = runtime.bridge().object_at(type_addr) {
            if existing.as_class().is_some() {
                return Ok(existing);
            }
        }

        runtime.ready_type(type_addr)?;
        let ty = &*type_addr.as_ptr::<PyTypeObject>();
        let full_name = abi::read_c_string(ty.tp_name)
            .ok_or_else(|| Error::type_error(format!("type at {} has no name", type_addr)))?;
        let (scope, name) = match full_name.rsplit_once('.') {
            Some((scope, name)) => (Some(scope.to_string()), name.to_string()),
            None => (None, full_name.clone()),
        };

        let class = HostObject::class(name.clone(), None);
        if let Some(info) = class.as_class() {
            let _ = info.native_type.set(type_addr);
        }
        class.set_attr("__name__", HostObject::str(name.clone()));
        if let Some(scope) = scope {
            class.set_attr("__module__", HostObject::str(scope));
        }
        let doc = abi::read_c_string(ty.tp_doc).map(HostObject::str);
        class.set_attr("__doc__", doc.unwrap_or_else(|| runtime.builtins().none.clone()));

        if let Some(new) = ty.tp_new {
            let key = format!("{}.__new__", name);
            runtime.dispatch_table().register(key.clone(), NativeEntry::New(new));
            let dispatcher = self.clone();
            let shim = HostFunction::new("__new__", None, move |args, kwargs| {
                let (cls, rest) = split_receiver(&key, args)?;
                dispatcher.construct(&key, type_addr, cls, rest, kwargs)
            });
            class.set_attr("__new__", HostObject::function(shim));
        }

        if let Some(init) = ty.tp_init {
            let key = format!("{}.__init__", name);
            runtime.dispatch_table().register(key.clone(), NativeEntry::Init(init));
            let dispatcher = self.clone();
            let shim = HostFunction::new("__init__", None, move |args, kwargs| {
                let (this, rest) = split_receiver(&key, args)?;
                dispatcher.initialize(&key, this, rest, kwargs)
            });
            class.set_attr("__init__", HostObject::function(shim));
        }

        let prefix = format!("{}.", name);
        for (method, shim) in self.generate_functions(ty.tp_methods, &prefix, Receiver::Instance)? {
            class.set_attr(method, shim);
        }

        if ty.flags().contains(TypeFlags::HAVE_ITER) {
            if let (Some(iter), Some(next)) = (ty.tp_iter, ty.tp_iternext) {
                class.set_attr("__iter__", self.unary_shim(&runtime, "__iter__", &prefix, iter, false));
                class.set_attr("next", self.unary_shim(&runtime, "next", &prefix, next, true));
            }
        }

        runtime.bridge().associate_owned(type_addr, class.clone());
        debug!(target: "dispatch", class = %full_name, address = %type_addr, "generated class");
        Ok(class)
    }

    fn unary_shim(
        &self,
        runtime: &Runtime,
        slot: &str,
        prefix: &str,
        f: abi::GetIterFunc,
        exhaustible: bool,
    ) -> HostObject {
        let key = format!("{}{}", prefix, slot);
        runtime.dispatch_table().register(key.clone(), NativeEntry::Unary(f));

        let dispatcher = self.clone();
        HostObject::function(HostFunction::new(slot, None, move |args, kwargs| {
            let (this, rest) = split_receiver(&key, args)?;
            if !rest.is_empty() || !kwargs.is_empty() {
                return Err(Error::type_error(format!("{}() takes no arguments", key)));
            }
            dispatcher.call_unary(&key, this, exhaustible)
        }))
    }
}
