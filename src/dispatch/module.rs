//! Module generation - method tables to host functions

use super::dispatcher::split_receiver;
use super::{CallingConvention, Dispatcher, NativeEntry};
use crate::abi::{self, Address, PyMethodDef};
use crate::error::{Error, Result};
use crate::host::{HostFunction, HostObject, HostValue};
use crate::logging::{debug, log_unsupported_method};

/// What a generated shim passes as native `self`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// The same address on every call (module functions)
    Fixed(Address),
    /// The native object behind the host receiver in the first argument
    Instance,
}

impl Dispatcher {
    /// Walk a method table up to its sentinel and build one shim per entry
    ///
    /// Entries whose flags have no calling convention are logged and skipped.
    ///
    /// # Safety
    /// - `methods` must be NULL or point at a sentinel-terminated table
    pub unsafe fn generate_functions(
        &self,
        methods: *const PyMethodDef,
        prefix: &str,
        receiver: Receiver,
    ) -> Result<Vec<(String, HostObject)>> {
        let runtime = self.runtime()?;
        let mut functions = Vec::new();
        if methods.is_null() {
            return Ok(functions);
        }

        let mut cursor = methods;
        while !(*cursor).is_sentinel() {
            let def = *cursor;
            cursor = cursor.add(1);

            let name = abi::read_c_string(def.ml_name).unwrap_or_default();
            let key = format!("{}{}", prefix, name);
            let (convention, meth) = match (CallingConvention::classify(&key, def.ml_flags), def.ml_meth) {
                (Ok(convention), Some(meth)) => (convention, meth),
                _ => {
                    log_unsupported_method(&key, def.ml_flags);
                    continue;
                }
            };

            runtime.dispatch_table().register(key.clone(), NativeEntry::method(convention, meth));
            let shim = self.method_shim(&name, key, abi::read_c_string(def.ml_doc), receiver);
            functions.push((name, shim));
        }
        Ok(functions)
    }

    fn method_shim(&self, name: &str, key: String, doc: Option<String>, receiver: Receiver) -> HostObject {
        let dispatcher = self.clone();
        HostObject::function(HostFunction::new(name, doc, move |args, kwargs| match receiver {
            Receiver::Fixed(addr) => dispatcher.call(&key, addr, args, kwargs),
            Receiver::Instance => {
                let (this, rest) = split_receiver(&key, args)?;
                let addr = dispatcher.receiver_address(this)?;
                dispatcher.call(&key, addr, rest, kwargs)
            }
        }))
    }

    /// `Py_InitModule4`: build and register a module, returning its native object
    ///
    /// # Safety
    /// - `methods` must be NULL or point at a sentinel-terminated table
    pub unsafe fn init_module(
        &self,
        name: &str,
        methods: *const PyMethodDef,
        doc: Option<String>,
        module_self: Address,
    ) -> Result<Address> {
        let runtime = self.runtime()?;
        let functions = self.generate_functions(methods, "", Receiver::Fixed(module_self))?;
        let count = functions.len();

        let module = HostObject::module(name, functions);
        let doc = doc.map(HostObject::str).unwrap_or_else(|| runtime.builtins().none.clone());
        module.set_attr("__doc__", doc);

        let addr = runtime.generic_alloc(runtime.types().module, 0)?;
        runtime.bridge().associate_owned(addr, module.clone());
        runtime.register_module(name, module);

        debug!(target: "dispatch", module = name, functions = count, address = %addr, "initialised module");
        Ok(addr)
    }

    /// `PyModule_AddObject`: make `item` a module variable, taking over its reference
    ///
    /// A type object nothing is bound to yet becomes a generated class.
    ///
    /// # Safety
    /// - `item` must be NULL or a live object header this caller owns a reference to
    pub unsafe fn add_object(&self, module_addr: Address, name: &str, item: Address) -> Result<()> {
        let runtime = self.runtime()?;
        let module = runtime.bridge().object_at(module_addr)?;
        if !matches!(module.value(), HostValue::Module(_)) {
            return Err(Error::type_error(format!("{} is not a module", module_addr)));
        }
        if item.is_null() {
            return Err(Error::Host { kind: "SystemError", message: format!("{} is NULL", name) });
        }

        if !runtime.bridge().has_address(item) && abi::read_type(item) == runtime.types().type_ {
            let class = self.generate_class(item)?;
            module.set_attr(name, class);
            return Ok(());
        }

        let value = runtime.retrieve(item)?;
        module.set_attr(name, value);
        runtime.decref(item)
    }
}
