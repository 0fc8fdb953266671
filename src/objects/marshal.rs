//! Marshaling - host values to native objects and back
//!
//! `store` always hands out a new reference. `retrieve` resolves bound
//! addresses through the bridge and actualises unbound objects that native
//! code built itself (strings, tuples, ints, floats), binding them `Owned`.

use super::string::{latin1_decode, latin1_encode};
use crate::abi::{self, Address, PyFloatObject, PyIntObject};
use crate::error::{Error, Result};
use crate::host::{HostObject, HostValue};
use crate::logging::trace;
use crate::runtime::Runtime;

impl Runtime {
    /// Native object for `obj`, as a new reference
    ///
    /// Bools become int objects. The new object is bound `Owned` to `obj`, so
    /// `retrieve` hands back the original `Bool` while the native object lives;
    /// only an unbound int read back by actualisation comes out as an `Int`.
    pub fn store(&self, obj: &HostObject) -> Result<Address> {
        if let Ok(addr) = self.bridge().address_of(obj) {
            // SAFETY: bound addresses are live object headers
            unsafe { self.incref(addr) };
            return Ok(addr);
        }

        // SAFETY: builtin type objects live as long as the runtime
        let addr = match obj.value() {
            HostValue::None => {
                let none = self.types().none;
                unsafe { self.incref(none) };
                return Ok(none);
            }
            HostValue::Str(text) => self.string_from_bytes(&latin1_encode(text)?)?,
            HostValue::Tuple(items) => self.store_tuple(items)?,
            HostValue::Bool(value) => self.int_new(*value as i64)?,
            HostValue::Int(value) => self.int_new(*value)?,
            HostValue::Float(value) => self.float_new(*value)?,
            HostValue::Dict(_) => unsafe { self.generic_alloc(self.types().dict, 0)? },
            HostValue::Module(_) => unsafe { self.generic_alloc(self.types().module, 0)? },
            HostValue::Class(_) => unsafe { self.generic_alloc(self.types().type_, 0)? },
            HostValue::Function(_) | HostValue::Instance(_) => unsafe {
                self.generic_alloc(self.types().object, 0)?
            },
        };

        trace!(target: "marshal", address = %addr, kind = obj.kind(), "stored host value");
        self.bridge().associate_owned(addr, obj.clone());
        Ok(addr)
    }

    fn store_tuple(&self, items: &[HostObject]) -> Result<Address> {
        let mut stored = Vec::with_capacity(items.len());
        for item in items {
            match self.store(item) {
                Ok(addr) => stored.push(addr),
                Err(err) => {
                    for addr in stored {
                        // SAFETY: each was returned by `store` as a new reference
                        let _ = unsafe { self.decref(addr) };
                    }
                    return Err(err);
                }
            }
        }
        // SAFETY: every item is a new reference from `store`
        unsafe { self.tuple_from_items(&stored) }
    }

    pub fn int_new(&self, value: i64) -> Result<Address> {
        // SAFETY: the int type object lives as long as the runtime
        let addr = unsafe { self.generic_alloc(self.types().int, 0)? };
        unsafe { (*addr.as_ptr::<PyIntObject>()).ob_ival = value as _ };
        Ok(addr)
    }

    pub fn float_new(&self, value: f64) -> Result<Address> {
        // SAFETY: the float type object lives as long as the runtime
        let addr = unsafe { self.generic_alloc(self.types().float, 0)? };
        unsafe { (*addr.as_ptr::<PyFloatObject>()).ob_fval = value };
        Ok(addr)
    }

    /// Host value for a native object
    ///
    /// # Safety
    /// - `addr` must be bound or a live object header of a builtin type
    pub unsafe fn retrieve(&self, addr: Address) -> Result<HostObject> {
        if addr.is_null() {
            return Err(Error::lookup("cannot retrieve NULL"));
        }
        if self.bridge().has_address(addr) {
            return self.bridge().object_at(addr);
        }

        let obj = self.actualise(addr)?;
        trace!(target: "marshal", address = %addr, kind = obj.kind(), "actualised native object");
        self.bridge().associate_owned(addr, obj.clone());
        Ok(obj)
    }

    unsafe fn actualise(&self, addr: Address) -> Result<HostObject> {
        let types = self.types();
        let type_addr = abi::read_type(addr);

        if type_addr == types.str_ {
            Ok(HostObject::str(latin1_decode(&self.string_bytes(addr))))
        } else if type_addr == types.tuple {
            let items = (0..self.tuple_len(addr))
                .map(|index| self.retrieve(self.tuple_item(addr, index)?))
                .collect::<Result<Vec<_>>>()?;
            Ok(HostObject::tuple(items))
        } else if type_addr == types.int {
            Ok(HostObject::int((*addr.as_ptr::<PyIntObject>()).ob_ival as i64))
        } else if type_addr == types.float {
            Ok(HostObject::float((*addr.as_ptr::<PyFloatObject>()).ob_fval))
        } else {
            Err(Error::lookup(format_args!("no host object for {}", addr)))
        }
    }
}
