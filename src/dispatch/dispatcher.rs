//! Dispatcher - one native call per host call, with marshaling and cleanup
//!
//! Every call follows the same boundary protocol:
//! 1. enter the runtime and marshal arguments into temporaries
//! 2. call the native entry
//! 3. take the pending error (clearing it), then check for a NULL result
//! 4. retrieve the result as a host value
//! 5. drop every temporary, whichever way the call ended
//! 6. sweep bridged bindings if configured

use super::NativeEntry;
use crate::abi::{Address, PyObject};
use crate::error::{Error, NativeError, Result};
use crate::host::{HostObject, Kwargs};
use crate::logging::{log_dispatch_call, log_dispatch_error, warn};
use crate::runtime::Runtime;
use smallvec::SmallVec;
use std::ptr;
use std::sync::{Arc, Weak};

/// Cheap handle generated shims call through
///
/// Holds the runtime weakly: shims live inside host objects the runtime owns.
#[derive(Clone)]
pub struct Dispatcher {
    runtime: Weak<Runtime>,
}

/// Unmanaged temporaries of one call, released on drop
pub(crate) struct Temps<'rt> {
    runtime: &'rt Runtime,
    held: SmallVec<[Address; 4]>,
}

impl<'rt> Temps<'rt> {
    fn new(runtime: &'rt Runtime) -> Self {
        Self { runtime, held: SmallVec::new() }
    }

    fn store(&mut self, obj: &HostObject) -> Result<Address> {
        let addr = self.runtime.store(obj)?;
        self.held.push(addr);
        Ok(addr)
    }

    fn store_args(&mut self, args: &[HostObject]) -> Result<Address> {
        self.store(&HostObject::tuple(args.to_vec()))
    }

    /// NULL unless there is at least one keyword argument
    fn store_kwargs(&mut self, kwargs: &Kwargs) -> Result<Address> {
        if kwargs.is_empty() {
            return Ok(Address::NULL);
        }
        self.store(&HostObject::dict(kwargs.to_vec()))
    }

    /// Take ownership of a reference native code handed back
    fn adopt(&mut self, addr: Address) {
        if !addr.is_null() {
            self.held.push(addr);
        }
    }

    /// Error check and result retrieval for a new-reference result
    unsafe fn finish(&mut self, key: &str, result: *mut PyObject) -> Result<HostObject> {
        let addr = Address::from_ptr(result);
        self.adopt(addr);
        self.runtime.check_error()?;
        if addr.is_null() {
            return Err(Error::NullResult { name: key.to_string() });
        }
        self.runtime.retrieve(addr)
    }
}

impl Drop for Temps<'_> {
    fn drop(&mut self) {
        for addr in self.held.drain(..) {
            // SAFETY: every held address is a reference this call owns
            if let Err(err) = unsafe { self.runtime.decref(addr) } {
                warn!(target: "dispatch", address = %addr, error = %err, "failed to release temporary");
            }
        }
    }
}

impl Dispatcher {
    pub(crate) fn new(runtime: Weak<Runtime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> Result<Arc<Runtime>> {
        self.runtime.upgrade().ok_or_else(|| Error::runtime_error("extension runtime has been dropped"))
    }

    /// Native address standing behind a host receiver
    pub fn receiver_address(&self, receiver: &HostObject) -> Result<Address> {
        let runtime = self.runtime()?;
        let addr = runtime.bridge().address_of(receiver);
        addr.map_err(|_| Error::type_error(format!("{:?} has no native object", receiver)))
    }

    /// Run `body` as one boundary crossing
    fn boundary<F>(&self, runtime: &Runtime, key: &str, nargs: usize, body: F) -> Result<HostObject>
    where
        F: FnOnce(&mut Temps<'_>) -> Result<HostObject>,
    {
        log_dispatch_call(key, nargs);
        let outcome = {
            let _entered = runtime.enter();
            let mut temps = Temps::new(runtime);
            body(&mut temps)
        };

        let swept = if runtime.config().bridge.sweep_on_boundary {
            runtime.sweep().map(drop)
        } else {
            Ok(())
        };

        if let Err(err) = &outcome {
            log_dispatch_error(key, &err.to_string());
        }
        let value = outcome?;
        swept?;
        Ok(value)
    }

    /// Call a method-table entry with `receiver` as native `self`
    pub fn call(
        &self,
        key: &str,
        receiver: Address,
        args: &[HostObject],
        kwargs: &Kwargs,
    ) -> Result<HostObject> {
        let runtime = self.runtime()?;
        let entry = runtime.dispatch_table().get(key)?;
        let convention = entry
            .convention()
            .ok_or_else(|| Error::lookup(format_args!("{} is not a method entry", key)))?;
        convention.check_arity(key, args.len(), kwargs.len())?;

        let this = receiver.as_ptr::<PyObject>();
        self.boundary(&runtime, key, args.len(), |temps| unsafe {
            let result = match entry {
                NativeEntry::NoArgs(f) => f(this, ptr::null_mut()),
                NativeEntry::OneArg(f) => {
                    let arg = temps.store(&args[0])?;
                    f(this, arg.as_ptr())
                }
                NativeEntry::VarArgs(f) => {
                    let tuple = temps.store_args(args)?;
                    f(this, tuple.as_ptr())
                }
                NativeEntry::VarArgsKeywords(f) => {
                    let tuple = temps.store_args(args)?;
                    let kw = temps.store_kwargs(kwargs)?;
                    f(this, tuple.as_ptr(), kw.as_ptr())
                }
                NativeEntry::Unary(_) | NativeEntry::New(_) | NativeEntry::Init(_) => {
                    return Err(Error::lookup(format_args!("{} is not a method entry", key)))
                }
            };
            temps.finish(key, result)
        })
    }

    /// Call `tp_iter` or `tp_iternext` on `receiver`
    ///
    /// With `exhaustible`, a NULL result without a pending error is `StopIteration`.
    pub fn call_unary(&self, key: &str, receiver: &HostObject, exhaustible: bool) -> Result<HostObject> {
        let runtime = self.runtime()?;
        let NativeEntry::Unary(f) = runtime.dispatch_table().get(key)? else {
            return Err(Error::lookup(format_args!("{} is not an iterator entry", key)));
        };
        let this = self.receiver_address(receiver)?;

        self.boundary(&runtime, key, 0, |temps| unsafe {
            let result = f(this.as_ptr());
            if result.is_null() && exhaustible && !runtime.has_error() {
                return Err(Error::StopIteration);
            }
            temps.finish(key, result)
        })
    }

    /// `tp_new(type, args, kwargs)`; the new object is bound `Bridged` to a fresh instance of `class`
    pub fn construct(
        &self,
        key: &str,
        type_addr: Address,
        class: &HostObject,
        args: &[HostObject],
        kwargs: &Kwargs,
    ) -> Result<HostObject> {
        let runtime = self.runtime()?;
        let NativeEntry::New(new) = runtime.dispatch_table().get(key)? else {
            return Err(Error::lookup(format_args!("{} is not a constructor entry", key)));
        };

        self.boundary(&runtime, key, args.len(), |temps| unsafe {
            let tuple = temps.store_args(args)?;
            let kw = temps.store_kwargs(kwargs)?;
            let addr = Address::from_ptr(new(type_addr.as_ptr(), tuple.as_ptr(), kw.as_ptr()));

            if let Err(err) = runtime.check_error() {
                temps.adopt(addr);
                return Err(err);
            }
            if addr.is_null() {
                return Err(Error::NullResult { name: key.to_string() });
            }

            let instance = HostObject::instance(class);
            self.attach(&runtime, &instance, addr);
            Ok(instance)
        })
    }

    /// `tp_init(self, args, kwargs)`; on failure the instance's native reference is dropped
    pub fn initialize(
        &self,
        key: &str,
        instance: &HostObject,
        args: &[HostObject],
        kwargs: &Kwargs,
    ) -> Result<HostObject> {
        let runtime = self.runtime()?;
        let NativeEntry::Init(init) = runtime.dispatch_table().get(key)? else {
            return Err(Error::lookup(format_args!("{} is not an initializer entry", key)));
        };
        let this = self.receiver_address(instance)?;

        self.boundary(&runtime, key, args.len(), |temps| unsafe {
            let tuple = temps.store_args(args)?;
            let kw = temps.store_kwargs(kwargs)?;

            if init(this.as_ptr(), tuple.as_ptr(), kw.as_ptr()) == -1 {
                if let Some(info) = instance.as_instance() {
                    info.clear_finalizer();
                }
                let pending = runtime.take_error();
                runtime.decref(this)?;
                return Err(Error::Native(pending.unwrap_or_else(|| {
                    NativeError::new("SystemError", format!("{} failed without setting an error", key))
                })));
            }

            runtime.check_error()?;
            Ok(runtime.builtins().none.clone())
        })
    }

    /// Record `addr` on `instance` and bind it `Bridged`
    ///
    /// When the host reclaims the instance, the binding goes away and the
    /// instance's native reference is dropped.
    fn attach(&self, runtime: &Runtime, instance: &HostObject, addr: Address) {
        if let Some(info) = instance.as_instance() {
            let _ = info.native.set(addr);
            let weak = runtime.weak();
            info.set_finalizer(Box::new(move || {
                if let Some(runtime) = weak.upgrade() {
                    release_instance(&runtime, addr);
                }
            }));
        }
        runtime.bridge().associate_bridged(addr, instance);
    }
}

fn release_instance(runtime: &Runtime, addr: Address) {
    // Only a binding whose referent is gone belongs to the instance being reclaimed
    if !matches!(runtime.bridge().object_at(addr), Err(Error::PrematureCollection { .. })) {
        return;
    }
    if runtime.bridge().release(addr).is_ok() {
        // SAFETY: the instance held one reference to this live object
        if let Err(err) = unsafe { runtime.decref(addr) } {
            warn!(target: "dispatch", address = %addr, error = %err, "failed to release instance");
        }
    }
}

/// Split `self` off the front of a method call's arguments
pub(crate) fn split_receiver<'a>(
    key: &str,
    args: &'a [HostObject],
) -> Result<(&'a HostObject, &'a [HostObject])> {
    args.split_first()
        .ok_or_else(|| Error::type_error(format!("{}() needs a receiver argument", key)))
}
