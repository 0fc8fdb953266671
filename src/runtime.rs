//! Runtime - the state one embedding shares with its extension modules
//!
//! Design: A `Runtime` owns exactly one allocator, one bridge, the builtin type
//! objects and the pending native error. It is always handled as
//! `Arc<Runtime>` and passed explicitly; native code, which cannot be handed a
//! Rust reference, reaches it through the runtime entered on the current
//! thread (`enter` / `current`).

use crate::abi::{self, Address, PyTypeObject};
use crate::allocator::{Allocator, HeapAllocator};
use crate::bridge::{PtrMap, SweepStats};
use crate::config::RuntimeConfig;
use crate::dispatch::{DispatchTable, Dispatcher};
use crate::error::{Error, NativeError, Result};
use crate::host::{HostBuiltins, HostObject};
use crate::logging::{debug, info};
use crate::objects::BuiltinTypes;
use parking_lot::{Mutex, RwLock};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

thread_local! {
    static ENTERED: RefCell<Vec<Arc<Runtime>>> = const { RefCell::new(Vec::new()) };
}

/// Error set by native code and not yet consumed
#[derive(Debug, Clone, PartialEq)]
pub struct PendingError {
    /// Exception type object the error was raised with
    pub exc_type: Address,
    pub error: NativeError,
}

pub struct Runtime {
    this: Weak<Runtime>,
    config: RuntimeConfig,
    bridge: PtrMap<HostObject>,
    builtins: HostBuiltins,
    types: BuiltinTypes,
    dispatch: DispatchTable,
    modules: RwLock<HashMap<String, HostObject>>,
    pending: Mutex<Option<PendingError>>,
    // Declared last so every object above is released before the memory behind it
    allocator: Box<dyn Allocator>,
}

impl Runtime {
    /// Runtime over the system heap, capped by `memory.limit_bytes` when set
    pub fn new(config: RuntimeConfig) -> Result<Arc<Self>> {
        let allocator: Box<dyn Allocator> = match config.memory.limit_bytes {
            Some(limit) => Box::new(HeapAllocator::with_limit(limit)),
            None => Box::new(HeapAllocator::new()),
        };
        Self::with_allocator(config, allocator)
    }

    pub fn with_allocator(config: RuntimeConfig, allocator: Box<dyn Allocator>) -> Result<Arc<Self>> {
        let bridge = PtrMap::new();
        let builtins = HostBuiltins::new();
        let types = BuiltinTypes::create(allocator.as_ref())?;
        types.bind(&bridge, &builtins);

        info!(
            target: "runtime",
            sweep_on_boundary = config.bridge.sweep_on_boundary,
            policy = ?config.bridge.sweep_policy,
            "runtime created"
        );

        Ok(Arc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            bridge,
            builtins,
            types,
            dispatch: DispatchTable::new(),
            modules: RwLock::new(HashMap::new()),
            pending: Mutex::new(None),
            allocator,
        }))
    }

    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[inline]
    pub fn bridge(&self) -> &PtrMap<HostObject> {
        &self.bridge
    }

    #[inline]
    pub fn builtins(&self) -> &HostBuiltins {
        &self.builtins
    }

    #[inline]
    pub fn types(&self) -> &BuiltinTypes {
        &self.types
    }

    #[inline]
    pub fn allocator(&self) -> &dyn Allocator {
        self.allocator.as_ref()
    }

    #[inline]
    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.dispatch
    }

    /// Handle used by generated shims; it does not keep the runtime alive
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.this.clone())
    }

    pub(crate) fn weak(&self) -> Weak<Runtime> {
        self.this.clone()
    }

    // ===== Entered runtime =====

    /// Make this runtime the one native code on this thread talks to
    ///
    /// Entries nest; the guard restores the previous runtime on drop.
    pub fn enter(&self) -> RuntimeGuard {
        let pushed = match self.this.upgrade() {
            Some(runtime) => {
                ENTERED.with(|stack| stack.borrow_mut().push(runtime));
                true
            }
            None => false,
        };
        RuntimeGuard { pushed, _not_send: PhantomData }
    }

    /// Innermost runtime entered on this thread
    pub fn current() -> Option<Arc<Runtime>> {
        ENTERED.with(|stack| stack.borrow().last().cloned())
    }

    // ===== Pending native error =====

    /// Record an error raised with the exception type object `exc_type`
    pub fn set_error(&self, exc_type: Address, message: impl Into<String>) {
        let kind = self.type_name(exc_type).unwrap_or_else(|| "SystemError".to_string());
        let error = NativeError::new(kind, message);
        debug!(target: "runtime", error = %error, "native error set");
        *self.pending.lock() = Some(PendingError { exc_type, error });
    }

    /// Record an error of a builtin exception kind; unknown kinds become `SystemError`
    pub fn raise(&self, kind: &str, message: impl Into<String>) {
        let exc_type = self
            .types
            .exception(kind)
            .or_else(|| self.types.exception("SystemError"))
            .unwrap_or(Address::NULL);
        self.set_error(exc_type, message);
    }

    /// Translate a crate error into the pending error native code will observe
    pub fn raise_error(&self, err: &Error) {
        match err {
            Error::Native(native) => self.raise(&native.kind, native.message.clone()),
            Error::Allocation { .. } => self.raise("MemoryError", err.to_string()),
            Error::StopIteration => self.raise("StopIteration", ""),
            Error::Host { kind, message } => self.raise(kind, message.clone()),
            _ => self.raise("SystemError", err.to_string()),
        }
    }

    /// Remove and return the pending error
    pub fn take_error(&self) -> Option<NativeError> {
        self.pending.lock().take().map(|pending| pending.error)
    }

    pub fn pending_error(&self) -> Option<PendingError> {
        self.pending.lock().clone()
    }

    pub fn has_error(&self) -> bool {
        self.pending.lock().is_some()
    }

    pub fn clear_error(&self) {
        self.pending.lock().take();
    }

    /// Take the pending error as a `Native` failure
    pub(crate) fn check_error(&self) -> Result<()> {
        match self.take_error() {
            Some(err) => Err(Error::Native(err)),
            None => Ok(()),
        }
    }

    fn type_name(&self, type_addr: Address) -> Option<String> {
        if type_addr.is_null() {
            return None;
        }
        // SAFETY: exception types are type objects; tp_name is a C string or NULL
        unsafe { abi::read_c_string((*type_addr.as_ptr::<PyTypeObject>()).tp_name) }
    }

    // ===== Modules =====

    pub fn module(&self, name: &str) -> Option<HostObject> {
        self.modules.read().get(name).cloned()
    }

    pub(crate) fn register_module(&self, name: &str, module: HostObject) {
        self.modules.write().insert(name.to_string(), module);
    }

    /// Run an extension's init function and return the module it created
    pub fn load_module(&self, name: &str, init: unsafe extern "C" fn()) -> Result<HostObject> {
        {
            let _entered = self.enter();
            // SAFETY: init functions take no arguments and report failure through the error slot
            unsafe { init() };
        }
        self.check_error()?;
        self.module(name)
            .ok_or_else(|| Error::lookup(format_args!("init function did not create module {}", name)))
    }

    // ===== Safe points =====

    /// Re-evaluate every bridged binding under the configured policy
    pub fn sweep(&self) -> Result<SweepStats> {
        self.bridge.sweep_bridged(self.config.bridge.sweep_policy)
    }
}

/// Keeps a runtime entered on this thread; not transferable across threads
pub struct RuntimeGuard {
    pushed: bool,
    _not_send: PhantomData<*const ()>,
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        if self.pushed {
            // Popped outside the borrow: the last handle may be dropped here
            let popped = ENTERED.with(|stack| stack.borrow_mut().pop());
            drop(popped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_nests_and_restores() {
        let outer = Runtime::new(RuntimeConfig::default()).unwrap();
        let inner = Runtime::new(RuntimeConfig::default()).unwrap();
        assert!(Runtime::current().is_none());

        {
            let _a = outer.enter();
            assert!(Arc::ptr_eq(&Runtime::current().unwrap(), &outer));
            {
                let _b = inner.enter();
                assert!(Arc::ptr_eq(&Runtime::current().unwrap(), &inner));
            }
            assert!(Arc::ptr_eq(&Runtime::current().unwrap(), &outer));
        }
        assert!(Runtime::current().is_none());
    }

    #[test]
    fn pending_error_is_named_after_type() {
        let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
        let value_error = runtime.types().exception("ValueError").unwrap();

        runtime.set_error(value_error, "bad value");
        assert!(runtime.has_error());
        assert_eq!(runtime.pending_error().unwrap().exc_type, value_error);

        let err = runtime.take_error().unwrap();
        assert_eq!(err, NativeError::new("ValueError", "bad value"));
        assert!(!runtime.has_error());
    }

    #[test]
    fn unknown_kind_raises_system_error() {
        let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
        runtime.raise("NoSuchError", "?");
        assert_eq!(runtime.take_error().unwrap().kind, "SystemError");

        runtime.raise_error(&Error::Allocation { size: 8 });
        assert_eq!(runtime.take_error().unwrap().kind, "MemoryError");
    }

    #[test]
    fn config_limit_caps_allocator() {
        let mut config = RuntimeConfig::default();
        config.memory.limit_bytes = Some(64 * 1024);
        let runtime = Runtime::new(config).unwrap();

        assert!(runtime.allocator().alloc(1 << 20).is_err());
        let addr = runtime.allocator().alloc(16).unwrap();
        runtime.allocator().free(addr).unwrap();
    }
}
