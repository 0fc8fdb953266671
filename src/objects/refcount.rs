//! Reference counting over object headers
//!
//! Counts live in `ob_refcnt` where native code mutates them directly; the
//! runtime only steps in when a count reaches zero.

use crate::abi::{self, Address, PyTypeObject};
use crate::error::Result;
use crate::logging::trace;
use crate::runtime::Runtime;

impl Runtime {
    /// # Safety
    /// - `addr` must be NULL or a live object header
    #[inline]
    pub unsafe fn incref(&self, addr: Address) {
        if addr.is_null() {
            return;
        }
        abi::write_refcnt(addr, abi::read_refcnt(addr) + 1);
    }

    /// Drop one reference; the last one runs the type's `tp_dealloc`
    ///
    /// Types without a dealloc slot have their block freed directly.
    ///
    /// # Safety
    /// - `addr` must be NULL or a live object header whose type (if any) is a
    ///   valid type object
    pub unsafe fn decref(&self, addr: Address) -> Result<()> {
        if addr.is_null() {
            return Ok(());
        }

        let remaining = abi::read_refcnt(addr) - 1;
        abi::write_refcnt(addr, remaining);
        if remaining > 0 {
            return Ok(());
        }

        let type_addr = abi::read_type(addr);
        let dealloc = if type_addr.is_null() {
            None
        } else {
            (*type_addr.as_ptr::<PyTypeObject>()).tp_dealloc
        };

        trace!(target: "objects", address = %addr, "refcount reached zero");
        match dealloc {
            Some(dealloc) => {
                let _entered = self.enter();
                dealloc(addr.as_ptr());
                Ok(())
            }
            None => self.free_object(addr),
        }
    }

    /// Current `ob_refcnt`, 0 for NULL
    ///
    /// # Safety
    /// - `addr` must be NULL or a live object header
    #[inline]
    pub unsafe fn refcount(&self, addr: Address) -> isize {
        if addr.is_null() {
            0
        } else {
            abi::read_refcnt(addr)
        }
    }

    /// Release any binding of `addr`, then return its block to the allocator
    ///
    /// # Safety
    /// - `addr` must be NULL or a block owned by this runtime's allocator that
    ///   native code no longer uses
    pub unsafe fn free_object(&self, addr: Address) -> Result<()> {
        if addr.is_null() {
            return Ok(());
        }
        if self.bridge().has_address(addr) {
            self.bridge().release(addr)?;
        }
        self.allocator().free(addr)
    }

    /// Base-object deallocation: hand the block to the type's `tp_free`
    ///
    /// # Safety
    /// - `addr` must be an object header whose refcount reached zero
    pub unsafe fn dealloc_object(&self, addr: Address) -> Result<()> {
        let type_addr = abi::read_type(addr);
        let free = if type_addr.is_null() {
            None
        } else {
            (*type_addr.as_ptr::<PyTypeObject>()).tp_free
        };

        match free {
            Some(free) => {
                let _entered = self.enter();
                free(addr.as_ptr());
                Ok(())
            }
            None => self.free_object(addr),
        }
    }
}
