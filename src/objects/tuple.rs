//! Tuples - inline item pointers; the tuple owns one reference per item

use crate::abi::{Address, PyObject, PyTupleObject};
use crate::error::{Error, Result};
use crate::logging::warn;
use crate::runtime::Runtime;

#[inline]
fn item_slot(addr: Address, index: usize) -> *mut *mut PyObject {
    addr.offset(PyTupleObject::ITEMS_OFFSET + index * std::mem::size_of::<*mut PyObject>()).as_ptr()
}

impl Runtime {
    /// Tuple of `len` NULL items, refcount 1
    pub fn tuple_new(&self, len: usize) -> Result<Address> {
        let addr = self.allocator().alloc_zeroed(PyTupleObject::alloc_size(len))?;
        // SAFETY: zeroed block sized for the header and `len` item pointers
        unsafe {
            let t = addr.as_ptr::<PyTupleObject>();
            (*t).ob_refcnt = 1;
            (*t).ob_type = self.types().tuple.as_ptr();
            (*t).ob_size = len as isize;
        }
        Ok(addr)
    }

    /// Tuple holding `items`, taking over one reference to each
    ///
    /// If the tuple cannot be allocated the references are dropped instead.
    ///
    /// # Safety
    /// - every item must be NULL or a live object header
    pub unsafe fn tuple_from_items(&self, items: &[Address]) -> Result<Address> {
        let addr = match self.tuple_new(items.len()) {
            Ok(addr) => addr,
            Err(err) => {
                for item in items {
                    let _ = self.decref(*item);
                }
                return Err(err);
            }
        };

        for (index, item) in items.iter().enumerate() {
            *item_slot(addr, index) = item.as_ptr();
        }
        Ok(addr)
    }

    /// # Safety
    /// - `addr` must be a live tuple object
    #[inline]
    pub unsafe fn tuple_len(&self, addr: Address) -> usize {
        (*addr.as_ptr::<PyTupleObject>()).ob_size.max(0) as usize
    }

    /// Borrowed item
    ///
    /// # Safety
    /// - `addr` must be a live tuple object
    pub unsafe fn tuple_item(&self, addr: Address, index: usize) -> Result<Address> {
        if index >= self.tuple_len(addr) {
            return Err(Error::Host { kind: "IndexError", message: "tuple index out of range".into() });
        }
        Ok(Address::from_ptr(*item_slot(addr, index)))
    }

    /// Store `item`, taking over its reference and dropping the previous item's
    ///
    /// # Safety
    /// - `addr` must be a live tuple object; `item` NULL or a live object header
    pub unsafe fn tuple_set_item(&self, addr: Address, index: usize, item: Address) -> Result<()> {
        if index >= self.tuple_len(addr) {
            self.decref(item)?;
            return Err(Error::Host {
                kind: "IndexError",
                message: "tuple assignment index out of range".into(),
            });
        }

        let slot = item_slot(addr, index);
        let previous = Address::from_ptr(*slot);
        *slot = item.as_ptr();
        self.decref(previous)
    }

    /// Drop every item reference, then free the tuple through its type
    ///
    /// # Safety
    /// - `addr` must be a tuple whose refcount reached zero
    pub unsafe fn tuple_dealloc(&self, addr: Address) -> Result<()> {
        for index in 0..self.tuple_len(addr) {
            let slot = item_slot(addr, index);
            let item = Address::from_ptr(*slot);
            *slot = std::ptr::null_mut();
            if let Err(err) = self.decref(item) {
                warn!(target: "objects", tuple = %addr, index, error = %err, "failed to release tuple item");
            }
        }
        self.dealloc_object(addr)
    }
}
