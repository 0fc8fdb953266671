//! Byte strings - inline payload, NUL-terminated one byte past `ob_size`

use crate::abi::{Address, PyStringObject};
use crate::bridge::Ownership;
use crate::error::{Error, Result};
use crate::logging::debug;
use crate::runtime::Runtime;
use std::ptr;

/// First payload byte of the string at `addr`
#[inline]
pub(crate) fn payload(addr: Address) -> *mut u8 {
    addr.offset(PyStringObject::PAYLOAD_OFFSET).as_ptr()
}

/// Bytes to text, one char per byte
pub fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Text to bytes; characters past U+00FF have no byte representation
pub fn latin1_encode(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| {
            u8::try_from(u32::from(c)).map_err(|_| {
                Error::type_error(format!("character {:?} cannot be passed as a byte string", c))
            })
        })
        .collect()
}

impl Runtime {
    /// New string of `len` zero bytes, refcount 1
    pub fn string_alloc(&self, len: usize) -> Result<Address> {
        let addr = self.allocator().alloc_zeroed(PyStringObject::alloc_size(len))?;
        // SAFETY: zeroed block sized for the header, `len` bytes and the terminator
        unsafe {
            let s = addr.as_ptr::<PyStringObject>();
            (*s).ob_refcnt = 1;
            (*s).ob_type = self.types().str_.as_ptr();
            (*s).ob_size = len as isize;
            (*s).ob_shash = -1;
        }
        Ok(addr)
    }

    pub fn string_from_bytes(&self, bytes: &[u8]) -> Result<Address> {
        let addr = self.string_alloc(bytes.len())?;
        // SAFETY: the payload has room for `bytes.len()` bytes
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), payload(addr), bytes.len()) };
        Ok(addr)
    }

    /// Resize in place or by relocation, keeping the common prefix
    ///
    /// On failure the original string is freed, `*addr` becomes NULL and a
    /// `MemoryError` is left pending, matching `_PyString_Resize`. An `Owned`
    /// binding is dropped, since its host text no longer matches the payload;
    /// the next `retrieve` actualises the new bytes. A `Bridged` binding
    /// follows a relocated block.
    ///
    /// # Safety
    /// - `*addr` must be a string object allocated by this runtime that
    ///   nothing else references
    pub unsafe fn string_resize(&self, addr: &mut Address, len: usize) -> Result<()> {
        let old = *addr;
        let resized = match self.allocator().realloc(old, PyStringObject::alloc_size(len)) {
            Ok(resized) => resized,
            Err(err) => {
                debug!(target: "objects", address = %old, len, "string resize failed");
                let _ = self.free_object(old);
                *addr = Address::NULL;
                self.raise("MemoryError", format!("cannot resize string to {} bytes", len));
                return Err(err);
            }
        };

        match self.bridge().ownership(old) {
            Some(Ownership::Owned) => self.bridge().release(old)?,
            Some(Ownership::Bridged) if resized != old => {
                let obj = self.bridge().object_at(old)?;
                self.bridge().release(old)?;
                self.bridge().associate_bridged(resized, &obj);
            }
            _ => {}
        }

        let s = resized.as_ptr::<PyStringObject>();
        (*s).ob_size = len as isize;
        (*s).ob_shash = -1;
        *payload(resized).add(len) = 0;
        *addr = resized;
        Ok(())
    }

    /// # Safety
    /// - `addr` must be a live string object
    #[inline]
    pub unsafe fn string_size(&self, addr: Address) -> usize {
        (*addr.as_ptr::<PyStringObject>()).ob_size.max(0) as usize
    }

    /// Copy of the payload, without the terminator
    ///
    /// # Safety
    /// - `addr` must be a live string object
    pub unsafe fn string_bytes(&self, addr: Address) -> Vec<u8> {
        std::slice::from_raw_parts(payload(addr), self.string_size(addr)).to_vec()
    }
}
