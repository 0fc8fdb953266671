//! Address/object map with owned and bridged bindings

use super::{HostRef, WeakHandle};
use crate::abi::{self, Address};
use crate::config::SweepPolicy;
use crate::error::{Error, Result};
use crate::logging::{log_sweep_complete, trace, warn};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::collections::HashMap;

/// How a binding keeps its host object alive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The binding itself holds the object
    Owned,
    /// The host owns the object; the native refcount decides whether it is pinned
    Bridged,
}

/// Pin state of a bridged object after a strength update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    Strong,
    Weak,
}

/// Outcome of one strength sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub visited: usize,
    pub strong: usize,
    pub weak: usize,
    /// Entries whose object was already reclaimed (isolate policy only)
    pub collected: usize,
}

struct Tables<T: HostRef> {
    owned: HashMap<Address, T>,
    bridged: HashMap<Address, (T::Weak, usize)>,
    by_identity: HashMap<usize, Address>,
    /// Bridged objects currently pinned against host reclamation
    strong: HashMap<usize, T>,
}

/// Values detached from the tables, dropped once the tables are no longer borrowed
enum Unbound<T> {
    Owned(T),
    Bridged(Option<T>),
}

impl<T: HostRef> Tables<T> {
    fn new() -> Self {
        Self {
            owned: HashMap::new(),
            bridged: HashMap::new(),
            by_identity: HashMap::new(),
            strong: HashMap::new(),
        }
    }

    fn address_of(&self, obj: &T) -> Option<Address> {
        let id = obj.identity();
        let addr = *self.by_identity.get(&id)?;
        if self.owned.contains_key(&addr) {
            return Some(addr);
        }

        // A reclaimed object's identity can be reused; only a live referent counts
        let (weak, _) = self.bridged.get(&addr)?;
        match weak.upgrade() {
            Some(live) if live.identity() == id => Some(addr),
            _ => None,
        }
    }

    fn forget_identity(&mut self, id: usize, addr: Address) {
        if self.by_identity.get(&id) == Some(&addr) {
            self.by_identity.remove(&id);
        }
    }

    fn unbind(&mut self, addr: Address) -> Option<Unbound<T>> {
        if let Some(obj) = self.owned.remove(&addr) {
            self.forget_identity(obj.identity(), addr);
            return Some(Unbound::Owned(obj));
        }

        // A reclaimed referent cannot still be pinned, so no liveness check is needed
        let (_, id) = self.bridged.remove(&addr)?;
        self.forget_identity(id, addr);
        Some(Unbound::Bridged(self.strong.remove(&id)))
    }

    fn unbind_object(&mut self, obj: &T) -> Option<Unbound<T>> {
        let addr = self.address_of(obj)?;
        self.unbind(addr)
    }
}

/// Bidirectional map between unmanaged addresses and host objects
///
/// Every operation runs under one reentrant lock, so a `for_each_bridged`
/// callback may release bindings on the same thread. The `RefCell` is never
/// borrowed across a callback.
pub struct PtrMap<T: HostRef> {
    tables: ReentrantMutex<RefCell<Tables<T>>>,
}

impl<T: HostRef> PtrMap<T> {
    pub fn new() -> Self {
        Self { tables: ReentrantMutex::new(RefCell::new(Tables::new())) }
    }

    /// Bind `addr` to `obj`, keeping `obj` alive for as long as the binding exists
    ///
    /// Any previous binding of either `addr` or `obj` is removed first.
    pub fn associate_owned(&self, addr: Address, obj: T) {
        let guard = self.tables.lock();
        let displaced = {
            let mut tables = guard.borrow_mut();
            let displaced = (tables.unbind(addr), tables.unbind_object(&obj));
            tables.by_identity.insert(obj.identity(), addr);
            tables.owned.insert(addr, obj);
            displaced
        };
        trace!(target: "bridge", address = %addr, "owned binding created");
        drop(displaced);
    }

    /// Bind `addr` to `obj` through a weak handle
    ///
    /// The object starts pinned; the first strength update decides whether it stays so.
    pub fn associate_bridged(&self, addr: Address, obj: &T) {
        let guard = self.tables.lock();
        let displaced = {
            let mut tables = guard.borrow_mut();
            let displaced = (tables.unbind(addr), tables.unbind_object(obj));
            let id = obj.identity();
            tables.by_identity.insert(id, addr);
            tables.bridged.insert(addr, (obj.downgrade(), id));
            tables.strong.insert(id, obj.clone());
            displaced
        };
        trace!(target: "bridge", address = %addr, "bridged binding created");
        drop(displaced);
    }

    /// Pin or unpin a bridged object from the refcount in its native header
    ///
    /// Owned bindings are always strong. Bridged addresses must still point at a
    /// live object header, which holds until the binding is released.
    pub fn update_strength(&self, addr: Address) -> Result<Strength> {
        let guard = self.tables.lock();
        let (strength, unpinned) = {
            let mut tables = guard.borrow_mut();
            if tables.owned.contains_key(&addr) {
                return Ok(Strength::Strong);
            }

            let (weak, id) = tables
                .bridged
                .get(&addr)
                .cloned()
                .ok_or_else(|| Error::lookup(format_args!("no binding for {}", addr)))?;
            let obj = weak.upgrade().ok_or(Error::PrematureCollection { address: addr })?;

            // SAFETY: bridged addresses are live object headers until released
            let refcnt = unsafe { abi::read_refcnt(addr) };
            if refcnt > 1 {
                tables.strong.insert(id, obj);
                (Strength::Strong, None)
            } else {
                tables.strong.remove(&id);
                (Strength::Weak, Some(obj))
            }
        };

        // Unpinning may drop the last strong handle, whose finalizer can re-enter the map
        drop(unpinned);
        Ok(strength)
    }

    /// Apply `f` to a snapshot of the bridged addresses
    ///
    /// `f` may add or release bindings; iteration is over the snapshot taken
    /// before the first call. Stops at the first error.
    pub fn for_each_bridged<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Address) -> Result<()>,
    {
        let guard = self.tables.lock();
        let snapshot = {
            let tables = guard.borrow();
            let mut addrs: Vec<Address> = tables.bridged.keys().copied().collect();
            addrs.sort_unstable();
            addrs
        };

        for addr in snapshot {
            f(addr)?;
        }
        drop(guard);
        Ok(())
    }

    /// Update the strength of every bridged binding present at sweep start
    ///
    /// Bindings released while the sweep runs are skipped.
    pub fn sweep_bridged(&self, policy: SweepPolicy) -> Result<SweepStats> {
        let mut stats = SweepStats::default();

        self.for_each_bridged(|addr| {
            if self.ownership(addr) != Some(Ownership::Bridged) {
                return Ok(());
            }
            stats.visited += 1;

            match self.update_strength(addr) {
                Ok(Strength::Strong) => stats.strong += 1,
                Ok(Strength::Weak) => stats.weak += 1,
                Err(err @ Error::PrematureCollection { .. }) => match policy {
                    SweepPolicy::FailFast => return Err(err),
                    SweepPolicy::Isolate => {
                        warn!(target: "bridge", address = %addr, "bridged object reclaimed early");
                        stats.collected += 1;
                    }
                },
                Err(err) => return Err(err),
            }
            Ok(())
        })?;

        log_sweep_complete(stats.visited, stats.strong, stats.collected);
        Ok(stats)
    }

    /// Remove the binding for `addr` in both directions
    pub fn release(&self, addr: Address) -> Result<()> {
        let guard = self.tables.lock();
        let unbound = guard.borrow_mut().unbind(addr);
        match unbound {
            Some(unbound) => {
                trace!(target: "bridge", address = %addr, "binding released");
                drop(unbound);
                Ok(())
            }
            None => Err(Error::lookup(format_args!("tried to release unmapped address {}", addr))),
        }
    }

    pub fn has_object(&self, obj: &T) -> bool {
        let guard = self.tables.lock();
        let found = guard.borrow().address_of(obj).is_some();
        found
    }

    pub fn address_of(&self, obj: &T) -> Result<Address> {
        let guard = self.tables.lock();
        let found = guard.borrow().address_of(obj);
        found.ok_or_else(|| Error::lookup("no address bound to object"))
    }

    pub fn has_address(&self, addr: Address) -> bool {
        self.ownership(addr).is_some()
    }

    pub fn ownership(&self, addr: Address) -> Option<Ownership> {
        let guard = self.tables.lock();
        let tables = guard.borrow();
        if tables.owned.contains_key(&addr) {
            Some(Ownership::Owned)
        } else if tables.bridged.contains_key(&addr) {
            Some(Ownership::Bridged)
        } else {
            None
        }
    }

    /// Object bound to `addr`
    ///
    /// A bridged object the host already reclaimed is a `PrematureCollection`,
    /// distinct from an unbound address.
    pub fn object_at(&self, addr: Address) -> Result<T> {
        let guard = self.tables.lock();
        let tables = guard.borrow();
        if let Some(obj) = tables.owned.get(&addr) {
            return Ok(obj.clone());
        }
        match tables.bridged.get(&addr) {
            Some((weak, _)) => weak.upgrade().ok_or(Error::PrematureCollection { address: addr }),
            None => Err(Error::lookup(format_args!("no object bound to {}", addr))),
        }
    }

    /// Owned objects are always strong; bridged ones only while pinned
    pub fn is_strong(&self, obj: &T) -> bool {
        let guard = self.tables.lock();
        let tables = guard.borrow();
        match tables.address_of(obj) {
            Some(addr) if tables.owned.contains_key(&addr) => true,
            Some(_) => tables.strong.contains_key(&obj.identity()),
            None => false,
        }
    }

    pub fn strong_count(&self) -> usize {
        let guard = self.tables.lock();
        let count = guard.borrow().strong.len();
        count
    }

    pub fn bridged_addresses(&self) -> Vec<Address> {
        let guard = self.tables.lock();
        let mut addrs: Vec<Address> = guard.borrow().bridged.keys().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    pub fn len(&self) -> usize {
        let guard = self.tables.lock();
        let tables = guard.borrow();
        tables.owned.len() + tables.bridged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: HostRef> Default for PtrMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
