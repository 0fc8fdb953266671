//! Capabilities the bridge needs from host handles

/// Strong host handle the bridge can bind to an address
///
/// `identity` must be stable for as long as any strong handle exists and is
/// what "same object" means to the bridge; value equality is never consulted.
pub trait HostRef: Clone {
    type Weak: WeakHandle<Strong = Self>;

    fn downgrade(&self) -> Self::Weak;

    fn identity(&self) -> usize;
}

/// Weak host handle; "still reachable" is a successful upgrade
pub trait WeakHandle: Clone {
    type Strong;

    fn upgrade(&self) -> Option<Self::Strong>;

    fn is_alive(&self) -> bool {
        self.upgrade().is_some()
    }
}
