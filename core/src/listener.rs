use crate::common::IoctlRequest;
use crate::fd::{FdInfo, FdState};
use crate::impl_display_by_debug;
use libc::{mode_t, size_t, sockaddr, socklen_t, ssize_t};
use std::ffi::{c_int, c_void, CStr};
use std::fmt::Debug;
use std::os::fd::RawFd;
use std::sync::{Arc, RwLock, RwLockReadGuard};

/// The outcome of offering a call to a listener.
#[must_use]
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Dispatch<T> {
    /// The listener handled the call and produced this value.
    Handled(T),
    /// Nobody handled the call, the caller should fall back to the OS.
    NoListener,
    /// The listener handled the call and failed with this `errno`.
    Failed(c_int),
}

impl_display_by_debug!(Dispatch<T>);

impl<T> Dispatch<T> {
    /// Returns `true` if a listener produced a value.
    #[must_use]
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }

    /// Returns `true` if the call must fall back to the OS.
    #[must_use]
    pub fn is_no_listener(&self) -> bool {
        matches!(self, Self::NoListener)
    }

    /// Returns `true` if a listener reported an error.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The handled value, if any.
    #[must_use]
    pub fn handled(self) -> Option<T> {
        match self {
            Self::Handled(v) => Some(v),
            Self::NoListener | Self::Failed(_) => None,
        }
    }

    /// Maps the handled value, leaving the other outcomes untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Dispatch<U> {
        match self {
            Self::Handled(v) => Dispatch::Handled(f(v)),
            Self::NoListener => Dispatch::NoListener,
            Self::Failed(errno) => Dispatch::Failed(errno),
        }
    }
}

/// A pluggable capability provider.
///
/// Every capability is optional: the provided implementations answer
/// [`Dispatch::NoListener`], which is what "this listener never handles that
/// call" means. Arguments mirror the corresponding libc call and are passed
/// through untouched; pointers are only valid for the duration of the call.
///
/// `open` and `socket` take part in creation negotiation and get the fresh
/// [`FdState`] of that negotiation. The other capabilities are only offered to
/// the listener that owns the descriptor and receive its [`FdInfo`].
#[allow(unused_variables)]
pub trait Listener: Debug + Send + Sync {
    /// The name used in log output.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Claim a descriptor for `path`.
    fn open(&self, state: &mut FdState, path: &CStr, flags: c_int, mode: mode_t) -> Dispatch<RawFd> {
        Dispatch::NoListener
    }

    /// Claim a descriptor for a new socket.
    fn socket(
        &self,
        state: &mut FdState,
        domain: c_int,
        ty: c_int,
        protocol: c_int,
    ) -> Dispatch<RawFd> {
        Dispatch::NoListener
    }

    /// `ioctl` on an owned descriptor.
    fn ioctl(&self, info: &FdInfo, request: IoctlRequest, argp: *mut c_void) -> Dispatch<c_int> {
        Dispatch::NoListener
    }

    /// `accept` on an owned descriptor.
    fn accept(
        &self,
        info: &FdInfo,
        address: *mut sockaddr,
        address_len: *mut socklen_t,
    ) -> Dispatch<c_int> {
        Dispatch::NoListener
    }

    /// `bind` on an owned descriptor.
    fn bind(&self, info: &FdInfo, address: *const sockaddr, len: socklen_t) -> Dispatch<c_int> {
        Dispatch::NoListener
    }

    /// `connect` on an owned descriptor.
    fn connect(&self, info: &FdInfo, address: *const sockaddr, len: socklen_t) -> Dispatch<c_int> {
        Dispatch::NoListener
    }

    /// `listen` on an owned descriptor.
    fn listen(&self, info: &FdInfo, backlog: c_int) -> Dispatch<c_int> {
        Dispatch::NoListener
    }

    /// `fstat` on an owned descriptor.
    fn fstat(&self, info: &FdInfo, buf: *mut libc::stat) -> Dispatch<c_int> {
        Dispatch::NoListener
    }

    /// `getsockopt` on an owned descriptor.
    fn getsockopt(
        &self,
        info: &FdInfo,
        level: c_int,
        name: c_int,
        value: *mut c_void,
        option_len: *mut socklen_t,
    ) -> Dispatch<c_int> {
        Dispatch::NoListener
    }

    /// `setsockopt` on an owned descriptor.
    fn setsockopt(
        &self,
        info: &FdInfo,
        level: c_int,
        name: c_int,
        value: *const c_void,
        option_len: socklen_t,
    ) -> Dispatch<c_int> {
        Dispatch::NoListener
    }

    /// `getsockname` on an owned descriptor.
    fn getsockname(
        &self,
        info: &FdInfo,
        address: *mut sockaddr,
        address_len: *mut socklen_t,
    ) -> Dispatch<c_int> {
        Dispatch::NoListener
    }

    /// `recv` on an owned descriptor.
    fn recv(&self, info: &FdInfo, buf: *mut c_void, len: size_t, flags: c_int) -> Dispatch<ssize_t> {
        Dispatch::NoListener
    }

    /// `recvfrom` on an owned descriptor.
    fn recvfrom(
        &self,
        info: &FdInfo,
        buf: *mut c_void,
        len: size_t,
        flags: c_int,
        address: *mut sockaddr,
        address_len: *mut socklen_t,
    ) -> Dispatch<ssize_t> {
        Dispatch::NoListener
    }

    /// `send` on an owned descriptor.
    fn send(
        &self,
        info: &FdInfo,
        buf: *const c_void,
        len: size_t,
        flags: c_int,
    ) -> Dispatch<ssize_t> {
        Dispatch::NoListener
    }

    /// Tear down whatever the listener holds for this descriptor.
    ///
    /// The ownership record is dropped right after this returns, whether or
    /// not the listener overrides it.
    fn close(&self, info: &FdInfo) {}
}

/// Listeners in registration order, which is also their creation priority.
#[derive(Debug, Default)]
pub struct ListenerChain(RwLock<Vec<Arc<dyn Listener>>>);

impl ListenerChain {
    /// Append a listener. Listeners are never removed.
    pub fn push(&self, listener: Arc<dyn Listener>) {
        self.0.write().expect("listener chain poisoned").push(listener);
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if nothing was registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if this exact listener was registered.
    #[must_use]
    pub fn contains(&self, listener: &Arc<dyn Listener>) -> bool {
        self.read().iter().any(|l| Arc::ptr_eq(l, listener))
    }

    /// Lock the chain for a walk in registration order.
    ///
    /// Registering from inside a walk deadlocks.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn Listener>>> {
        self.0.read().expect("listener chain poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Silent;

    impl Listener for Silent {}

    #[test]
    fn absent_capabilities_decline() {
        let silent = Silent;
        let mut state = FdState::new();
        assert!(silent.open(&mut state, c"/a", 0, 0).is_no_listener());
        assert!(silent.socket(&mut state, libc::AF_INET, libc::SOCK_STREAM, 0).is_no_listener());
        assert!(state.is_empty());
        assert!(silent.name().ends_with("Silent"));
    }

    #[test]
    fn dispatch_helpers() {
        let handled: Dispatch<c_int> = Dispatch::Handled(3);
        assert!(handled.is_handled());
        assert_eq!(Some(6), handled.map(|v| v * 2).handled());
        let failed: Dispatch<c_int> = Dispatch::Failed(libc::ENOENT);
        assert!(failed.is_failed());
        assert_eq!(Dispatch::Failed(libc::ENOENT), failed.map(|v| v + 1));
        assert_eq!(None, Dispatch::<c_int>::NoListener.handled());
        assert_eq!("Handled(3)", handled.to_string());
    }

    #[test]
    fn chain_keeps_identity() {
        let chain = ListenerChain::default();
        let a: Arc<dyn Listener> = Arc::new(Silent);
        let b: Arc<dyn Listener> = Arc::new(Silent);
        assert!(chain.is_empty());
        chain.push(Arc::clone(&a));
        chain.push(Arc::clone(&a));
        assert_eq!(2, chain.len());
        assert!(chain.contains(&a));
        assert!(!chain.contains(&b));
    }
}
