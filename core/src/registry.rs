use crate::common::constants::Syscall;
use crate::common::IoctlRequest;
use crate::config::Config;
use crate::fd::{FdInfo, FdState, FdTable};
use crate::listener::{Dispatch, Listener, ListenerChain};
use crate::{error, info, trace, warn};
use libc::{mode_t, size_t, sockaddr, socklen_t, ssize_t};
use std::ffi::{c_int, c_void, CStr};
use std::os::fd::RawFd;
use std::sync::Arc;

/// Forward a call on an owned descriptor to its owner.
macro_rules! impl_dispatch {
    ( $syscall: ident($($arg: ident : $arg_type: ty),*) -> $result: ty ) => {
        #[doc = concat!("Route `", stringify!($syscall), "` on `fd` to the listener owning it.")]
        ///
        /// Untracked descriptors and owners without this capability both give
        /// [`Dispatch::NoListener`].
        pub fn $syscall(&self, fd: RawFd, $($arg: $arg_type),*) -> Dispatch<$result> {
            let Some(info) = self.fds.get(fd) else {
                trace!("{} {} untracked", Syscall::$syscall, fd);
                return Dispatch::NoListener;
            };
            let r = info.listener().$syscall(&info, $($arg),*);
            trace!("{} {} by {} -> {}", Syscall::$syscall, fd, info.listener().name(), r);
            r
        }
    };
}

/// The listener chain together with the descriptor table.
///
/// Register listeners before traffic starts. Dispatch may then run from any
/// number of threads as long as each descriptor is used by one thread at a
/// time; listener code always runs without any table lock held.
#[derive(Debug, Default)]
pub struct Registry {
    listeners: ListenerChain,
    fds: FdTable,
}

impl Registry {
    /// Create an empty registry sized by `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            listeners: ListenerChain::default(),
            fds: FdTable::new(config.capacity(), config.shard_amount()),
        }
    }

    /// Append `listener` to the chain consulted when descriptors are created.
    ///
    /// Earlier registrations take priority. Registering the same listener
    /// twice just consults it twice.
    pub fn register(&self, listener: Arc<dyn Listener>) {
        info!("register listener {}", listener.name());
        self.listeners.push(listener);
    }

    /// Make `listener` the owner of an existing `fd`, replacing any record.
    pub fn grab(&self, fd: RawFd, listener: &Arc<dyn Listener>) {
        self.grab_with(fd, listener, FdState::new());
    }

    /// Like [`Registry::grab`], with private state prepared by the caller.
    pub fn grab_with(&self, fd: RawFd, listener: &Arc<dyn Listener>, state: FdState) {
        info!("{} grabs fd {}", listener.name(), fd);
        if let Some(stale) = self.fds.insert(FdInfo::new(fd, Arc::clone(listener), state)) {
            warn!("fd {} was still owned by {}", fd, stale.listener().name());
        }
    }

    /// Offer `open(path)` to every listener in registration order.
    ///
    /// The first listener that claims the path owns the returned descriptor.
    /// An error stops the walk and nothing is recorded.
    pub fn open(&self, path: &CStr, flags: c_int, mode: mode_t) -> Dispatch<RawFd> {
        self.create(Syscall::open, |listener, state| {
            listener.open(state, path, flags, mode)
        })
    }

    /// Offer `socket(domain, ty, protocol)` to every listener in registration
    /// order, with the same rules as [`Registry::open`].
    pub fn socket(&self, domain: c_int, ty: c_int, protocol: c_int) -> Dispatch<RawFd> {
        self.create(Syscall::socket, |listener, state| {
            listener.socket(state, domain, ty, protocol)
        })
    }

    fn create(
        &self,
        syscall: Syscall,
        offer: impl Fn(&dyn Listener, &mut FdState) -> Dispatch<RawFd>,
    ) -> Dispatch<RawFd> {
        let mut state = FdState::new();
        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            match offer(listener.as_ref(), &mut state) {
                Dispatch::NoListener => continue,
                Dispatch::Failed(errno) => {
                    trace!("{} failed in {} with {}", syscall, listener.name(), errno);
                    return Dispatch::Failed(errno);
                }
                Dispatch::Handled(fd) if fd < 0 => {
                    error!("{} claimed {} with invalid fd {}", listener.name(), syscall, fd);
                    return Dispatch::Failed(libc::EBADF);
                }
                Dispatch::Handled(fd) => {
                    trace!("{} claimed by {} as fd {}", syscall, listener.name(), fd);
                    if let Some(stale) =
                        self.fds.insert(FdInfo::new(fd, Arc::clone(listener), state))
                    {
                        warn!("fd {} was still owned by {}", fd, stale.listener().name());
                    }
                    return Dispatch::Handled(fd);
                }
            }
        }
        trace!("{} has no listener", syscall);
        Dispatch::NoListener
    }

    impl_dispatch!(ioctl(request: IoctlRequest, argp: *mut c_void) -> c_int);

    impl_dispatch!(accept(address: *mut sockaddr, address_len: *mut socklen_t) -> c_int);

    impl_dispatch!(bind(address: *const sockaddr, len: socklen_t) -> c_int);

    impl_dispatch!(connect(address: *const sockaddr, len: socklen_t) -> c_int);

    impl_dispatch!(listen(backlog: c_int) -> c_int);

    impl_dispatch!(fstat(buf: *mut libc::stat) -> c_int);

    impl_dispatch!(getsockopt(
        level: c_int,
        name: c_int,
        value: *mut c_void,
        option_len: *mut socklen_t
    ) -> c_int);

    impl_dispatch!(setsockopt(
        level: c_int,
        name: c_int,
        value: *const c_void,
        option_len: socklen_t
    ) -> c_int);

    impl_dispatch!(getsockname(address: *mut sockaddr, address_len: *mut socklen_t) -> c_int);

    impl_dispatch!(recv(buf: *mut c_void, len: size_t, flags: c_int) -> ssize_t);

    impl_dispatch!(recvfrom(
        buf: *mut c_void,
        len: size_t,
        flags: c_int,
        address: *mut sockaddr,
        address_len: *mut socklen_t
    ) -> ssize_t);

    impl_dispatch!(send(buf: *const c_void, len: size_t, flags: c_int) -> ssize_t);

    /// Let the owner of `fd` tear it down, then forget the descriptor.
    ///
    /// The record is removed even if the owner has no close capability.
    /// Gives [`Dispatch::NoListener`] for an untracked descriptor.
    pub fn close(&self, fd: RawFd) -> Dispatch<()> {
        let Some(info) = self.fds.get(fd) else {
            trace!("{} {} untracked", Syscall::close, fd);
            return Dispatch::NoListener;
        };
        info.listener().close(&info);
        if !self.fds.remove_record(&info) {
            warn!("fd {} was re-created while closing", fd);
        }
        trace!("{} {} by {}", Syscall::close, fd, info.listener().name());
        Dispatch::Handled(())
    }

    /// Close every tracked descriptor through its owner.
    ///
    /// Returns how many records were released.
    pub fn close_all(&self) -> usize {
        let closed = self
            .fds
            .fds()
            .into_iter()
            .filter(|fd| self.close(*fd).is_handled())
            .count();
        info!("closed {} tracked fds", closed);
        closed
    }

    /// The listener owning `fd`.
    #[must_use]
    pub fn owner(&self, fd: RawFd) -> Option<Arc<dyn Listener>> {
        self.fds.get(fd).map(|info| Arc::clone(info.listener()))
    }

    /// Returns `true` if `fd` has an ownership record.
    #[must_use]
    pub fn is_tracked(&self, fd: RawFd) -> bool {
        self.fds.contains(fd)
    }

    /// Number of tracked descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    /// Returns `true` if no descriptor is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Counting {
        closes: AtomicUsize,
    }

    impl Listener for Counting {
        fn socket(&self, state: &mut FdState, _: c_int, ty: c_int, _: c_int) -> Dispatch<RawFd> {
            state.set(ty);
            Dispatch::Handled(40 + ty)
        }

        fn getsockopt(
            &self,
            info: &FdInfo,
            _: c_int,
            _: c_int,
            _: *mut c_void,
            _: *mut socklen_t,
        ) -> Dispatch<c_int> {
            Dispatch::Handled(*info.state_as::<c_int>().expect("socket type"))
        }

        fn close(&self, _: &FdInfo) {
            _ = self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug)]
    struct Negative;

    impl Listener for Negative {
        fn open(&self, _: &mut FdState, _: &CStr, _: c_int, _: mode_t) -> Dispatch<RawFd> {
            Dispatch::Handled(-7)
        }
    }

    #[test]
    fn state_follows_the_claim() {
        let registry = Registry::new(&Config::single());
        registry.register(Arc::new(Counting::default()));
        assert_eq!(Dispatch::Handled(41), registry.socket(libc::AF_INET, 1, 0));
        let r = registry.getsockopt(41, 0, 0, std::ptr::null_mut(), std::ptr::null_mut());
        assert_eq!(Dispatch::Handled(1), r);
    }

    #[test]
    fn negative_claim_is_rejected() {
        let registry = Registry::default();
        registry.register(Arc::new(Negative));
        assert_eq!(Dispatch::Failed(libc::EBADF), registry.open(c"/n", 0, 0));
        assert!(registry.is_empty());
    }

    #[test]
    fn close_all_runs_every_close() {
        let counting = Arc::new(Counting::default());
        let registry = Registry::default();
        registry.register(counting.clone());
        for ty in 0..3 {
            assert!(registry.socket(libc::AF_UNIX, ty, 0).is_handled());
        }
        assert_eq!(3, registry.len());
        assert_eq!(3, registry.close_all());
        assert_eq!(3, counting.closes.load(Ordering::SeqCst));
        assert!(registry.is_empty());
        assert_eq!(0, registry.close_all());
    }
}
