use fd_listener_core::common::IoctlRequest;
use fd_listener_core::fd::{FdInfo, FdState};
use fd_listener_core::listener::{Dispatch, Listener};
use fd_listener_core::registry::Registry;
use std::ffi::{c_int, c_void, CStr};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Claims paths under a prefix, minting descriptors from a counter.
#[derive(Debug)]
struct PrefixListener {
    prefix: &'static [u8],
    next_fd: AtomicI32,
    events: Mutex<Vec<String>>,
}

impl PrefixListener {
    fn new(prefix: &'static [u8], first_fd: RawFd) -> Self {
        Self {
            prefix,
            next_fd: AtomicI32::new(first_fd),
            events: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, event: String) {
        self.events.lock().expect("lock failed").push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().expect("lock failed").clone()
    }
}

impl Listener for PrefixListener {
    fn open(&self, state: &mut FdState, path: &CStr, _: c_int, _: libc::mode_t) -> Dispatch<RawFd> {
        let path = path.to_bytes();
        if !path.starts_with(self.prefix) {
            return Dispatch::NoListener;
        }
        state.set(String::from_utf8_lossy(path).into_owned());
        let fd = self.next_fd.fetch_add(1, Ordering::SeqCst);
        self.record(format!("open {fd}"));
        Dispatch::Handled(fd)
    }

    fn ioctl(&self, info: &FdInfo, request: IoctlRequest, _: *mut c_void) -> Dispatch<c_int> {
        self.record(format!("ioctl {} {request}", info.fd()));
        Dispatch::Handled(0)
    }

    fn close(&self, info: &FdInfo) {
        self.record(format!(
            "close {} {}",
            info.fd(),
            info.state_as::<String>().expect("path state")
        ));
    }
}

/// Claims every path with one fixed descriptor.
#[derive(Debug)]
struct CatchAll {
    fd: RawFd,
    offers: AtomicUsize,
}

impl CatchAll {
    fn new(fd: RawFd) -> Self {
        Self {
            fd,
            offers: AtomicUsize::new(0),
        }
    }

    fn offers(&self) -> usize {
        self.offers.load(Ordering::SeqCst)
    }
}

impl Listener for CatchAll {
    fn open(&self, _: &mut FdState, _: &CStr, _: c_int, _: libc::mode_t) -> Dispatch<RawFd> {
        _ = self.offers.fetch_add(1, Ordering::SeqCst);
        Dispatch::Handled(self.fd)
    }

    fn socket(&self, _: &mut FdState, _: c_int, _: c_int, _: c_int) -> Dispatch<RawFd> {
        _ = self.offers.fetch_add(1, Ordering::SeqCst);
        Dispatch::Handled(self.fd)
    }

    fn listen(&self, _: &FdInfo, _: c_int) -> Dispatch<c_int> {
        Dispatch::Handled(self.fd)
    }
}

/// Only knows how to create sockets, and always fails.
#[derive(Debug)]
struct Refusing;

impl Listener for Refusing {
    fn socket(&self, _: &mut FdState, _: c_int, _: c_int, _: c_int) -> Dispatch<RawFd> {
        Dispatch::Failed(libc::EAFNOSUPPORT)
    }
}

/// Has no capability at all.
#[derive(Debug)]
struct Inert;

impl Listener for Inert {}

fn ioctl(registry: &Registry, fd: RawFd) -> Dispatch<c_int> {
    registry.ioctl(fd, 0x5421, std::ptr::null_mut())
}

#[test]
fn virtual_path_round_trip() {
    let virt = Arc::new(PrefixListener::new(b"/virt/", 5));
    let registry = Registry::default();
    registry.register(virt.clone());

    assert_eq!(Dispatch::Handled(5), registry.open(c"/virt/x", libc::O_RDONLY, 0));
    assert_eq!(Dispatch::Handled(0), ioctl(&registry, 5));
    assert_eq!(Dispatch::Handled(()), registry.close(5));
    assert_eq!(Dispatch::NoListener, ioctl(&registry, 5));
    assert_eq!(
        vec!["open 5", "ioctl 5 21537", "close 5 /virt/x"],
        virt.events()
    );
}

#[test]
fn listener_without_capability_is_skipped() {
    let catch_all = Arc::new(CatchAll::new(11));
    let registry = Registry::default();
    registry.register(Arc::new(Inert));
    registry.register(catch_all.clone());

    assert_eq!(Dispatch::Handled(11), registry.open(c"/a", 0, 0));
    assert_eq!(1, catch_all.offers());
    let owner = registry.owner(11).expect("owner of 11");
    let catch_all: Arc<dyn Listener> = catch_all;
    assert!(Arc::ptr_eq(&owner, &catch_all));
}

#[test]
fn creation_error_is_propagated() {
    let catch_all = Arc::new(CatchAll::new(3));
    let registry = Registry::default();
    registry.register(Arc::new(Refusing));
    registry.register(catch_all.clone());

    assert_eq!(
        Dispatch::Failed(libc::EAFNOSUPPORT),
        registry.socket(libc::AF_INET, libc::SOCK_STREAM, 0)
    );
    assert_eq!(0, catch_all.offers());
    assert!(registry.is_empty());
}

#[test]
fn unclaimed_path_falls_through() {
    let registry = Registry::default();
    assert_eq!(Dispatch::NoListener, registry.open(c"/x", 0, 0));
    registry.register(Arc::new(PrefixListener::new(b"/virt/", 5)));
    registry.register(Arc::new(Refusing));
    assert_eq!(Dispatch::NoListener, registry.open(c"/x", 0, 0));
    assert!(registry.is_empty());
}

#[test]
fn first_registered_wins() {
    let first = Arc::new(CatchAll::new(20));
    let second = Arc::new(CatchAll::new(30));
    let registry = Registry::default();
    registry.register(first.clone());
    registry.register(second.clone());

    assert_eq!(Dispatch::Handled(20), registry.open(c"/both", 0, 0));
    assert_eq!(Dispatch::Handled(20), registry.socket(libc::AF_UNIX, libc::SOCK_DGRAM, 0));
    assert_eq!(2, first.offers());
    assert_eq!(0, second.offers());
    assert_eq!(2, registry.listener_count());
}

#[test]
fn untracked_fd_is_stable() {
    let registry = Registry::default();
    registry.register(Arc::new(CatchAll::new(1)));
    for _ in 0..3 {
        assert_eq!(Dispatch::NoListener, ioctl(&registry, 42));
        assert_eq!(Dispatch::NoListener, registry.listen(42, 8));
        assert_eq!(
            Dispatch::NoListener,
            registry.send(42, std::ptr::null(), 0, 0)
        );
        assert_eq!(Dispatch::NoListener, registry.close(42));
    }
    assert!(!registry.is_tracked(42));
}

#[test]
fn owner_without_capability_falls_through() {
    let registry = Registry::default();
    registry.register(Arc::new(CatchAll::new(8)));
    assert!(registry.open(c"/owned", 0, 0).is_handled());

    let r = registry.recv(8, std::ptr::null_mut(), 0, 0);
    assert_eq!(Dispatch::NoListener, r);
    assert_eq!(Dispatch::Handled(8), registry.listen(8, 1));
    // the record survives an operation its owner declined
    assert!(registry.is_tracked(8));
}

#[test]
fn reused_fd_gets_a_fresh_record() {
    let virt = Arc::new(PrefixListener::new(b"/virt/", 5));
    let registry = Registry::default();
    registry.register(virt.clone());
    assert_eq!(Dispatch::Handled(5), registry.open(c"/virt/a", 0, 0));
    assert!(registry.close(5).is_handled());
    assert!(!registry.is_tracked(5));

    // the OS hands out the same integer again
    virt.next_fd.store(5, Ordering::SeqCst);
    assert_eq!(Dispatch::Handled(5), registry.open(c"/virt/b", 0, 0));
    assert!(registry.close(5).is_handled());
    assert_eq!(
        vec!["open 5", "close 5 /virt/a", "open 5", "close 5 /virt/b"],
        virt.events()
    );
}

#[test]
fn grab_replaces_record() {
    let virt = Arc::new(PrefixListener::new(b"/virt/", 5));
    let catch_all = Arc::new(CatchAll::new(6));
    let registry = Registry::default();
    registry.register(virt.clone());
    assert_eq!(Dispatch::Handled(5), registry.open(c"/virt/a", 0, 0));

    let catch_all: Arc<dyn Listener> = catch_all;
    registry.grab_with(5, &catch_all, FdState::with(9u64));
    assert_eq!(1, registry.len());
    assert_eq!(Dispatch::NoListener, ioctl(&registry, 5));
    assert_eq!(Dispatch::Handled(6), registry.listen(5, 0));

    // the replaced record is gone entirely, so its owner never sees close
    assert!(registry.close(5).is_handled());
    assert_eq!(vec!["open 5"], virt.events());
}

#[test]
fn grab_without_negotiation() {
    let registry = Registry::default();
    let inert: Arc<dyn Listener> = Arc::new(Inert);
    registry.grab(100, &inert);
    assert!(registry.is_tracked(100));
    assert_eq!(0, registry.listener_count());
    assert_eq!(Dispatch::NoListener, ioctl(&registry, 100));
    assert_eq!(Dispatch::Handled(()), registry.close(100));
    assert!(registry.is_empty());
}
