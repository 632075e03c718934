use crate::common::constants::{NO_LISTENER, NO_LISTENER_SIZE};
use crate::common::IoctlRequest;
use crate::fd::{FdInfo, FdState};
use crate::listener::{Dispatch, Listener};
use libc::{mode_t, size_t, sockaddr, socklen_t, ssize_t};
use std::ffi::{c_char, c_int, c_void, CStr};
use std::os::fd::RawFd;

/// A listener written against the C ABI.
///
/// Each slot is one capability, `None` meaning the listener never handles
/// that call. Calls return [`NO_LISTENER`] (or [`NO_LISTENER_SIZE`]) when they
/// decline, `-errno` on failure and a non-negative value on success.
///
/// `open` and `socket` may publish a private pointer through their first
/// argument. That pointer is passed to every later call on the descriptor and
/// handed to `free` once the descriptor is closed or the negotiation ends
/// without a claim.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct RawListener {
    /// `open(state, path, flags, mode)`.
    pub open:
        Option<extern "C" fn(*mut *mut c_void, *const c_char, c_int, mode_t) -> c_int>,
    /// `socket(state, domain, type, protocol)`.
    pub socket: Option<extern "C" fn(*mut *mut c_void, c_int, c_int, c_int) -> c_int>,
    /// `ioctl(fd, state, request, argp)`.
    pub ioctl: Option<extern "C" fn(c_int, *mut c_void, IoctlRequest, *mut c_void) -> c_int>,
    /// `accept(fd, state, address, address_len)`.
    pub accept:
        Option<extern "C" fn(c_int, *mut c_void, *mut sockaddr, *mut socklen_t) -> c_int>,
    /// `bind(fd, state, address, len)`.
    pub bind: Option<extern "C" fn(c_int, *mut c_void, *const sockaddr, socklen_t) -> c_int>,
    /// `connect(fd, state, address, len)`.
    pub connect:
        Option<extern "C" fn(c_int, *mut c_void, *const sockaddr, socklen_t) -> c_int>,
    /// `listen(fd, state, backlog)`.
    pub listen: Option<extern "C" fn(c_int, *mut c_void, c_int) -> c_int>,
    /// `fstat(fd, state, buf)`.
    pub fstat: Option<extern "C" fn(c_int, *mut c_void, *mut libc::stat) -> c_int>,
    /// `getsockopt(fd, state, level, name, value, option_len)`.
    pub getsockopt: Option<
        extern "C" fn(c_int, *mut c_void, c_int, c_int, *mut c_void, *mut socklen_t) -> c_int,
    >,
    /// `setsockopt(fd, state, level, name, value, option_len)`.
    pub setsockopt: Option<
        extern "C" fn(c_int, *mut c_void, c_int, c_int, *const c_void, socklen_t) -> c_int,
    >,
    /// `getsockname(fd, state, address, address_len)`.
    pub getsockname:
        Option<extern "C" fn(c_int, *mut c_void, *mut sockaddr, *mut socklen_t) -> c_int>,
    /// `recv(fd, state, buf, len, flags)`.
    pub recv: Option<extern "C" fn(c_int, *mut c_void, *mut c_void, size_t, c_int) -> ssize_t>,
    /// `recvfrom(fd, state, buf, len, flags, address, address_len)`.
    pub recvfrom: Option<
        extern "C" fn(
            c_int,
            *mut c_void,
            *mut c_void,
            size_t,
            c_int,
            *mut sockaddr,
            *mut socklen_t,
        ) -> ssize_t,
    >,
    /// `send(fd, state, buf, len, flags)`.
    pub send:
        Option<extern "C" fn(c_int, *mut c_void, *const c_void, size_t, c_int) -> ssize_t>,
    /// `close(fd, state)`, releases OS resources only.
    pub close: Option<extern "C" fn(c_int, *mut c_void)>,
    /// `free(state)`, releases the private pointer.
    pub free: Option<extern "C" fn(*mut c_void)>,
}

/// Decode the C tri-state of a descriptor-sized result.
pub fn decode(r: c_int) -> Dispatch<c_int> {
    match r {
        NO_LISTENER => Dispatch::NoListener,
        r if r < 0 => Dispatch::Failed(-r),
        r => Dispatch::Handled(r),
    }
}

/// Decode the C tri-state of a byte-count result.
pub fn decode_size(r: ssize_t) -> Dispatch<ssize_t> {
    match r {
        NO_LISTENER_SIZE => Dispatch::NoListener,
        r if r < 0 => Dispatch::Failed(c_int::try_from(-r).unwrap_or(libc::EOVERFLOW)),
        r => Dispatch::Handled(r),
    }
}

/// The private pointer of a C listener.
#[derive(Debug)]
struct RawState {
    ptr: *mut c_void,
    free: Option<extern "C" fn(*mut c_void)>,
}

// The pointer is owned by the C listener, which must accept it from any thread.
unsafe impl Send for RawState {}

unsafe impl Sync for RawState {}

impl Drop for RawState {
    fn drop(&mut self) {
        if let Some(free) = self.free {
            free(self.ptr);
        }
    }
}

/// Adapts a [`RawListener`] to [`Listener`].
#[derive(Debug)]
pub struct CListener {
    name: String,
    raw: RawListener,
}

impl CListener {
    /// Wrap `raw`, naming it `name` in log output.
    #[must_use]
    pub fn new(name: impl Into<String>, raw: RawListener) -> Self {
        Self {
            name: name.into(),
            raw,
        }
    }

    /// Keep the pointer published during negotiation only if this listener
    /// claimed the descriptor, so a declined pointer never reaches the next
    /// listener in the chain.
    fn publish(&self, state: &mut FdState, ptr: *mut c_void, r: &Dispatch<RawFd>) {
        if ptr.is_null() {
            return;
        }
        if r.is_handled() {
            state.set(RawState {
                ptr,
                free: self.raw.free,
            });
        } else if let Some(free) = self.raw.free {
            free(ptr);
        }
    }
}

fn state_ptr(info: &FdInfo) -> *mut c_void {
    info.state_as::<RawState>()
        .map_or(std::ptr::null_mut(), |s| s.ptr)
}

impl Listener for CListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, state: &mut FdState, path: &CStr, flags: c_int, mode: mode_t) -> Dispatch<RawFd> {
        let Some(open) = self.raw.open else {
            return Dispatch::NoListener;
        };
        let mut ptr: *mut c_void = std::ptr::null_mut();
        let r = decode(open(&mut ptr, path.as_ptr(), flags, mode));
        self.publish(state, ptr, &r);
        r
    }

    fn socket(
        &self,
        state: &mut FdState,
        domain: c_int,
        ty: c_int,
        protocol: c_int,
    ) -> Dispatch<RawFd> {
        let Some(socket) = self.raw.socket else {
            return Dispatch::NoListener;
        };
        let mut ptr: *mut c_void = std::ptr::null_mut();
        let r = decode(socket(&mut ptr, domain, ty, protocol));
        self.publish(state, ptr, &r);
        r
    }

    fn ioctl(&self, info: &FdInfo, request: IoctlRequest, argp: *mut c_void) -> Dispatch<c_int> {
        self.raw.ioctl.map_or(Dispatch::NoListener, |f| {
            decode(f(info.fd(), state_ptr(info), request, argp))
        })
    }

    fn accept(
        &self,
        info: &FdInfo,
        address: *mut sockaddr,
        address_len: *mut socklen_t,
    ) -> Dispatch<c_int> {
        self.raw.accept.map_or(Dispatch::NoListener, |f| {
            decode(f(info.fd(), state_ptr(info), address, address_len))
        })
    }

    fn bind(&self, info: &FdInfo, address: *const sockaddr, len: socklen_t) -> Dispatch<c_int> {
        self.raw.bind.map_or(Dispatch::NoListener, |f| {
            decode(f(info.fd(), state_ptr(info), address, len))
        })
    }

    fn connect(&self, info: &FdInfo, address: *const sockaddr, len: socklen_t) -> Dispatch<c_int> {
        self.raw.connect.map_or(Dispatch::NoListener, |f| {
            decode(f(info.fd(), state_ptr(info), address, len))
        })
    }

    fn listen(&self, info: &FdInfo, backlog: c_int) -> Dispatch<c_int> {
        self.raw.listen.map_or(Dispatch::NoListener, |f| {
            decode(f(info.fd(), state_ptr(info), backlog))
        })
    }

    fn fstat(&self, info: &FdInfo, buf: *mut libc::stat) -> Dispatch<c_int> {
        self.raw.fstat.map_or(Dispatch::NoListener, |f| {
            decode(f(info.fd(), state_ptr(info), buf))
        })
    }

    fn getsockopt(
        &self,
        info: &FdInfo,
        level: c_int,
        name: c_int,
        value: *mut c_void,
        option_len: *mut socklen_t,
    ) -> Dispatch<c_int> {
        self.raw.getsockopt.map_or(Dispatch::NoListener, |f| {
            decode(f(info.fd(), state_ptr(info), level, name, value, option_len))
        })
    }

    fn setsockopt(
        &self,
        info: &FdInfo,
        level: c_int,
        name: c_int,
        value: *const c_void,
        option_len: socklen_t,
    ) -> Dispatch<c_int> {
        self.raw.setsockopt.map_or(Dispatch::NoListener, |f| {
            decode(f(info.fd(), state_ptr(info), level, name, value, option_len))
        })
    }

    fn getsockname(
        &self,
        info: &FdInfo,
        address: *mut sockaddr,
        address_len: *mut socklen_t,
    ) -> Dispatch<c_int> {
        self.raw.getsockname.map_or(Dispatch::NoListener, |f| {
            decode(f(info.fd(), state_ptr(info), address, address_len))
        })
    }

    fn recv(&self, info: &FdInfo, buf: *mut c_void, len: size_t, flags: c_int) -> Dispatch<ssize_t> {
        self.raw.recv.map_or(Dispatch::NoListener, |f| {
            decode_size(f(info.fd(), state_ptr(info), buf, len, flags))
        })
    }

    fn recvfrom(
        &self,
        info: &FdInfo,
        buf: *mut c_void,
        len: size_t,
        flags: c_int,
        address: *mut sockaddr,
        address_len: *mut socklen_t,
    ) -> Dispatch<ssize_t> {
        self.raw.recvfrom.map_or(Dispatch::NoListener, |f| {
            decode_size(f(
                info.fd(),
                state_ptr(info),
                buf,
                len,
                flags,
                address,
                address_len,
            ))
        })
    }

    fn send(
        &self,
        info: &FdInfo,
        buf: *const c_void,
        len: size_t,
        flags: c_int,
    ) -> Dispatch<ssize_t> {
        self.raw.send.map_or(Dispatch::NoListener, |f| {
            decode_size(f(info.fd(), state_ptr(info), buf, len, flags))
        })
    }

    fn close(&self, info: &FdInfo) {
        if let Some(close) = self.raw.close {
            close(info.fd(), state_ptr(info));
        }
    }
}
