use crate::guarded;
use fd_listener_core::common::constants::Syscall;
use fd_listener_core::common::{set_errno, IoctlRequest};
use fd_listener_core::listener::Dispatch;
use libc::{mode_t, size_t, sockaddr, socklen_t, ssize_t};
use std::ffi::{c_char, c_int, c_void, CStr, CString};

/// Resolve the next definition of `syscall`, normally the libc one.
fn next_symbol(syscall: Syscall) -> *mut c_void {
    let name: &str = syscall.into();
    let symbol = CString::new(name)
        .unwrap_or_else(|_| panic!("can not transfer \"{name}\" to CString"));
    let ptr = unsafe { libc::dlsym(libc::RTLD_NEXT, symbol.as_ptr()) };
    assert!(!ptr.is_null(), "system call \"{name}\" not found !");
    ptr
}

/// The value to hand back to the application, `None` to run the genuine call.
fn answer<T: From<i8>>(r: Option<Dispatch<T>>) -> Option<T> {
    match r? {
        Dispatch::Handled(v) => Some(v),
        Dispatch::Failed(errno) => {
            set_errno(errno);
            Some(T::from(-1))
        }
        Dispatch::NoListener => None,
    }
}

// check https://www.rustwiki.org.cn/en/reference/introduction.html for help information
macro_rules! impl_hook {
    ( $field_name: ident, $syscall: ident($($arg: ident : $arg_type: ty),*) -> $result: ty ) => {
        #[no_mangle]
        pub extern "C" fn $syscall(
            $($arg: $arg_type),*
        ) -> $result {
            static $field_name: once_cell::sync::Lazy<
                extern "C" fn($($arg_type, )*) -> $result,
            > = once_cell::sync::Lazy::new(|| unsafe {
                std::mem::transmute(next_symbol(Syscall::$syscall))
            });
            let fn_ptr = once_cell::sync::Lazy::force(&$field_name);
            if let Some(r) = answer(guarded(|registry| registry.$syscall($($arg, )*))) {
                return r;
            }
            (fn_ptr)($($arg),*)
        }
    }
}

static OPEN: once_cell::sync::Lazy<extern "C" fn(*const c_char, c_int, mode_t) -> c_int> =
    once_cell::sync::Lazy::new(|| unsafe { std::mem::transmute(next_symbol(Syscall::open)) });

#[no_mangle]
pub extern "C" fn open(pathname: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    let fn_ptr = once_cell::sync::Lazy::force(&OPEN);
    if !pathname.is_null() {
        let path = unsafe { CStr::from_ptr(pathname) };
        if let Some(r) = answer(guarded(|registry| registry.open(path, flags, mode))) {
            return r;
        }
    }
    (fn_ptr)(pathname, flags, mode)
}

static CLOSE: once_cell::sync::Lazy<extern "C" fn(c_int) -> c_int> =
    once_cell::sync::Lazy::new(|| unsafe { std::mem::transmute(next_symbol(Syscall::close)) });

// A tracked descriptor is released by its owner, the genuine close is skipped.
#[no_mangle]
pub extern "C" fn close(fd: c_int) -> c_int {
    let fn_ptr = once_cell::sync::Lazy::force(&CLOSE);
    if let Some(r) = answer(guarded(|registry| registry.close(fd).map(|()| 0))) {
        return r;
    }
    (fn_ptr)(fd)
}

impl_hook!(SOCKET, socket(domain: c_int, ty: c_int, protocol: c_int) -> c_int);
impl_hook!(IOCTL, ioctl(fd: c_int, request: IoctlRequest, argp: *mut c_void) -> c_int);
impl_hook!(ACCEPT, accept(fd: c_int, address: *mut sockaddr, address_len: *mut socklen_t) -> c_int);
impl_hook!(BIND, bind(fd: c_int, address: *const sockaddr, len: socklen_t) -> c_int);
impl_hook!(CONNECT, connect(fd: c_int, address: *const sockaddr, len: socklen_t) -> c_int);
impl_hook!(LISTEN, listen(fd: c_int, backlog: c_int) -> c_int);
impl_hook!(FSTAT, fstat(fd: c_int, buf: *mut libc::stat) -> c_int);
impl_hook!(GETSOCKOPT, getsockopt(fd: c_int, level: c_int, name: c_int, value: *mut c_void, option_len: *mut socklen_t) -> c_int);
impl_hook!(SETSOCKOPT, setsockopt(fd: c_int, level: c_int, name: c_int, value: *const c_void, option_len: socklen_t) -> c_int);
impl_hook!(GETSOCKNAME, getsockname(fd: c_int, address: *mut sockaddr, address_len: *mut socklen_t) -> c_int);
impl_hook!(RECV, recv(fd: c_int, buf: *mut c_void, len: size_t, flags: c_int) -> ssize_t);
impl_hook!(RECVFROM, recvfrom(fd: c_int, buf: *mut c_void, len: size_t, flags: c_int, address: *mut sockaddr, address_len: *mut socklen_t) -> ssize_t);
impl_hook!(SEND, send(fd: c_int, buf: *const c_void, len: size_t, flags: c_int) -> ssize_t);
