use crate::impl_display_by_debug;
use once_cell::sync::Lazy;

/// Default initial capacity of the descriptor table.
pub const DEFAULT_CAPACITY: usize = 256;

/// C-ABI marker for "no listener handled this call".
///
/// Lies outside both the descriptor range and the `-errno` range.
pub const NO_LISTENER: std::ffi::c_int = std::ffi::c_int::MIN;

/// [`NO_LISTENER`] for calls returning `ssize_t`.
pub const NO_LISTENER_SIZE: libc::ssize_t = libc::ssize_t::MIN;

/// Get the cpu count
#[must_use]
pub fn cpu_count() -> usize {
    static CPU_COUNT: Lazy<usize> = Lazy::new(num_cpus::get);
    *CPU_COUNT
}

/// Recommended shard amount for the descriptor table, always a power of two.
#[must_use]
pub fn default_shard_amount() -> usize {
    (cpu_count() * 4).next_power_of_two().max(2)
}

/// Enums used to describe the tracked syscalls
#[allow(non_camel_case_types, missing_docs)]
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Syscall {
    open,
    socket,
    ioctl,
    accept,
    bind,
    connect,
    listen,
    fstat,
    getsockopt,
    setsockopt,
    getsockname,
    recv,
    recvfrom,
    send,
    close,
}

impl_display_by_debug!(Syscall);

impl From<Syscall> for &'static str {
    fn from(val: Syscall) -> Self {
        match val {
            Syscall::open => "open",
            Syscall::socket => "socket",
            Syscall::ioctl => "ioctl",
            Syscall::accept => "accept",
            Syscall::bind => "bind",
            Syscall::connect => "connect",
            Syscall::listen => "listen",
            Syscall::fstat => "fstat",
            Syscall::getsockopt => "getsockopt",
            Syscall::setsockopt => "setsockopt",
            Syscall::getsockname => "getsockname",
            Syscall::recv => "recv",
            Syscall::recvfrom => "recvfrom",
            Syscall::send => "send",
            Syscall::close => "close",
        }
    }
}
