use std::ffi::c_int;

/// Constants.
pub mod constants;

/// Check <https://www.rustwiki.org.cn/en/reference/introduction.html> for help information.
pub(crate) mod macros;

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "linux", target_env = "musl"))] {
        /// The type of the `request` argument of `ioctl`.
        pub type IoctlRequest = c_int;
    } else {
        /// The type of the `request` argument of `ioctl`.
        pub type IoctlRequest = std::ffi::c_ulong;
    }
}

/// Install the `tracing` subscriber used for all log output of this workspace.
///
/// Calling it more than once, or after the host installed its own subscriber,
/// is harmless.
pub fn init_log() {
    #[cfg(feature = "log")]
    {
        _ = tracing_subscriber::fmt()
            .with_thread_names(true)
            .with_line_number(true)
            .with_timer(tracing_subscriber::fmt::time::OffsetTime::new(
                time::UtcOffset::UTC,
                time::format_description::well_known::Rfc2822,
            ))
            .try_init();
    }
}

extern "C" {
    #[cfg(not(any(target_os = "dragonfly", target_os = "vxworks")))]
    #[cfg_attr(
        any(
            target_os = "linux",
            target_os = "emscripten",
            target_os = "fuchsia",
            target_os = "l4re"
        ),
        link_name = "__errno_location"
    )]
    #[cfg_attr(
        any(
            target_os = "netbsd",
            target_os = "openbsd",
            target_os = "android",
            target_os = "redox",
            target_env = "newlib"
        ),
        link_name = "__errno"
    )]
    #[cfg_attr(
        any(target_os = "solaris", target_os = "illumos"),
        link_name = "___errno"
    )]
    #[cfg_attr(
        any(
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "watchos"
        ),
        link_name = "__error"
    )]
    #[cfg_attr(target_os = "haiku", link_name = "_errnop")]
    fn errno_location() -> *mut c_int;
}

/// Write the calling thread's `errno`.
pub fn set_errno(errno: c_int) {
    unsafe { errno_location().write(errno) }
}
