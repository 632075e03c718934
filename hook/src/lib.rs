#![deny(
    // The following are allowed by default lints according to
    // https://doc.rust-lang.org/rustc/lints/listing/allowed-by-default.html
    anonymous_parameters,
    bare_trait_objects,
    // elided_lifetimes_in_paths, // allow anonymous lifetime
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    single_use_lifetimes,
    trivial_numeric_casts,
    // unreachable_pub, allow clippy::redundant_pub_crate lint instead
    // unsafe_code,
    unstable_features,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results,
    variant_size_differences,

    clippy::all,
    // clippy::restriction,
    clippy::pedantic,
    // clippy::nursery, // It's still under development
    clippy::cargo,
    unreachable_pub,
)]
#![allow(
    // Some explicitly allowed Clippy lints, must have clear reason to allow
    clippy::blanket_clippy_restriction_lints, // allow clippy::restriction
    clippy::implicit_return, // actually omitting the return keyword is idiomatic Rust code
    clippy::module_name_repetitions, // repeation of module name in a struct name is not big deal
    clippy::multiple_crate_versions, // multi-version dependency crates is not able to fix
    clippy::missing_errors_doc,
    clippy::missing_panics_doc, // TODO: add panic docs
    clippy::shadow_same, // Not too much bad
    clippy::shadow_reuse, // Not too much bad
    clippy::exhaustive_enums,
    clippy::exhaustive_structs,
)]
//! The interception front-end of fd-listener.
//!
//! Loaded with `LD_PRELOAD`, this library replaces the libc entry points of
//! the descriptor calls. Each call is offered to the process-wide
//! [`Registry`]; when no listener handles it the genuine libc function runs
//! with the unchanged arguments.
//!
//! Rust listeners link this crate, call [`init`] and [`register_listener`].
//! C listeners call `fd_listener_init` and `fd_listener_add`.

use dashmap::DashMap;
use fd_listener_core::config::Config;
use fd_listener_core::ffi::{CListener, RawListener};
use fd_listener_core::listener::Listener;
use fd_listener_core::registry::Registry;
use once_cell::sync::{Lazy, OnceCell};
use std::cell::Cell;
use std::ffi::c_int;
use std::sync::Arc;

static REGISTRY: OnceCell<Registry> = OnceCell::new();

static HOOK: OnceCell<bool> = OnceCell::new();

/// C listeners by the address of their function table.
static C_LISTENERS: Lazy<DashMap<usize, Arc<dyn Listener>>> = Lazy::new(DashMap::new);

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

pub(crate) fn hook() -> bool {
    HOOK.get().map_or_else(|| false, |v| *v)
}

/// Leaves the dispatch entered by [`enter`] when dropped.
struct Exit;

impl Drop for Exit {
    fn drop(&mut self) {
        _ = DEPTH.try_with(|depth| depth.set(depth.get() - 1));
    }
}

/// Mark this thread as inside a dispatch, `None` if it already is.
fn enter() -> Option<Exit> {
    DEPTH
        .try_with(|depth| {
            if depth.get() > 0 {
                return None;
            }
            depth.set(1);
            Some(Exit)
        })
        .ok()
        .flatten()
}

/// Run `f` unless this thread is already inside a dispatch.
///
/// Listeners calling libc while they handle a call reach the genuine
/// function, not the registry again.
pub(crate) fn guarded<R>(f: impl FnOnce(&Registry) -> R) -> Option<R> {
    if !hook() {
        return None;
    }
    let registry = REGISTRY.get()?;
    let _exit = enter()?;
    Some(f(registry))
}

#[allow(
    missing_docs,
    clippy::similar_names,
    clippy::not_unsafe_ptr_arg_deref,
    clippy::many_single_char_names
)]
pub mod syscall;

/// Create the process-wide registry and start intercepting.
///
/// Only the first call takes effect.
pub fn init(config: &Config) -> &'static Registry {
    let registry = REGISTRY.get_or_init(|| {
        fd_listener_core::common::init_log();
        Registry::new(config)
    });
    _ = HOOK.get_or_init(|| config.hook());
    registry
}

/// The process-wide registry, once [`init`] ran.
#[must_use]
pub fn registry() -> Option<&'static Registry> {
    REGISTRY.get()
}

/// Register a Rust listener with the process-wide registry.
///
/// Returns `false` before [`init`].
pub fn register_listener(listener: Arc<dyn Listener>) -> bool {
    registry().is_some_and(|registry| {
        registry.register(listener);
        true
    })
}

/// Start the framework.
#[no_mangle]
pub extern "C" fn fd_listener_init(config: Config) -> c_int {
    _ = init(&config);
    0
}

/// Close every tracked descriptor through its owner.
///
/// Returns how many were closed, or `-1` before init.
#[no_mangle]
pub extern "C" fn fd_listener_stop() -> c_int {
    registry().map_or(-1, |registry| {
        c_int::try_from(registry.close_all()).unwrap_or(c_int::MAX)
    })
}

/// Register a C listener. The table is copied.
///
/// Returns `-1` before init or for a null table.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[no_mangle]
pub extern "C" fn fd_listener_add(listener: *const RawListener) -> c_int {
    let Some(registry) = registry() else {
        return -1;
    };
    let Some(raw) = (unsafe { listener.as_ref() }) else {
        return -1;
    };
    let listener: Arc<dyn Listener> =
        Arc::new(CListener::new(format!("c-listener@{listener:p}"), *raw));
    _ = C_LISTENERS.insert(std::ptr::from_ref(raw) as usize, Arc::clone(&listener));
    registry.register(listener);
    0
}

/// Make a registered C listener the owner of `fd`.
///
/// Returns `-1` if `listener` was never passed to `fd_listener_add`.
#[no_mangle]
pub extern "C" fn fd_grab(fd: c_int, listener: *const RawListener) -> c_int {
    let (Some(registry), Some(listener)) = (registry(), C_LISTENERS.get(&(listener as usize)))
    else {
        return -1;
    };
    registry.grab(fd, listener.value());
    0
}
