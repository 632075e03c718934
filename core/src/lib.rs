#![deny(
    // The following are allowed by default lints according to
    // https://doc.rust-lang.org/rustc/lints/listing/allowed-by-default.html
    absolute_paths_not_starting_with_crate,
    explicit_outlives_requirements,
    macro_use_extern_crate,
    redundant_lifetimes,
    anonymous_parameters,
    bare_trait_objects,
    // elided_lifetimes_in_paths, // allow anonymous lifetime
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    // single_use_lifetimes, // TODO: fix lifetime names only used once
    // trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    // unsafe_code,
    unstable_features,
    // unused_crate_dependencies,
    unused_lifetimes,
    unused_macro_rules,
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
    clippy::too_many_arguments, // listener capabilities mirror the libc signatures
    clippy::not_unsafe_ptr_arg_deref, // pointers are forwarded verbatim, never dereferenced here
)]
//! see `https://github.com/acl-dev/fd-listener`
//!
//! A registry that lets independent listeners compete for ownership of newly
//! created file descriptors and then routes every later call on a claimed
//! descriptor to its owner.
//!
//! # Examples
//!
//! ```
//! use fd_listener_core::fd::{FdInfo, FdState};
//! use fd_listener_core::listener::{Dispatch, Listener};
//! use fd_listener_core::registry::Registry;
//! use std::ffi::{c_int, CStr};
//! use std::os::fd::RawFd;
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Virt;
//!
//! impl Listener for Virt {
//!     fn open(&self, _: &mut FdState, path: &CStr, _: c_int, _: libc::mode_t) -> Dispatch<RawFd> {
//!         if path.to_bytes().starts_with(b"/virt/") {
//!             Dispatch::Handled(1000)
//!         } else {
//!             Dispatch::NoListener
//!         }
//!     }
//!
//!     fn listen(&self, _: &FdInfo, backlog: c_int) -> Dispatch<c_int> {
//!         Dispatch::Handled(backlog)
//!     }
//! }
//!
//! let registry = Registry::default();
//! registry.register(Arc::new(Virt));
//! assert_eq!(Dispatch::Handled(1000), registry.open(c"/virt/x", 0, 0));
//! assert_eq!(Dispatch::NoListener, registry.open(c"/etc/hosts", 0, 0));
//! assert_eq!(Dispatch::Handled(16), registry.listen(1000, 16));
//! assert!(registry.close(1000).is_handled());
//! assert!(registry.listen(1000, 16).is_no_listener());
//! ```

/// Common traits and impl.
pub mod common;

/// Configuration for `Registry`.
pub mod config;

/// Listener capability interface and the listener chain.
pub mod listener;

/// Descriptor ownership records and the descriptor table.
pub mod fd;

/// The dispatch core.
pub mod registry;

/// Adapter for listeners written against the C ABI.
#[allow(clippy::similar_names)]
pub mod ffi;
