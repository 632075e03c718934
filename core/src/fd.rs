use crate::listener::Listener;
use dashmap::DashMap;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::os::fd::RawFd;
use std::sync::Arc;

/// Listener-private state attached to a descriptor.
///
/// Holds at most one value. Whatever it holds is dropped together with the
/// state, so a negotiation that ends without a claim releases it too.
#[derive(Default)]
pub struct FdState(Option<Box<dyn Any + Send + Sync>>);

impl Debug for FdState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FdState")
            .field("empty", &self.is_empty())
            .finish()
    }
}

impl FdState {
    /// An empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A state already holding `value`.
    #[must_use]
    pub fn with<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Box::new(value)))
    }

    /// Store `value`, dropping whatever was held before.
    pub fn set<T: Any + Send + Sync>(&mut self, value: T) {
        self.0 = Some(Box::new(value));
    }

    /// Borrow the held value if it is a `T`.
    #[must_use]
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_ref().and_then(|v| v.downcast_ref::<T>())
    }

    /// Mutably borrow the held value if it is a `T`.
    #[must_use]
    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.0.as_mut().and_then(|v| v.downcast_mut::<T>())
    }

    /// Take the held value out if it is a `T`.
    ///
    /// A value of another type is left in place.
    #[must_use]
    pub fn take<T: Any>(&mut self) -> Option<T> {
        match self.0.take()?.downcast::<T>() {
            Ok(v) => Some(*v),
            Err(other) => {
                self.0 = Some(other);
                None
            }
        }
    }

    /// Drop the held value.
    pub fn clear(&mut self) {
        self.0 = None;
    }

    /// Returns `true` if nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

/// The ownership record of a tracked descriptor.
#[derive(Debug)]
pub struct FdInfo {
    fd: RawFd,
    listener: Arc<dyn Listener>,
    state: FdState,
}

impl FdInfo {
    /// Bind `fd` to `listener` with its private `state`.
    #[must_use]
    pub fn new(fd: RawFd, listener: Arc<dyn Listener>, state: FdState) -> Self {
        Self {
            fd,
            listener,
            state,
        }
    }

    /// The descriptor, also the key of this record in the [`FdTable`].
    #[must_use]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// The owning listener.
    #[must_use]
    pub fn listener(&self) -> &Arc<dyn Listener> {
        &self.listener
    }

    /// Returns `true` if `listener` is the owner.
    #[must_use]
    pub fn is_owned_by(&self, listener: &Arc<dyn Listener>) -> bool {
        Arc::ptr_eq(&self.listener, listener)
    }

    /// The listener-private state.
    #[must_use]
    pub fn state(&self) -> &FdState {
        &self.state
    }

    /// Shortcut for `self.state().get::<T>()`.
    #[must_use]
    pub fn state_as<T: Any>(&self) -> Option<&T> {
        self.state.get::<T>()
    }
}

/// Live descriptors and their ownership records.
#[derive(Debug)]
pub struct FdTable(DashMap<RawFd, Arc<FdInfo>>);

impl Default for FdTable {
    fn default() -> Self {
        Self(DashMap::new())
    }
}

impl FdTable {
    /// Create a table with room for `capacity` descriptors spread over
    /// `shard_amount` shards.
    ///
    /// # Panics
    /// if `shard_amount` is not a power of two greater than 1.
    #[must_use]
    pub fn new(capacity: usize, shard_amount: usize) -> Self {
        Self(DashMap::with_capacity_and_shard_amount(
            capacity,
            shard_amount,
        ))
    }

    /// Insert `info` under its own descriptor, returning the record it
    /// replaced.
    pub fn insert(&self, info: FdInfo) -> Option<Arc<FdInfo>> {
        self.0.insert(info.fd(), Arc::new(info))
    }

    /// The record of `fd`.
    ///
    /// The shard lock is released before this returns.
    #[must_use]
    pub fn get(&self, fd: RawFd) -> Option<Arc<FdInfo>> {
        self.0.get(&fd).map(|r| Arc::clone(r.value()))
    }

    /// Remove `info` only if it is still the record of its descriptor.
    pub fn remove_record(&self, info: &Arc<FdInfo>) -> bool {
        self.0
            .remove_if(&info.fd(), |_, current| Arc::ptr_eq(current, info))
            .is_some()
    }

    /// Returns `true` if `fd` has a record.
    #[must_use]
    pub fn contains(&self, fd: RawFd) -> bool {
        self.0.contains_key(&fd)
    }

    /// Number of tracked descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no descriptor is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A snapshot of the tracked descriptors, in no particular order.
    #[must_use]
    pub fn fds(&self) -> Vec<RawFd> {
        self.0.iter().map(|r| *r.key()).collect()
    }
}
