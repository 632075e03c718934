use crate::common::constants::{default_shard_amount, DEFAULT_CAPACITY};

/// Sizing of the descriptor table and whether the front-end intercepts calls.
#[repr(C)]
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Config {
    capacity: usize,
    shard_amount: usize,
    hook: bool,
}

impl Config {
    /// A config for a process with little descriptor traffic.
    #[must_use]
    pub fn single() -> Self {
        Self::new(DEFAULT_CAPACITY, 2, true)
    }

    /// Create a new `Config`.
    ///
    /// # Panics
    /// if `shard_amount` is not a power of two greater than 1.
    #[must_use]
    pub fn new(capacity: usize, shard_amount: usize, hook: bool) -> Self {
        let mut config = Self {
            capacity,
            shard_amount: 2,
            hook,
        };
        _ = config.set_shard_amount(shard_amount);
        config
    }

    /// Initial capacity of the descriptor table.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of shards of the descriptor table.
    #[must_use]
    pub fn shard_amount(&self) -> usize {
        self.shard_amount
    }

    /// Whether the front-end routes intercepted calls into the registry.
    #[must_use]
    pub fn hook(&self) -> bool {
        self.hook
    }

    /// Set the initial capacity of the descriptor table.
    pub fn set_capacity(&mut self, capacity: usize) -> &mut Self {
        self.capacity = capacity;
        self
    }

    /// Set the shard amount of the descriptor table.
    pub fn set_shard_amount(&mut self, shard_amount: usize) -> &mut Self {
        assert!(shard_amount > 1, "shard_amount must be greater than 1");
        assert!(
            shard_amount.is_power_of_two(),
            "shard_amount must be a power of two"
        );
        self.shard_amount = shard_amount;
        self
    }

    /// Enable or disable interception.
    pub fn set_hook(&mut self, hook: bool) -> &mut Self {
        self.hook = hook;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, default_shard_amount(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_chain() {
        let mut config = Config::single();
        _ = config.set_capacity(1024).set_shard_amount(8).set_hook(false);
        assert_eq!(1024, config.capacity());
        assert_eq!(8, config.shard_amount());
        assert!(!config.hook());
    }

    #[test]
    fn default_is_hooking() {
        let config = Config::default();
        assert!(config.hook());
        assert_eq!(DEFAULT_CAPACITY, config.capacity());
        assert!(config.shard_amount().is_power_of_two());
    }

    #[test]
    #[should_panic(expected = "shard_amount must be a power of two")]
    fn rejects_odd_shards() {
        _ = Config::new(16, 6, true);
    }

    #[test]
    #[should_panic(expected = "shard_amount must be greater than 1")]
    fn rejects_single_shard() {
        _ = Config::default().set_shard_amount(1);
    }
}
