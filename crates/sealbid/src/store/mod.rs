//! key/value store trait and implementations
//!
//! a store is the injected persistence capability behind the vaults.
//! keys are plain strings, values are opaque bytes. every operation is
//! synchronous and atomic for a single key; there are no cross-key
//! transactions.
//!
//! implementations:
//! - memory: in-process map for tests, lost on drop
//! - disk: sled-backed embedded on-disk database, survives restarts

pub mod disk;
pub mod memory;

use crate::Result;

/// pluggable key/value backend
pub trait KvStore: Send + Sync {
    /// read a value
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// write a value, replacing any previous one
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// remove a value, returns whether it existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// check for a key without reading the value
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// list keys starting with `prefix`
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

impl<S: KvStore + ?Sized> KvStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key)
    }

    fn contains(&self, key: &str) -> Result<bool> {
        (**self).contains(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).keys_with_prefix(prefix)
    }
}
