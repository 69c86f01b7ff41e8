//! Key-value cache interface the core consumes but does not implement.
//!
//! Entries are advisory accelerators with short TTLs (request snapshots,
//! surge factors) and must never stand in for the store's version/status
//! re-check on booking decisions. The atomic `set_if_absent` primitive is
//! what the per-request lease is built on.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value that expires after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Atomically set the key only if it is absent (or expired). Returns
    /// whether the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete the key only while it still holds `value`. Returns whether a
    /// deletion happened; used to release leases without clobbering a
    /// successor holder's entry.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool>;
}
