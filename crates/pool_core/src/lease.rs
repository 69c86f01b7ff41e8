//! Per-request lease over the cache: a short-TTL mutual-exclusion marker
//! preventing two match computations for the same request from running at
//! once.
//!
//! Acquire is a non-blocking atomic set-if-absent: a held lease fails the
//! caller fast instead of queueing, keeping matching latency predictable.
//! Release is compare-and-delete on a locally generated token, so a holder
//! whose lease already expired and was re-acquired by someone else cannot
//! delete the successor's lease. The TTL is the crash safety net; it must
//! exceed worst-case matching latency.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::KvCache;
use crate::domain::RequestId;
use crate::error::{Error, Result};

fn lease_key(id: RequestId) -> String {
    format!("match:req:{id}")
}

/// Factory for per-request leases, sharing the cache client and TTL.
#[derive(Clone)]
pub struct RequestLease {
    cache: Arc<dyn KvCache>,
    ttl: Duration,
}

impl RequestLease {
    pub fn new(cache: Arc<dyn KvCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Try to take the lease for a request. Fails immediately with
    /// [`Error::MatchingInProgress`] when another holder has it.
    pub async fn acquire(&self, id: RequestId) -> Result<LeaseGuard> {
        let token = format!("{:032x}", rand::random::<u128>());
        let key = lease_key(id);
        if self.cache.set_if_absent(&key, &token, self.ttl).await? {
            debug!(request = %id, "lease acquired");
            Ok(LeaseGuard {
                cache: Arc::clone(&self.cache),
                id,
                key,
                token,
            })
        } else {
            Err(Error::MatchingInProgress(id))
        }
    }
}

/// A held lease. Must be released explicitly; if the holder crashes first,
/// the TTL reclaims it.
pub struct LeaseGuard {
    cache: Arc<dyn KvCache>,
    id: RequestId,
    key: String,
    token: String,
}

impl LeaseGuard {
    /// Release the lease if this guard still owns it. A lease lost to TTL
    /// expiry (and possibly re-acquired elsewhere) is left alone.
    pub async fn release(self) -> Result<()> {
        let deleted = self.cache.delete_if_equals(&self.key, &self.token).await?;
        if !deleted {
            warn!(request = %self.id, "lease expired before release");
        }
        Ok(())
    }
}
