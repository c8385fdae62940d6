//! Process-wide registry of revoked token ids (`jti`).
//!
//! Entries carry the revoked token's own `exp` so they can be pruned once the
//! token would be rejected as expired anyway. Restarting the process clears it.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

pub trait RevocationRegistry: Send + Sync {
    /// Record `jti` as revoked. `expires_at` is the token's natural expiry.
    fn add(&self, jti: &str, expires_at: i64);
    fn contains(&self, jti: &str) -> bool;
    /// Drop entries whose token expired before `now`. Returns how many were removed.
    fn prune(&self, now: i64) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool { self.len() == 0 }
}

pub type SharedRevocations = Arc<dyn RevocationRegistry>;

const SHARDS: usize = 16;

/// Sharded in-memory registry; a write only locks the shard its key hashes to.
pub struct MemoryRevocationRegistry {
    shards: Vec<RwLock<HashMap<String, i64>>>,
}

impl Default for MemoryRevocationRegistry {
    fn default() -> Self { Self { shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect() } }
}

impl MemoryRevocationRegistry {
    pub fn new() -> Self { Self::default() }

    fn shard(&self, jti: &str) -> &RwLock<HashMap<String, i64>> {
        let mut h = DefaultHasher::new();
        jti.hash(&mut h);
        &self.shards[(h.finish() as usize) % SHARDS]
    }
}

impl RevocationRegistry for MemoryRevocationRegistry {
    fn add(&self, jti: &str, expires_at: i64) {
        let mut shard = self.shard(jti).write();
        let slot = shard.entry(jti.to_string()).or_insert(expires_at);
        if *slot < expires_at { *slot = expires_at; }
    }

    fn contains(&self, jti: &str) -> bool { self.shard(jti).read().contains_key(jti) }

    fn prune(&self, now: i64) -> usize {
        let mut removed = 0usize;
        for shard in self.shards.iter() {
            let mut m = shard.write();
            let before = m.len();
            m.retain(|_, exp| *exp >= now);
            removed += before - m.len();
        }
        if removed > 0 { debug!(target: "revocation", removed = removed, "revocation prune"); }
        removed
    }

    fn len(&self) -> usize { self.shards.iter().map(|s| s.read().len()).sum() }
}
