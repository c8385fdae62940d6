//! Email confirmation tokens: creation, expiry, forced supersession and confirmation.
//!
//! A token is `Active` until it is confirmed (terminal success) or its `expire_at`
//! passes (terminal failure). Resend and confirm for one owner are serialized through
//! `OwnerLocks`; different owners never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::principal::IdentityId;
use crate::clock::Clock;
use crate::error::{LifecycleError, LifecycleResult};
use crate::storage::SharedConfirmationStore;
use crate::tprintln;

/// Default confirmation window (30 minutes).
pub const CONFIRMATION_TTL_SECS: i64 = 1800;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfirmationToken {
    pub id: String,
    pub owner_id: IdentityId,
    pub created_at: i64,
    pub expire_at: i64,
    pub confirmed: bool,
}

impl ConfirmationToken {
    pub fn is_expired_at(&self, now: i64) -> bool { now > self.expire_at }
    pub fn is_active_at(&self, now: i64) -> bool { !self.confirmed && !self.is_expired_at(now) }
}

/// Lifecycle state derived from a token and the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState { Active, Confirmed, Expired }

/// Per-owner mutual exclusion. Slots are created on demand and dropped once unused.
#[derive(Default)]
pub struct OwnerLocks {
    slots: Mutex<HashMap<IdentityId, Arc<Mutex<()>>>>,
}

impl OwnerLocks {
    pub fn with_owner<R>(&self, owner: IdentityId, f: impl FnOnce() -> R) -> R {
        let slot = self.slots.lock().entry(owner).or_default().clone();
        let out = {
            let _held = slot.lock();
            f()
        };
        let mut slots = self.slots.lock();
        // map + this handle; clones are only taken under the map lock
        if Arc::strong_count(&slot) == 2 { slots.remove(&owner); }
        out
    }

    pub fn len(&self) -> usize { self.slots.lock().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

pub struct ConfirmationManager {
    store: SharedConfirmationStore,
    clock: Arc<dyn Clock>,
    ttl_secs: i64,
    locks: OwnerLocks,
}

impl ConfirmationManager {
    pub fn new(store: SharedConfirmationStore, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(store, clock, CONFIRMATION_TTL_SECS)
    }

    pub fn with_ttl(store: SharedConfirmationStore, clock: Arc<dyn Clock>, ttl_secs: i64) -> Self {
        Self { store, clock, ttl_secs, locks: OwnerLocks::default() }
    }

    pub fn now(&self) -> i64 { self.clock.now() }

    pub fn is_expired(&self, token: &ConfirmationToken) -> bool { token.is_expired_at(self.clock.now()) }

    pub fn state_of(&self, token: &ConfirmationToken) -> ConfirmationState {
        if token.confirmed { ConfirmationState::Confirmed }
        else if self.is_expired(token) { ConfirmationState::Expired }
        else { ConfirmationState::Active }
    }

    /// Allocate and persist a new active token. Does not look at existing tokens.
    pub fn create(&self, owner: IdentityId) -> LifecycleResult<ConfirmationToken> {
        let token = self.new_token(owner, false);
        self.store.save_confirmation(&token)?;
        info!(target: "confirmation", owner = owner, expire_at = token.expire_at, "confirmation created");
        Ok(token)
    }

    /// Persist a token that is confirmed from the start (identity proven elsewhere).
    pub fn create_confirmed(&self, owner: IdentityId) -> LifecycleResult<ConfirmationToken> {
        let token = self.new_token(owner, true);
        self.store.save_confirmation(&token)?;
        info!(target: "confirmation", owner = owner, "confirmation created pre-confirmed");
        Ok(token)
    }

    fn new_token(&self, owner: IdentityId, confirmed: bool) -> ConfirmationToken {
        let now = self.clock.now();
        let id = uuid::Uuid::new_v4().simple().to_string();
        tprintln!("confirmation.new owner={} created_at={}", owner, now);
        ConfirmationToken { id, owner_id: owner, created_at: now, expire_at: now + self.ttl_secs, confirmed }
    }

    /// Mark the token confirmed. Failures in order: `NotFound`, `Expired`, `AlreadyConfirmed`.
    pub fn confirm(&self, token_id: &str) -> LifecycleResult<ConfirmationToken> {
        let Some(found) = self.store.load_confirmation(token_id)? else {
            return Err(LifecycleError::NotFound("confirmation"));
        };
        self.locks.with_owner(found.owner_id, || {
            // Re-read under the owner lock; a concurrent resend may have superseded it.
            let mut token = self.store.load_confirmation(token_id)?.ok_or(LifecycleError::NotFound("confirmation"))?;
            if self.is_expired(&token) { return Err(LifecycleError::Expired); }
            if token.confirmed { return Err(LifecycleError::AlreadyConfirmed); }
            token.confirmed = true;
            self.store.save_confirmation(&token)?;
            info!(target: "confirmation", owner = token.owner_id, "confirmation confirmed");
            Ok(token)
        })
    }

    /// Expire the token immediately. No-op when it is already expired.
    ///
    /// `expire_at` is set to the last second of validity (`now - 1`) so that the token is
    /// already rejected within the current second under the strict `now > expire_at` rule.
    pub fn force_expire(&self, token: &mut ConfirmationToken) -> LifecycleResult<()> {
        let now = self.clock.now();
        if token.is_expired_at(now) { return Ok(()); }
        token.expire_at = now - 1;
        self.store.save_confirmation(token)?;
        info!(target: "confirmation", owner = token.owner_id, created_at = token.created_at, "confirmation force-expired");
        Ok(())
    }

    /// The owner's token with the latest `expire_at` (ties: latest `created_at`), in any state.
    pub fn most_recent_active(&self, owner: IdentityId) -> LifecycleResult<Option<ConfirmationToken>> {
        let tokens = self.store.load_confirmations_for(owner)?;
        Ok(tokens.into_iter().max_by(|a, b| (a.expire_at, a.created_at).cmp(&(b.expire_at, b.created_at))))
    }

    /// All of the owner's tokens ordered by `expire_at`.
    pub fn list_for(&self, owner: IdentityId) -> LifecycleResult<Vec<ConfirmationToken>> {
        let mut tokens = self.store.load_confirmations_for(owner)?;
        tokens.sort_by_key(|t| (t.expire_at, t.created_at));
        Ok(tokens)
    }

    /// Resend protocol: refuse if the latest token is confirmed, supersede any active token,
    /// then issue a replacement. Runs as one unit per owner.
    pub fn resend(&self, owner: IdentityId) -> LifecycleResult<ConfirmationToken> {
        self.locks.with_owner(owner, || {
            let now = self.clock.now();
            let tokens = self.store.load_confirmations_for(owner)?;
            let latest = tokens.iter().max_by(|a, b| (a.expire_at, a.created_at).cmp(&(b.expire_at, b.created_at)));
            if latest.map(|t| t.confirmed).unwrap_or(false) {
                return Err(LifecycleError::AlreadyConfirmed);
            }
            for mut t in tokens.into_iter().filter(|t| t.is_active_at(now)) {
                self.force_expire(&mut t)?;
            }
            let fresh = self.create(owner)?;
            debug!(target: "confirmation", owner = owner, expire_at = fresh.expire_at, "confirmation resent");
            Ok(fresh)
        })
    }

    pub fn owner_lock_slots(&self) -> usize { self.locks.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;

    fn setup() -> (Arc<ManualClock>, MemoryStore, ConfirmationManager) {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryStore::new();
        let mgr = ConfirmationManager::new(Arc::new(store.clone()), clock.clone());
        (clock, store, mgr)
    }

    #[test]
    fn create_sets_fixed_window() {
        let (clock, _store, mgr) = setup();
        clock.set(50);
        let t = mgr.create(1).unwrap();
        assert_eq!(t.created_at, 50);
        assert_eq!(t.expire_at, 50 + CONFIRMATION_TTL_SECS);
        assert!(!t.confirmed);
        assert_eq!(mgr.state_of(&t), ConfirmationState::Active);
    }

    #[test]
    fn confirm_inside_window_then_again_reports_already_confirmed_until_expiry() {
        let (clock, _store, mgr) = setup();
        let t = mgr.create(1).unwrap();
        clock.set(1799);
        assert!(mgr.confirm(&t.id).unwrap().confirmed);
        clock.set(1800);
        assert_eq!(mgr.confirm(&t.id), Err(LifecycleError::AlreadyConfirmed));
        clock.set(5000);
        assert_eq!(mgr.confirm(&t.id), Err(LifecycleError::Expired));
    }

    #[test]
    fn confirm_after_window_fails_expired_without_mutation() {
        let (clock, store, mgr) = setup();
        let t = mgr.create(1).unwrap();
        clock.set(1801);
        assert_eq!(mgr.confirm(&t.id), Err(LifecycleError::Expired));
        let stored = crate::storage::ConfirmationStore::load_confirmation(&store, &t.id).unwrap().unwrap();
        assert_eq!(stored, t);
    }

    #[test]
    fn confirm_unknown_id_is_not_found() {
        let (_clock, _store, mgr) = setup();
        assert_eq!(mgr.confirm("nope"), Err(LifecycleError::NotFound("confirmation")));
    }

    #[test]
    fn force_expire_is_idempotent() {
        let (clock, store, mgr) = setup();
        let mut t = mgr.create(1).unwrap();
        clock.set(100);
        mgr.force_expire(&mut t).unwrap();
        let once = t.expire_at;
        assert_eq!(once, 99);
        assert_eq!(crate::storage::ConfirmationStore::load_confirmation(&store, &t.id).unwrap().unwrap().expire_at, 99);
        mgr.force_expire(&mut t).unwrap();
        assert_eq!(t.expire_at, once);
        clock.set(200);
        mgr.force_expire(&mut t).unwrap();
        assert_eq!(t.expire_at, once);
        assert!(mgr.is_expired(&t));
    }

    #[test]
    fn most_recent_breaks_ties_by_created_at() {
        let (clock, store, mgr) = setup();
        let a = ConfirmationToken { id: "a".into(), owner_id: 7, created_at: 10, expire_at: 900, confirmed: false };
        let b = ConfirmationToken { id: "b".into(), owner_id: 7, created_at: 20, expire_at: 900, confirmed: false };
        let c = ConfirmationToken { id: "c".into(), owner_id: 7, created_at: 30, expire_at: 800, confirmed: false };
        for t in [&a, &b, &c] { crate::storage::ConfirmationStore::save_confirmation(&store, t).unwrap(); }
        clock.set(0);
        assert_eq!(mgr.most_recent_active(7).unwrap().map(|t| t.id), Some("b".to_string()));
        assert!(mgr.most_recent_active(8).unwrap().is_none());
    }

    #[test]
    fn resend_supersedes_active_token() {
        let (clock, _store, mgr) = setup();
        let old = mgr.create(1).unwrap();
        clock.set(600);
        let new = mgr.resend(1).unwrap();
        assert_ne!(new.id, old.id);
        assert_eq!(new.expire_at, 600 + CONFIRMATION_TTL_SECS);
        assert_eq!(mgr.confirm(&old.id), Err(LifecycleError::Expired));
        assert!(mgr.confirm(&new.id).is_ok());
        assert_eq!(mgr.owner_lock_slots(), 0);
    }

    #[test]
    fn resend_after_confirmation_is_refused() {
        let (_clock, _store, mgr) = setup();
        let t = mgr.create(1).unwrap();
        mgr.confirm(&t.id).unwrap();
        assert_eq!(mgr.resend(1), Err(LifecycleError::AlreadyConfirmed));
        assert_eq!(mgr.list_for(1).unwrap().len(), 1);
    }

    #[test]
    fn owner_locks_release_slots() {
        let locks = OwnerLocks::default();
        let v = locks.with_owner(3, || {
            assert_eq!(locks.len(), 1);
            42
        });
        assert_eq!(v, 42);
        assert!(locks.is_empty());
    }
}
