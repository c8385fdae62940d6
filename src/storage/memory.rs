use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{ConfirmationStore, IdentityStore};
use crate::error::{LifecycleError, LifecycleResult};
use crate::identity::{ConfirmationToken, Identity, IdentityId, NewIdentity};

#[derive(Default)]
struct Tables {
    identities: HashMap<IdentityId, Identity>,
    confirmations: HashMap<String, ConfirmationToken>,
}

/// In-memory implementation of both persistence traits.
///
/// Cloning shares the underlying tables. `set_offline(true)` makes every call fail
/// with `StorageUnavailable`, standing in for a lost database connection.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    next_id: Arc<AtomicI64>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn set_offline(&self, offline: bool) { self.offline.store(offline, Ordering::SeqCst); }

    fn online(&self) -> LifecycleResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LifecycleError::StorageUnavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

impl IdentityStore for MemoryStore {
    fn load_identity(&self, id: IdentityId) -> LifecycleResult<Option<Identity>> {
        self.online()?;
        Ok(self.tables.read().identities.get(&id).cloned())
    }

    fn find_by_username(&self, username: &str) -> LifecycleResult<Option<Identity>> {
        self.online()?;
        Ok(self.tables.read().identities.values().find(|i| i.username == username).cloned())
    }

    fn find_by_email(&self, email: &str) -> LifecycleResult<Option<Identity>> {
        self.online()?;
        Ok(self.tables.read().identities.values().find(|i| i.email.as_deref() == Some(email)).cloned())
    }

    fn insert_identity(&self, new: NewIdentity) -> LifecycleResult<Identity> {
        self.online()?;
        let mut t = self.tables.write();
        // Enforce the same uniqueness a relational schema would.
        if t.identities.values().any(|i| i.username == new.username) {
            return Err(LifecycleError::Conflict(format!("a user with username '{}' already exists", new.username)));
        }
        if let Some(email) = new.email.as_deref() {
            if t.identities.values().any(|i| i.email.as_deref() == Some(email)) {
                return Err(LifecycleError::Conflict(format!("a user with email '{}' already exists", email)));
            }
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let identity = Identity { id, username: new.username, password_hash: new.password_hash, email: new.email };
        t.identities.insert(id, identity.clone());
        Ok(identity)
    }

    fn save_identity(&self, identity: &Identity) -> LifecycleResult<()> {
        self.online()?;
        let mut t = self.tables.write();
        if !t.identities.contains_key(&identity.id) { return Err(LifecycleError::NotFound("user")); }
        t.identities.insert(identity.id, identity.clone());
        Ok(())
    }

    fn delete_identity(&self, id: IdentityId) -> LifecycleResult<()> {
        self.online()?;
        let mut t = self.tables.write();
        t.identities.remove(&id);
        t.confirmations.retain(|_, c| c.owner_id != id);
        Ok(())
    }
}

impl ConfirmationStore for MemoryStore {
    fn load_confirmation(&self, id: &str) -> LifecycleResult<Option<ConfirmationToken>> {
        self.online()?;
        Ok(self.tables.read().confirmations.get(id).cloned())
    }

    fn load_confirmations_for(&self, owner: IdentityId) -> LifecycleResult<Vec<ConfirmationToken>> {
        self.online()?;
        Ok(self.tables.read().confirmations.values().filter(|c| c.owner_id == owner).cloned().collect())
    }

    fn save_confirmation(&self, confirmation: &ConfirmationToken) -> LifecycleResult<()> {
        self.online()?;
        self.tables.write().confirmations.insert(confirmation.id.clone(), confirmation.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str, email: Option<&str>) -> NewIdentity {
        NewIdentity { username: name.into(), password_hash: None, email: email.map(|e| e.to_string()) }
    }

    fn token(id: &str, owner: IdentityId) -> ConfirmationToken {
        ConfirmationToken { id: id.into(), owner_id: owner, created_at: 0, expire_at: 1800, confirmed: false }
    }

    #[test]
    fn insert_assigns_increasing_ids_and_rejects_duplicates() {
        let s = MemoryStore::new();
        let a = s.insert_identity(new_user("ann", Some("ann@example.com"))).unwrap();
        let b = s.insert_identity(new_user("bob", None)).unwrap();
        assert!(b.id > a.id);
        assert!(matches!(s.insert_identity(new_user("ann", None)), Err(LifecycleError::Conflict(_))));
        assert!(matches!(s.insert_identity(new_user("carl", Some("ann@example.com"))), Err(LifecycleError::Conflict(_))));
        assert_eq!(s.find_by_email("ann@example.com").unwrap().map(|i| i.id), Some(a.id));
    }

    #[test]
    fn delete_identity_cascades_to_confirmations() {
        let s = MemoryStore::new();
        let a = s.insert_identity(new_user("ann", None)).unwrap();
        let b = s.insert_identity(new_user("bob", None)).unwrap();
        s.save_confirmation(&token("c1", a.id)).unwrap();
        s.save_confirmation(&token("c2", b.id)).unwrap();
        s.delete_identity(a.id).unwrap();
        assert!(s.load_identity(a.id).unwrap().is_none());
        assert!(s.load_confirmation("c1").unwrap().is_none());
        assert!(s.load_confirmation("c2").unwrap().is_some());
    }

    #[test]
    fn offline_store_fails_every_call() {
        let s = MemoryStore::new();
        s.set_offline(true);
        assert!(matches!(s.load_identity(1), Err(LifecycleError::StorageUnavailable(_))));
        assert!(matches!(s.load_confirmations_for(1), Err(LifecycleError::StorageUnavailable(_))));
        s.set_offline(false);
        assert!(s.load_identity(1).unwrap().is_none());
    }
}
