//!
//! storefront-identity persistence port
//! ------------------------------------
//! The lifecycle managers never own rows; they read and write identities and
//! confirmation tokens through the two traits below. Every call may fail with
//! `LifecycleError::StorageUnavailable`, which callers propagate unchanged.
//!
//! `MemoryStore` is the in-process adapter used by the server binary and tests.
//! A database-backed adapter implements the same traits.

use std::sync::Arc;

use crate::error::LifecycleResult;
use crate::identity::{ConfirmationToken, Identity, IdentityId, NewIdentity};

mod memory;

pub use memory::MemoryStore;

pub trait IdentityStore: Send + Sync {
    fn load_identity(&self, id: IdentityId) -> LifecycleResult<Option<Identity>>;
    fn find_by_username(&self, username: &str) -> LifecycleResult<Option<Identity>>;
    fn find_by_email(&self, email: &str) -> LifecycleResult<Option<Identity>>;
    /// Persist a new identity and return it with its assigned id.
    fn insert_identity(&self, new: NewIdentity) -> LifecycleResult<Identity>;
    fn save_identity(&self, identity: &Identity) -> LifecycleResult<()>;
    /// Remove the identity and every confirmation it owns.
    fn delete_identity(&self, id: IdentityId) -> LifecycleResult<()>;
}

pub trait ConfirmationStore: Send + Sync {
    fn load_confirmation(&self, id: &str) -> LifecycleResult<Option<ConfirmationToken>>;
    /// All confirmations owned by `owner`, in no particular order.
    fn load_confirmations_for(&self, owner: IdentityId) -> LifecycleResult<Vec<ConfirmationToken>>;
    fn save_confirmation(&self, confirmation: &ConfirmationToken) -> LifecycleResult<()>;
}

pub type SharedIdentityStore = Arc<dyn IdentityStore>;
pub type SharedConfirmationStore = Arc<dyn ConfirmationStore>;
