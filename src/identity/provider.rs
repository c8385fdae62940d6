use std::sync::Arc;

use tracing::{error, info, warn};

use super::confirmation::{ConfirmationManager, ConfirmationToken};
use super::principal::{Identity, IdentityId, NewIdentity};
use super::session::{SessionCredential, SessionManager};
use super::token::TokenPayload;
use crate::error::{LifecycleError, LifecycleResult};
use crate::mail::{confirmation_message, SharedMailer};
use crate::storage::SharedIdentityStore;

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

/// Snapshot of an owner's confirmations for the admin view.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConfirmationStatus {
    pub current_time: i64,
    pub confirmation: Vec<ConfirmationToken>,
}

pub trait AuthProvider: Send + Sync {
    fn login(&self, req: &LoginRequest) -> LifecycleResult<SessionCredential>;
}

/// Composition of the identity directory, confirmation lifecycle, sessions and mail.
/// Every method re-reads current state from the stores.
pub struct AccountService {
    pub identities: SharedIdentityStore,
    pub confirmations: Arc<ConfirmationManager>,
    pub sessions: Arc<SessionManager>,
    pub mailer: SharedMailer,
    pub public_url: String,
}

impl AccountService {
    fn send_confirmation(&self, identity: &Identity, confirmation: &ConfirmationToken) -> LifecycleResult<()> {
        let Some(email) = identity.email.as_deref() else {
            return Err(LifecycleError::MailUnavailable(format!("user {} has no email address", identity.id)));
        };
        let (subject, text, html) = confirmation_message(&self.public_url, &confirmation.id);
        self.mailer.send(email, &subject, &text, &html)
    }

    /// Create the identity, its first confirmation and send the link. Any failure after the
    /// identity is persisted deletes it again so no unconfirmable account is left behind.
    pub fn register(&self, req: &RegisterRequest) -> LifecycleResult<Identity> {
        if self.identities.find_by_username(&req.username)?.is_some() {
            return Err(LifecycleError::Conflict(format!("a user with username '{}' already exists", req.username)));
        }
        if self.identities.find_by_email(&req.email)?.is_some() {
            return Err(LifecycleError::Conflict(format!("a user with email '{}' already exists", req.email)));
        }
        let hash = crate::security::hash_password(&req.password)
            .map_err(|e| LifecycleError::Internal(format!("password hashing failed: {e}")))?;
        let identity = self.identities.insert_identity(NewIdentity {
            username: req.username.clone(),
            password_hash: Some(hash),
            email: Some(req.email.clone()),
        })?;
        let outcome = self.confirmations.create(identity.id).and_then(|c| self.send_confirmation(&identity, &c));
        if let Err(e) = outcome {
            warn!(target: "confirmation", user = identity.id, "registration rolled back: {e}");
            if let Err(rollback) = self.identities.delete_identity(identity.id) {
                error!(target: "confirmation", user = identity.id, "rollback failed: {rollback}");
            }
            return Err(e);
        }
        info!(target: "confirmation", user = identity.id, username = %identity.username, "user registered");
        Ok(identity)
    }

    /// Confirmation gate shared by local and external logins.
    fn ensure_confirmed(&self, identity: &Identity) -> LifecycleResult<()> {
        match self.confirmations.most_recent_active(identity.id)? {
            Some(c) if c.confirmed => Ok(()),
            _ => Err(LifecycleError::NotConfirmed),
        }
    }

    /// The single external-login path: the external provider has already proven `username`.
    /// Unknown users are created without a password and with a pre-confirmed token.
    pub fn login_external(&self, username: &str) -> LifecycleResult<SessionCredential> {
        let identity = match self.identities.find_by_username(username)? {
            // An external-only identity left without any confirmation (a failed earlier
            // creation whose rollback also failed) is repaired here.
            Some(i) if i.password_hash.is_none() && self.confirmations.most_recent_active(i.id)?.is_none() => {
                self.confirmations.create_confirmed(i.id)?;
                warn!(target: "session", user = i.id, username = username, "external identity had no confirmation; repaired");
                i
            }
            Some(i) => i,
            None => {
                let created = self.identities.insert_identity(NewIdentity { username: username.to_string(), password_hash: None, email: None })?;
                if let Err(e) = self.confirmations.create_confirmed(created.id) {
                    warn!(target: "session", user = created.id, "external login creation rolled back: {e}");
                    if let Err(rollback) = self.identities.delete_identity(created.id) {
                        error!(target: "session", user = created.id, "rollback failed: {rollback}");
                    }
                    return Err(e);
                }
                info!(target: "session", user = created.id, username = username, "user created via external login");
                created
            }
        };
        self.ensure_confirmed(&identity)?;
        Ok(self.sessions.issue_from_login(&identity))
    }

    /// Resend protocol followed by dispatch. The mail goes out after the owner lock is released.
    pub fn resend_confirmation(&self, owner: IdentityId) -> LifecycleResult<ConfirmationToken> {
        let Some(identity) = self.identities.load_identity(owner)? else {
            return Err(LifecycleError::NotFound("user"));
        };
        let fresh = self.confirmations.resend(owner)?;
        self.send_confirmation(&identity, &fresh)?;
        info!(target: "confirmation", user = owner, expire_at = fresh.expire_at, "confirmation email re-sent");
        Ok(fresh)
    }

    pub fn confirm(&self, confirmation_id: &str) -> LifecycleResult<ConfirmationToken> {
        self.confirmations.confirm(confirmation_id)
    }

    /// Admin-only listing of an owner's confirmations, ordered by `expire_at`.
    pub fn confirmation_status(&self, caller: &TokenPayload, owner: IdentityId) -> LifecycleResult<ConfirmationStatus> {
        if !caller.claims.is_admin { return Err(LifecycleError::Forbidden); }
        if self.identities.load_identity(owner)?.is_none() { return Err(LifecycleError::NotFound("user")); }
        Ok(ConfirmationStatus { current_time: self.confirmations.now(), confirmation: self.confirmations.list_for(owner)? })
    }

    /// Change a password. Requires a fresh credential belonging to the target user or an admin.
    pub fn set_password(&self, caller: &TokenPayload, username: &str, new_password: &str) -> LifecycleResult<()> {
        self.sessions.require_fresh(caller)?;
        let Some(mut identity) = self.identities.find_by_username(username)? else {
            return Err(LifecycleError::NotFound("user"));
        };
        if identity.id != caller.sub && !caller.claims.is_admin { return Err(LifecycleError::Forbidden); }
        let hash = crate::security::hash_password(new_password)
            .map_err(|e| LifecycleError::Internal(format!("password hashing failed: {e}")))?;
        identity.password_hash = Some(hash);
        self.identities.save_identity(&identity)?;
        info!(target: "session", user = identity.id, "password updated");
        Ok(())
    }

    pub fn get_identity(&self, id: IdentityId) -> LifecycleResult<Identity> {
        self.identities.load_identity(id)?.ok_or(LifecycleError::NotFound("user"))
    }

    /// Delete an identity (cascading to its confirmations). Callers may delete themselves;
    /// deleting anyone else needs the admin claim.
    pub fn delete_identity(&self, caller: &TokenPayload, id: IdentityId) -> LifecycleResult<()> {
        if caller.sub != id && !caller.claims.is_admin { return Err(LifecycleError::Forbidden); }
        if self.identities.load_identity(id)?.is_none() { return Err(LifecycleError::NotFound("user")); }
        self.identities.delete_identity(id)?;
        info!(target: "confirmation", user = id, "user deleted");
        Ok(())
    }

    pub fn refresh(&self, refresh_token: &str) -> LifecycleResult<SessionCredential> {
        self.sessions.refresh(refresh_token)
    }

    pub fn logout(&self, access_token: &str) -> LifecycleResult<TokenPayload> {
        let payload = self.sessions.validate_access(access_token)?;
        self.sessions.revoke(access_token)?;
        Ok(payload)
    }
}

impl AuthProvider for AccountService {
    fn login(&self, req: &LoginRequest) -> LifecycleResult<SessionCredential> {
        let Some(identity) = self.identities.find_by_username(&req.username)? else {
            return Err(LifecycleError::InvalidCredentials);
        };
        // External-only accounts have no local password.
        let Some(hash) = identity.password_hash.as_deref() else {
            return Err(LifecycleError::InvalidCredentials);
        };
        if !crate::security::verify_password(hash, &req.password) {
            return Err(LifecycleError::InvalidCredentials);
        }
        self.ensure_confirmed(&identity)?;
        Ok(self.sessions.issue_from_login(&identity))
    }
}
