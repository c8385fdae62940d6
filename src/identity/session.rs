use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::claims::{ClaimSet, ClaimsResolver};
use super::principal::{Identity, IdentityId};
use super::revocation::SharedRevocations;
use super::token::{TokenCodec, TokenKind, TokenPayload};
use crate::clock::Clock;
use crate::error::{LifecycleError, LifecycleResult, TokenError};

pub type SessionToken = String;

/// Access token lifetime (15 minutes).
pub const ACCESS_TTL_SECS: i64 = 15 * 60;
/// Refresh token lifetime (30 days).
pub const REFRESH_TTL_SECS: i64 = 30 * 24 * 3600;

/// Result of an issuance. `refresh_token` is only present for logins; a refresh
/// exchange mints a new access token and leaves the refresh token as it was.
#[derive(Debug, Clone, Serialize)]
pub struct SessionCredential {
    pub subject_id: IdentityId,
    pub fresh: bool,
    pub claims: ClaimSet,
    pub access_token: SessionToken,
    pub access_jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<SessionToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_jti: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionTtl {
    pub access_secs: i64,
    pub refresh_secs: i64,
}

impl Default for SessionTtl {
    fn default() -> Self { Self { access_secs: ACCESS_TTL_SECS, refresh_secs: REFRESH_TTL_SECS } }
}

pub struct SessionManager {
    codec: TokenCodec,
    claims: Arc<dyn ClaimsResolver>,
    revoked: SharedRevocations,
    clock: Arc<dyn Clock>,
    pub ttl: SessionTtl,
}

fn gen_jti() -> String { uuid::Uuid::new_v4().to_string() }

impl SessionManager {
    pub fn new(codec: TokenCodec, claims: Arc<dyn ClaimsResolver>, revoked: SharedRevocations, clock: Arc<dyn Clock>, ttl: SessionTtl) -> Self {
        Self { codec, claims, revoked, clock, ttl }
    }

    fn mint(&self, sub: IdentityId, kind: TokenKind, fresh: bool, claims: ClaimSet, now: i64) -> (SessionToken, String) {
        let ttl = match kind { TokenKind::Access => self.ttl.access_secs, TokenKind::Refresh => self.ttl.refresh_secs };
        let jti = gen_jti();
        let payload = TokenPayload { sub, jti: jti.clone(), kind, fresh, claims, iat: now, exp: now + ttl };
        (self.codec.encode(&payload), jti)
    }

    /// Issue a fresh access token plus a refresh token. The caller has already checked
    /// the password (or external login) and that the identity is confirmed.
    pub fn issue_from_login(&self, identity: &Identity) -> SessionCredential {
        let now = self.clock.now();
        let claims = self.claims.resolve(identity.id);
        let (access_token, access_jti) = self.mint(identity.id, TokenKind::Access, true, claims, now);
        let (refresh_token, refresh_jti) = self.mint(identity.id, TokenKind::Refresh, false, claims, now);
        info!(target: "session", user = identity.id, jti = %access_jti, admin = claims.is_admin, "session issued (fresh)");
        SessionCredential { subject_id: identity.id, fresh: true, claims, access_token, access_jti, refresh_token: Some(refresh_token), refresh_jti: Some(refresh_jti) }
    }

    /// Exchange a refresh token for a new, non-fresh access token with the same claims.
    pub fn refresh(&self, refresh_token: &str) -> LifecycleResult<SessionCredential> {
        let now = self.clock.now();
        let rt = self.verify(refresh_token, TokenKind::Refresh, now)?;
        let (access_token, access_jti) = self.mint(rt.sub, TokenKind::Access, false, rt.claims, now);
        info!(target: "session", user = rt.sub, jti = %access_jti, refresh_jti = %rt.jti, "session refreshed (non-fresh)");
        Ok(SessionCredential { subject_id: rt.sub, fresh: false, claims: rt.claims, access_token, access_jti, refresh_token: None, refresh_jti: None })
    }

    /// Validate a token presented on a protected call.
    pub fn validate_access(&self, access_token: &str) -> LifecycleResult<TokenPayload> {
        self.verify(access_token, TokenKind::Access, self.clock.now())
    }

    fn verify(&self, token: &str, kind: TokenKind, now: i64) -> LifecycleResult<TokenPayload> {
        let payload = self.codec.decode(token, now)?;
        if payload.kind != kind { return Err(TokenError::WrongKind.into()); }
        if self.revoked.contains(&payload.jti) { return Err(LifecycleError::Revoked); }
        Ok(payload)
    }

    /// Revoke the presented token's `jti`; later validations fail with `Revoked`.
    pub fn revoke(&self, token: &str) -> LifecycleResult<TokenPayload> {
        let payload = self.codec.decode(token, self.clock.now())?;
        self.revoked.add(&payload.jti, payload.exp);
        info!(target: "session", user = payload.sub, jti = %payload.jti, kind = ?payload.kind, "token revoked");
        Ok(payload)
    }

    pub fn require_fresh(&self, credential: &TokenPayload) -> LifecycleResult<()> {
        if credential.fresh { Ok(()) } else { Err(LifecycleError::StaleCredential) }
    }

    /// Validation plus freshness gate, for sensitive operations.
    pub fn require_fresh_token(&self, access_token: &str) -> LifecycleResult<TokenPayload> {
        let payload = self.validate_access(access_token)?;
        self.require_fresh(&payload)?;
        Ok(payload)
    }
}
