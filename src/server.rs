//!
//! storefront-identity HTTP server
//! -------------------------------
//! Axum routes for the identity trust lifecycle. Each route maps onto one
//! `AccountService` operation and renders its result; failures become `AppError`
//! responses with the documented status codes.
//!
//! Responsibilities:
//! - Bearer-token extraction and validation for protected routes.
//! - Running blocking port calls (storage, mail, password hashing) off the async workers.
//! - A periodic sweeper pruning revocation entries whose tokens have expired.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{AppError, AppResult, LifecycleResult};
use crate::identity::{
    AccountService, AllowListClaims, AuthProvider, ConfirmationManager, IdentityId, LoginRequest,
    MemoryRevocationRegistry, RegisterRequest, RequestContext, SessionManager, SessionTtl, SharedRevocations,
    TokenCodec, TokenPayload,
};
use crate::mail::{MailgunMailer, SharedMailer};
use crate::storage::{ConfirmationStore, IdentityStore, MemoryStore};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
}

/// Wire the managers together from configuration and the given ports.
pub fn build_accounts<S>(cfg: &Config, store: S, mailer: SharedMailer, clock: Arc<dyn Clock>, revocations: SharedRevocations) -> AccountService
where
    S: IdentityStore + ConfirmationStore + Clone + 'static,
{
    let confirmations = ConfirmationManager::with_ttl(Arc::new(store.clone()), clock.clone(), cfg.confirmation_ttl_secs);
    let sessions = SessionManager::new(
        TokenCodec::new(cfg.jwt_secret.as_bytes()),
        Arc::new(AllowListClaims::new(cfg.admin_ids.iter().copied(), cfg.paid_ids.iter().copied())),
        revocations,
        clock,
        SessionTtl { access_secs: cfg.access_ttl_secs, refresh_secs: cfg.refresh_ttl_secs },
    );
    AccountService {
        identities: Arc::new(store),
        confirmations: Arc::new(confirmations),
        sessions: Arc::new(sessions),
        mailer,
        public_url: cfg.public_url.clone(),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "storefront identity ok" }))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/user_confirm/{confirmation_id}", get(confirm))
        .route("/confirmation/user/{user_id}", get(confirmation_status).post(resend_confirmation))
        .route("/user/{user_id}", get(get_user).delete(delete_user))
        .route("/user/password", post(set_password))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and the revocation sweeper.
pub async fn run(cfg: Config) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let revocations: SharedRevocations = Arc::new(MemoryRevocationRegistry::new());
    let mailer: SharedMailer = Arc::new(MailgunMailer::new(cfg.mailgun_api_key.clone(), cfg.mailgun_domain.clone()));
    if cfg.mailgun_api_key.is_none() || cfg.mailgun_domain.is_none() {
        tracing::warn!(target: "startup", "MAILGUN_API_KEY/MAILGUN_DOMAIN not set; registration mail will fail");
    }
    let accounts = build_accounts(&cfg, MemoryStore::new(), mailer, clock.clone(), revocations.clone());

    if cfg.revocation_sweep_secs > 0 {
        let interval = cfg.revocation_sweep_secs;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(interval)).await;
                let removed = revocations.prune(clock.now());
                if removed > 0 { debug!(target: "revocation", removed = removed, remaining = revocations.len(), "revocation_sweep"); }
            }
        });
    } else {
        info!(target: "startup", "revocation sweeper disabled");
    }

    let app = router(AppState { accounts: Arc::new(accounts) });
    let addr: SocketAddr = format!("{}:{}", cfg.bind, cfg.http_port).parse()
        .with_context(|| format!("invalid bind address {}:{}", cfg.bind, cfg.http_port))?;
    info!(target: "startup", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Run a port-touching operation on the blocking pool.
async fn blocking<T, F>(f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> LifecycleResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal("join_error".to_string(), e.to_string()))?
        .map_err(AppError::from)
}

fn bearer(headers: &HeaderMap) -> AppResult<String> {
    let ctx = RequestContext::from_headers(headers);
    ctx.bearer.ok_or_else(|| {
        debug!(target: "http", request_id = ctx.request_id.as_deref().unwrap_or("-"), "request without bearer token");
        AppError::auth("authorization_required", "Request does not contain an access token.")
    })
}

fn authorize(state: &AppState, headers: &HeaderMap) -> AppResult<TokenPayload> {
    let token = bearer(headers)?;
    state.accounts.sessions.validate_access(&token).map_err(|e| {
        let request_id = RequestContext::from_headers(headers).request_id;
        debug!(target: "http", request_id = request_id.as_deref().unwrap_or("-"), "bearer token rejected: {e}");
        AppError::from(e)
    })
}

#[derive(Debug, Deserialize)]
struct RegisterPayload { username: String, password: String, email: String }

#[derive(Debug, Deserialize)]
struct LoginPayload { username: String, password: String }

#[derive(Debug, Deserialize)]
struct PasswordPayload { username: String, password: String }

async fn register(State(state): State<AppState>, Json(payload): Json<RegisterPayload>) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    if payload.username.trim().is_empty() || payload.password.is_empty() || !payload.email.contains('@') {
        return Err(AppError::user("invalid_input", "username, password and a valid email are required"));
    }
    let accounts = state.accounts.clone();
    let req = RegisterRequest { username: payload.username, password: payload.password, email: payload.email };
    let user = blocking(move || accounts.register(&req)).await?;
    Ok((StatusCode::CREATED, Json(json!({
        "status": "ok",
        "user_id": user.id,
        "message": "Account created successfully, an email with an activation link has been sent to your email address, please check.",
    }))))
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> AppResult<Json<serde_json::Value>> {
    let accounts = state.accounts.clone();
    let req = LoginRequest { username: payload.username, password: payload.password };
    let cred = blocking(move || accounts.login(&req)).await?;
    Ok(Json(json!({"access_token": cred.access_token, "refresh_token": cred.refresh_token})))
}

async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<serde_json::Value>> {
    let token = bearer(&headers)?;
    let cred = state.accounts.refresh(&token)?;
    Ok(Json(json!({"access_token": cred.access_token})))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<serde_json::Value>> {
    let token = bearer(&headers)?;
    let payload = state.accounts.logout(&token)?;
    Ok(Json(json!({"status": "ok", "message": format!("User <id={}> successfully logged out.", payload.sub)})))
}

async fn confirm(State(state): State<AppState>, Path(confirmation_id): Path<String>) -> AppResult<Json<serde_json::Value>> {
    let accounts = state.accounts.clone();
    let c = blocking(move || accounts.confirm(&confirmation_id)).await?;
    Ok(Json(json!({"status": "ok", "user_id": c.owner_id, "message": "Registration confirmed."})))
}

async fn resend_confirmation(State(state): State<AppState>, Path(user_id): Path<IdentityId>) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let accounts = state.accounts.clone();
    blocking(move || accounts.resend_confirmation(user_id)).await?;
    Ok((StatusCode::CREATED, Json(json!({"status": "ok", "message": "E-mail confirmation successfully re-sent."}))))
}

async fn confirmation_status(State(state): State<AppState>, headers: HeaderMap, Path(user_id): Path<IdentityId>) -> AppResult<Json<serde_json::Value>> {
    let caller = authorize(&state, &headers)?;
    let accounts = state.accounts.clone();
    let status = blocking(move || accounts.confirmation_status(&caller, user_id)).await?;
    Ok(Json(json!(status)))
}

async fn get_user(State(state): State<AppState>, Path(user_id): Path<IdentityId>) -> AppResult<Json<serde_json::Value>> {
    let accounts = state.accounts.clone();
    let user = blocking(move || accounts.get_identity(user_id)).await?;
    Ok(Json(json!(user)))
}

async fn delete_user(State(state): State<AppState>, headers: HeaderMap, Path(user_id): Path<IdentityId>) -> AppResult<Json<serde_json::Value>> {
    let caller = authorize(&state, &headers)?;
    let accounts = state.accounts.clone();
    blocking(move || accounts.delete_identity(&caller, user_id)).await?;
    Ok(Json(json!({"status": "ok", "message": "User deleted."})))
}

async fn set_password(State(state): State<AppState>, headers: HeaderMap, Json(payload): Json<PasswordPayload>) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let token = bearer(&headers)?;
    let caller = state.accounts.sessions.require_fresh_token(&token)?;
    if payload.password.is_empty() {
        return Err(AppError::user("invalid_input", "password must not be empty"));
    }
    let accounts = state.accounts.clone();
    blocking(move || accounts.set_password(&caller, &payload.username, &payload.password)).await?;
    Ok((StatusCode::CREATED, Json(json!({"status": "ok", "message": "User password updated successfully."}))))
}
