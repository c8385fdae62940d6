//! Identity trust lifecycle: email confirmation tokens composed with session tokens.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod confirmation;
mod session;
mod revocation;
mod claims;
mod token;
mod provider;
mod request_context;

pub use principal::{Identity, IdentityId, NewIdentity};
pub use confirmation::{ConfirmationManager, ConfirmationState, ConfirmationToken, OwnerLocks, CONFIRMATION_TTL_SECS};
pub use session::{SessionCredential, SessionManager, SessionToken, SessionTtl, ACCESS_TTL_SECS, REFRESH_TTL_SECS};
pub use revocation::{MemoryRevocationRegistry, RevocationRegistry, SharedRevocations};
pub use claims::{AllowListClaims, ClaimSet, ClaimsResolver};
pub use token::{TokenCodec, TokenKind, TokenPayload};
pub use provider::{AccountService, AuthProvider, ConfirmationStatus, LoginRequest, RegisterRequest};
pub use request_context::RequestContext;
