use serde::{Deserialize, Serialize};

pub type IdentityId = i64;

/// Account record owned by the user directory. The lifecycle only reads `id` and `email`;
/// `password_hash` is `None` for accounts created through external login.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: IdentityId,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Identity fields supplied on insert; the store assigns the id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewIdentity {
    pub username: String,
    pub password_hash: Option<String>,
    pub email: Option<String>,
}
