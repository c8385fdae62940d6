//! Signed, self-contained session tokens (HS256 JWTs).
//!
//! Expiry is checked against the caller's clock rather than the library's wall-clock
//! validation, so `decode` takes `now` explicitly.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::claims::ClaimSet;
use super::principal::IdentityId;
use crate::error::TokenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind { Access, Refresh }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub sub: IdentityId,
    pub jti: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub fresh: bool,
    #[serde(default)]
    pub claims: ClaimSet,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        Self {
            encoding: EncodingKey::from_secret(secret.as_ref()),
            decoding: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }

    pub fn encode(&self, payload: &TokenPayload) -> String {
        // HS256 over a plain struct of ints/strings/bools cannot fail.
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), payload, &self.encoding).unwrap_or_default()
    }

    /// Verify signature, then expiry (`now > exp` is expired).
    pub fn decode(&self, token: &str, now: i64) -> Result<TokenPayload, TokenError> {
        let data = jsonwebtoken::decode::<TokenPayload>(token, &self.decoding, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        })?;
        if now > data.claims.exp { return Err(TokenError::Expired); }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TokenPayload {
        TokenPayload { sub: 4, jti: "j1".into(), kind: TokenKind::Access, fresh: true, claims: ClaimSet { is_admin: true, is_paid_user: false }, iat: 0, exp: 100 }
    }

    #[test]
    fn decodes_what_it_signed() {
        let c = TokenCodec::new("secret");
        let t = c.encode(&payload());
        assert_eq!(t.split('.').count(), 3);
        assert_eq!(c.decode(&t, 100).unwrap(), payload());
    }

    #[test]
    fn rejects_foreign_key_and_tampering() {
        let c = TokenCodec::new("secret");
        let t = c.encode(&payload());
        assert_eq!(TokenCodec::new("other").decode(&t, 0), Err(TokenError::InvalidSignature));

        // body of one token under the signature of another
        let mut forged = payload();
        forged.claims.is_paid_user = true;
        let other = c.encode(&forged);
        let parts: Vec<&str> = t.split('.').collect();
        let other_parts: Vec<&str> = other.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], other_parts[1], parts[2]);
        assert_eq!(c.decode(&tampered, 0), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn expiry_is_checked_after_signature() {
        let c = TokenCodec::new("secret");
        let t = c.encode(&payload());
        assert_eq!(c.decode(&t, 101), Err(TokenError::Expired));
        assert_eq!(TokenCodec::new("other").decode(&t, 101), Err(TokenError::InvalidSignature));
        assert_eq!(c.decode("abc", 0), Err(TokenError::Malformed));
        assert_eq!(c.decode("a.b.c.d", 0), Err(TokenError::Malformed));
    }
}
