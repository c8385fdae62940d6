//! Runtime configuration read from environment variables.

use anyhow::{anyhow, bail, Context, Result};

use crate::identity::{IdentityId, ACCESS_TTL_SECS, CONFIRMATION_TTL_SECS, REFRESH_TTL_SECS};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub http_port: u16,
    pub jwt_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub confirmation_ttl_secs: i64,
    pub admin_ids: Vec<IdentityId>,
    pub paid_ids: Vec<IdentityId>,
    pub public_url: String,
    pub revocation_sweep_secs: u64,
    pub mailgun_api_key: Option<String>,
    pub mailgun_domain: Option<String>,
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(s) => s.trim().parse::<T>().map_err(|e| anyhow!("{name}={s:?}: {e}")),
    }
}

fn parse_ids(name: &str, raw: Option<String>) -> Result<Vec<IdentityId>> {
    let Some(s) = raw else { return Ok(Vec::new()); };
    s.split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<IdentityId>().with_context(|| format!("{name}: bad identity id {p:?}")))
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("JWT_SECRET_KEY").unwrap_or_default();
        if jwt_secret.trim().is_empty() {
            bail!("JWT_SECRET_KEY must be set");
        }
        let cfg = Config {
            bind: get("STOREFRONT_BIND").unwrap_or_else(|| "0.0.0.0".to_string()),
            http_port: parse_num("STOREFRONT_HTTP_PORT", get("STOREFRONT_HTTP_PORT"), 5000u16)?,
            jwt_secret,
            access_ttl_secs: parse_num("STOREFRONT_ACCESS_TTL_SECS", get("STOREFRONT_ACCESS_TTL_SECS"), ACCESS_TTL_SECS)?,
            refresh_ttl_secs: parse_num("STOREFRONT_REFRESH_TTL_SECS", get("STOREFRONT_REFRESH_TTL_SECS"), REFRESH_TTL_SECS)?,
            confirmation_ttl_secs: parse_num("STOREFRONT_CONFIRMATION_TTL_SECS", get("STOREFRONT_CONFIRMATION_TTL_SECS"), CONFIRMATION_TTL_SECS)?,
            admin_ids: parse_ids("STOREFRONT_ADMIN_IDS", get("STOREFRONT_ADMIN_IDS"))?,
            paid_ids: parse_ids("STOREFRONT_PAID_IDS", get("STOREFRONT_PAID_IDS"))?,
            public_url: get("STOREFRONT_PUBLIC_URL").unwrap_or_else(|| "http://localhost:5000".to_string()),
            revocation_sweep_secs: parse_num("STOREFRONT_REVOCATION_SWEEP_SECS", get("STOREFRONT_REVOCATION_SWEEP_SECS"), 60u64)?,
            mailgun_api_key: get("MAILGUN_API_KEY").filter(|s| !s.is_empty()),
            mailgun_domain: get("MAILGUN_DOMAIN").filter(|s| !s.is_empty()),
        };
        if cfg.access_ttl_secs <= 0 || cfg.refresh_ttl_secs <= 0 || cfg.confirmation_ttl_secs <= 0 {
            bail!("token lifetimes must be positive");
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = Config::from_lookup(lookup(&[("JWT_SECRET_KEY", "s3cret")])).unwrap();
        assert_eq!(cfg.http_port, 5000);
        assert_eq!(cfg.confirmation_ttl_secs, 1800);
        assert_eq!(cfg.access_ttl_secs, ACCESS_TTL_SECS);
        assert!(cfg.admin_ids.is_empty());
        assert!(cfg.mailgun_api_key.is_none());
    }

    #[test]
    fn missing_secret_fails_startup() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("JWT_SECRET_KEY", "  ")])).is_err());
    }

    #[test]
    fn parses_id_lists_and_rejects_garbage() {
        let cfg = Config::from_lookup(lookup(&[("JWT_SECRET_KEY", "k"), ("STOREFRONT_ADMIN_IDS", "2, 7,"), ("STOREFRONT_PAID_IDS", "3")])).unwrap();
        assert_eq!(cfg.admin_ids, vec![2, 7]);
        assert_eq!(cfg.paid_ids, vec![3]);
        assert!(Config::from_lookup(lookup(&[("JWT_SECRET_KEY", "k"), ("STOREFRONT_ADMIN_IDS", "x")])).is_err());
        assert!(Config::from_lookup(lookup(&[("JWT_SECRET_KEY", "k"), ("STOREFRONT_HTTP_PORT", "99999")])).is_err());
        assert!(Config::from_lookup(lookup(&[("JWT_SECRET_KEY", "k"), ("STOREFRONT_ACCESS_TTL_SECS", "0")])).is_err());
    }
}
