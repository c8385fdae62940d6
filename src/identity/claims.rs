use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::principal::IdentityId;

/// Authorization attributes baked into an access token at issuance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimSet {
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_paid_user: bool,
}

/// Maps an identity to its claims. Consulted once per fresh login.
pub trait ClaimsResolver: Send + Sync {
    fn resolve(&self, identity: IdentityId) -> ClaimSet;
}

/// Allow-list policy: explicit sets of admin and paid identity ids.
#[derive(Debug, Clone, Default)]
pub struct AllowListClaims {
    admins: HashSet<IdentityId>,
    paid: HashSet<IdentityId>,
}

impl AllowListClaims {
    pub fn new(admins: impl IntoIterator<Item = IdentityId>, paid: impl IntoIterator<Item = IdentityId>) -> Self {
        Self { admins: admins.into_iter().collect(), paid: paid.into_iter().collect() }
    }
}

impl ClaimsResolver for AllowListClaims {
    fn resolve(&self, identity: IdentityId) -> ClaimSet {
        ClaimSet { is_admin: self.admins.contains(&identity), is_paid_user: self.paid.contains(&identity) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_resolves_each_flag_independently() {
        let c = AllowListClaims::new([2], [2, 5]);
        assert_eq!(c.resolve(2), ClaimSet { is_admin: true, is_paid_user: true });
        assert_eq!(c.resolve(5), ClaimSet { is_admin: false, is_paid_user: true });
        assert_eq!(c.resolve(9), ClaimSet::default());
    }
}
