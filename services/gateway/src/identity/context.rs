use std::collections::BTreeSet;

use super::{IdentitySource, EVERYTHING_PERMISSION};

/// Which proxied APIs a caller's key may invoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permissions {
    Everything,
    Apis(BTreeSet<String>),
}

impl Permissions {
    pub fn from_claim(values: &[String]) -> Self {
        if values.iter().any(|value| value == EVERYTHING_PERMISSION) {
            return Permissions::Everything;
        }
        Permissions::Apis(values.iter().map(|value| value.trim().to_string()).collect())
    }

    pub fn allows(&self, api_id: &str) -> bool {
        match self {
            Permissions::Everything => true,
            Permissions::Apis(apis) => apis.contains(api_id),
        }
    }
}

/// Caller identity established before the pipeline runs.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    pub user_id: String,
    pub permissions: Permissions,
    pub source: IdentitySource,
}

impl AuthenticatedIdentity {
    pub fn new(user_id: impl Into<String>, source: IdentitySource) -> Self {
        Self {
            user_id: user_id.into(),
            permissions: Permissions::Everything,
            source,
        }
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn can_call(&self, api_id: &str) -> bool {
        self.permissions.allows(api_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn everything_sentinel_wins() {
        let permissions =
            Permissions::from_claim(&["nudenet".to_string(), "everything".to_string()]);
        assert_eq!(permissions, Permissions::Everything);
        assert!(permissions.allows("create-video"));
    }

    #[test]
    fn scoped_keys_only_reach_listed_apis() {
        let identity = AuthenticatedIdentity::new("user-1", IdentitySource::Token)
            .with_permissions(Permissions::from_claim(&["nudenet".to_string()]));
        assert!(identity.can_call("nudenet"));
        assert!(!identity.can_call("facelandmarks"));
    }
}
