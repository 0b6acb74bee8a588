//! Storage scope resolution
//!
//! Every stored record lives under a tenant, and optionally under a user
//! within that tenant. The strategy is fixed at startup: either the whole
//! tenant shares one data area, or each authenticated user gets a private
//! one. Per-user operations without an authenticated user are rejected.

use crate::{Error, Result};
use std::str::FromStr;

/// How record paths are partitioned within a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeStrategy {
    /// All users of the tenant read and write the same collections
    TenantGlobal,
    /// Each user gets a private copy of every collection
    PerUser,
}

impl FromStr for ScopeStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tenant-global" => Ok(ScopeStrategy::TenantGlobal),
            "per-user" => Ok(ScopeStrategy::PerUser),
            other => Err(Error::Config(format!(
                "Unknown scope strategy: {} (expected tenant-global or per-user)",
                other
            ))),
        }
    }
}

/// Resolved scope for a single request
#[derive(Debug, Clone)]
pub struct DocScope {
    pub tenant_id: String,
    pub strategy: ScopeStrategy,
    /// Authenticated user id, if the request carried one
    pub user_id: Option<String>,
}

impl DocScope {
    pub fn new(tenant_id: &str, strategy: ScopeStrategy, user_id: Option<&str>) -> Self {
        DocScope {
            tenant_id: tenant_id.to_string(),
            strategy,
            user_id: user_id.map(|u| u.to_string()),
        }
    }

    /// User id to partition queries by, or None under the tenant-global
    /// strategy. Per-user strategy without an authenticated user is an
    /// error rather than a silent fallback to shared data.
    pub fn user_for_query(&self) -> Result<Option<&str>> {
        match self.strategy {
            ScopeStrategy::TenantGlobal => Ok(None),
            ScopeStrategy::PerUser => match self.user_id.as_deref() {
                Some(user) => Ok(Some(user)),
                None => Err(Error::Unauthenticated),
            },
        }
    }

    /// Logical path of a collection under this scope, used in logs
    pub fn collection_path(&self, collection: &str) -> Result<String> {
        Ok(match self.user_for_query()? {
            Some(user) => format!(
                "artifacts/{}/users/{}/{}",
                self.tenant_id, user, collection
            ),
            None => format!("artifacts/{}/{}", self.tenant_id, collection),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parses_known_values() {
        assert_eq!(
            "tenant-global".parse::<ScopeStrategy>().unwrap(),
            ScopeStrategy::TenantGlobal
        );
        assert_eq!(
            "per-user".parse::<ScopeStrategy>().unwrap(),
            ScopeStrategy::PerUser
        );
    }

    #[test]
    fn test_strategy_rejects_unknown_value() {
        assert!("global".parse::<ScopeStrategy>().is_err());
    }

    #[test]
    fn test_tenant_global_ignores_user() {
        let scope = DocScope::new("app1", ScopeStrategy::TenantGlobal, Some("user1"));
        assert_eq!(scope.user_for_query().unwrap(), None);
        assert_eq!(
            scope.collection_path("operations").unwrap(),
            "artifacts/app1/operations"
        );
    }

    #[test]
    fn test_per_user_requires_user() {
        let scope = DocScope::new("app1", ScopeStrategy::PerUser, None);
        assert!(matches!(
            scope.user_for_query(),
            Err(Error::Unauthenticated)
        ));
    }

    #[test]
    fn test_per_user_path_includes_user() {
        let scope = DocScope::new("app1", ScopeStrategy::PerUser, Some("user1"));
        assert_eq!(scope.user_for_query().unwrap(), Some("user1"));
        assert_eq!(
            scope.collection_path("operations").unwrap(),
            "artifacts/app1/users/user1/operations"
        );
    }
}
