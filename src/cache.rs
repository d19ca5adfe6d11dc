//! Namespace and account lookup tables
//!
//! External collaborators (namespace and ConfigMap watchers) populate these
//! caches; the reconciliation core only reads them. Both are cheap to clone
//! and safe to share across concurrently reconciling kinds.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::DeletionPolicy;

/// Per-namespace overrides sourced from namespace annotations
#[derive(Clone, Debug, Default)]
pub struct NamespaceInfo {
    /// Cloud account owning resources created in the namespace
    pub owner_account_id: Option<String>,

    /// Region resources in the namespace default to
    pub default_region: Option<String>,

    /// Service endpoint URL override for the namespace
    pub endpoint_url: Option<String>,

    /// Deletion policies keyed by service alias (a namespace can retain
    /// buckets while deleting queues)
    pub deletion_policies: HashMap<String, DeletionPolicy>,
}

/// Lookup table of per-namespace overrides
#[derive(Clone, Debug, Default)]
pub struct NamespaceCache {
    inner: Arc<RwLock<HashMap<String, NamespaceInfo>>>,
}

impl NamespaceCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the overrides for a namespace
    pub fn upsert(&self, namespace: impl Into<String>, info: NamespaceInfo) {
        self.write().insert(namespace.into(), info);
    }

    /// Drop the overrides for a namespace
    pub fn remove(&self, namespace: &str) {
        self.write().remove(namespace);
    }

    /// Owner account override for the namespace, if any
    pub fn owner_account_id(&self, namespace: &str) -> Option<String> {
        self.read().get(namespace)?.owner_account_id.clone()
    }

    /// Default region override for the namespace, if any
    pub fn default_region(&self, namespace: &str) -> Option<String> {
        self.read().get(namespace)?.default_region.clone()
    }

    /// Endpoint URL override for the namespace, if any
    pub fn endpoint_url(&self, namespace: &str) -> Option<String> {
        self.read().get(namespace)?.endpoint_url.clone()
    }

    /// Deletion policy override for the namespace, scoped by service alias
    pub fn deletion_policy(
        &self,
        namespace: &str,
        service_alias: &str,
    ) -> Option<DeletionPolicy> {
        self.read()
            .get(namespace)?
            .deletion_policies
            .get(service_alias)
            .copied()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, NamespaceInfo>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, NamespaceInfo>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Lookup table mapping cloud account ids to the role to assume for them
#[derive(Clone, Debug, Default)]
pub struct AccountCache {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl AccountCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the role ARN for an account
    pub fn set_role_arn(&self, account_id: impl Into<String>, role_arn: impl Into<String>) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(account_id.into(), role_arn.into());
    }

    /// Drop the role ARN for an account
    pub fn remove(&self, account_id: &str) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(account_id);
    }

    /// Role ARN to assume for the account, if known
    pub fn role_arn(&self, account_id: &str) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(account_id)
            .cloned()
    }
}

/// The cache bundle handed to a reconciler at construction
#[derive(Clone, Debug, Default)]
pub struct Caches {
    /// Per-namespace overrides
    pub namespaces: NamespaceCache,

    /// Account to role-ARN mapping
    pub accounts: AccountCache,
}
