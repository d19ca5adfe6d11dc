//! Cluster read/write surface
//!
//! The reconciler touches the cluster through two narrow traits: an uncached
//! reader for fetches (the informer cache can serve stale objects, and a
//! reconcile pass must start from the server's truth) and a writer for merge
//! patches. Both are trait objects so tests can substitute an in-memory
//! cluster.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{DynamicObject, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::{Api, Client};
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Uncached reads against the cluster store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ApiReader: Send + Sync {
    /// Fetch a namespaced object of the given kind directly from the API
    /// server
    async fn get_resource(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject>;

    /// Fetch a Secret directly from the API server
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;
}

/// Merge-patch writes against the cluster store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Apply a merge patch to the main resource, returning the server's
    /// resulting object
    async fn patch_resource(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject>;

    /// Apply a merge patch to the status subresource, returning the server's
    /// resulting object
    async fn patch_status(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject>;
}

/// Production [`ApiReader`] going straight to the API server
pub struct RealApiReader {
    client: Client,
}

impl RealApiReader {
    /// Create a reader over the given kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ApiReader for RealApiReader {
    async fn get_resource(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, resource);
        Ok(api.get(name).await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }
}

/// Production [`ClusterClient`] over the kube client
pub struct RealClusterClient {
    client: Client,
}

impl RealClusterClient {
    /// Create a writer over the given kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterClient for RealClusterClient {
    async fn patch_resource(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, resource);
        Ok(api
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn patch_status(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, resource);
        Ok(api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }
}

/// Remove `metadata.managedFields` from a patch document before logging it.
/// The server-side-apply bookkeeping is verbose and carries no signal for
/// merge-patch clients.
pub fn strip_managed_fields(document: &mut Value) {
    if let Some(metadata) = document
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
    {
        metadata.remove("managedFields");
    }
}

/// RFC 7386 JSON merge patch computation and application
pub mod merge_patch {
    use serde_json::{Map, Value};

    /// Compute the merge patch that turns `base` into `target`.
    ///
    /// Keys present in `base` but absent from `target` become explicit
    /// nulls; arrays and scalars are replaced wholesale.
    pub fn diff(base: &Value, target: &Value) -> Value {
        match (base, target) {
            (Value::Object(base), Value::Object(target)) => {
                let mut patch = Map::new();
                for (key, target_value) in target {
                    match base.get(key) {
                        Some(base_value) if base_value == target_value => {}
                        Some(base_value) => {
                            patch.insert(key.clone(), diff(base_value, target_value));
                        }
                        None => {
                            patch.insert(key.clone(), target_value.clone());
                        }
                    }
                }
                for key in base.keys() {
                    if !target.contains_key(key) {
                        patch.insert(key.clone(), Value::Null);
                    }
                }
                Value::Object(patch)
            }
            _ => target.clone(),
        }
    }

    /// Apply a merge patch to a document in place
    pub fn apply(document: &mut Value, patch: &Value) {
        match patch {
            Value::Object(patch) => {
                if !document.is_object() {
                    *document = Value::Object(Map::new());
                }
                let target = match document {
                    Value::Object(map) => map,
                    _ => unreachable!("document normalized above"),
                };
                for (key, patch_value) in patch {
                    if patch_value.is_null() {
                        target.remove(key);
                    } else {
                        apply(
                            target.entry(key.clone()).or_insert(Value::Null),
                            patch_value,
                        );
                    }
                }
            }
            _ => *document = patch.clone(),
        }
    }
}
