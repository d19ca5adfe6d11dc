//! Capability traits implemented per resource kind
//!
//! The core is kind-agnostic: everything it knows about a concrete kind
//! arrives through these traits. A service controller supplies a
//! [`ResourceDescriptor`] (shape knowledge), a [`ResourceManagerFactory`]
//! producing [`ResourceManager`]s (cloud API adapters) and a
//! [`ServiceController`] (session construction and service identity).
//!
//! All traits allow mocking in tests while using real implementations in
//! production.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use crate::client::ApiReader;
use crate::config::Config;
use crate::resource::{Resource, SecretKeyReference, FINALIZER};
use crate::Result;

/// API group and kind reconciled by a controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupKind {
    /// API group, empty for the core group
    pub group: String,

    /// Kind name in PascalCase
    pub kind: String,
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// Identity of the cloud service a controller manages
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceMetadata {
    /// Short service alias (e.g. `s3`), used to scope namespace-level
    /// deletion policies
    pub service_alias: String,
}

/// Per-reconcile connection parameters, derived from the CR, the namespace
/// cache and the operator configuration. Never persisted.
#[derive(Clone, Debug)]
pub struct SessionContext {
    /// Cloud account owning the resource
    pub account_id: String,

    /// Region the resource lives in (or should be created in)
    pub region: String,

    /// Service endpoint URL override; empty for the service default
    pub endpoint_url: String,

    /// Role to assume for cross-account management; empty for none
    pub role_arn: String,

    /// Group/version/kind of the resource being reconciled
    pub gvk: GroupVersionKind,
}

/// Authenticated session produced by the service controller and consumed by
/// resource managers. Opaque to the core.
#[derive(Clone, Debug)]
pub struct Session {
    /// The context the session was built for
    pub context: SessionContext,
}

/// A single difference between two resource instances
#[derive(Clone, Debug)]
pub struct Difference {
    /// Dotted path of the differing field (e.g. `Spec.size`)
    pub path: String,

    /// Value on the desired instance
    pub desired: Value,

    /// Value on the latest observed instance
    pub latest: Value,
}

/// Structural diff between two resource instances, queryable by path
#[derive(Clone, Debug, Default)]
pub struct Delta {
    /// All recorded differences
    pub differences: Vec<Difference>,
}

impl Delta {
    /// Create an empty delta
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a difference at the given path
    pub fn add(&mut self, path: impl Into<String>, desired: Value, latest: Value) {
        self.differences.push(Difference {
            path: path.into(),
            desired,
            latest,
        });
    }

    /// True when any recorded difference sits at or below the given path
    pub fn different_at(&self, path: &str) -> bool {
        self.differences
            .iter()
            .any(|d| d.path == path || d.path.starts_with(&format!("{path}.")))
    }

    /// True when the two instances are identical
    pub fn is_empty(&self) -> bool {
        self.differences.is_empty()
    }
}

/// Shape knowledge about one resource kind
///
/// Descriptors are stateless and shared across concurrent reconciles.
#[cfg_attr(test, automock)]
pub trait ResourceDescriptor: Send + Sync {
    /// API group and kind handled by this descriptor
    fn group_kind(&self) -> GroupKind;

    /// API coordinates for building dynamic clients and watches
    fn api_resource(&self) -> ApiResource;

    /// A fresh, empty object of this kind
    fn empty_runtime_object(&self) -> DynamicObject;

    /// Wrap a cluster object into the kind-agnostic resource type
    fn resource_from_object(&self, object: DynamicObject) -> Resource;

    /// Structural diff of two instances; `different_at("Spec")` decides
    /// whether an update call is needed
    fn delta(&self, desired: &Resource, latest: &Resource) -> Delta;

    /// True when the resource carries the controller's finalizer
    fn is_managed(&self, res: &Resource) -> bool {
        res.meta()
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|name| name == FINALIZER))
    }

    /// Add the controller's finalizer to the resource
    fn mark_managed(&self, res: &mut Resource) {
        let finalizers = res.meta_mut().finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|name| name == FINALIZER) {
            finalizers.push(FINALIZER.to_string());
        }
    }

    /// Remove the controller's finalizer from the resource
    fn mark_unmanaged(&self, res: &mut Resource) {
        if let Some(finalizers) = res.meta_mut().finalizers.as_mut() {
            finalizers.retain(|name| name != FINALIZER);
        }
    }
}

/// Cloud API adapter for one resource kind
///
/// Read operations return [`crate::Error::NotFound`] when the backing cloud
/// resource does not exist. Operations that complete asynchronously on the
/// cloud side return the requeue-after sentinel, carrying the in-flight
/// state where one exists.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Dereference cross-resource pointers in the spec, returning a resolved
    /// copy. The resolved copy is never written back to the cluster.
    async fn resolve_references(
        &self,
        reader: &dyn ApiReader,
        desired: &Resource,
    ) -> Result<Resource>;

    /// Inject controller-identifying tags into the desired spec
    async fn ensure_tags(
        &self,
        desired: &mut Resource,
        metadata: &ServiceMetadata,
    ) -> Result<()>;

    /// Probe the cloud for the current state of the resource
    async fn read_one(&self, desired: &Resource) -> Result<Resource>;

    /// Create the backing cloud resource
    async fn create(&self, desired: &Resource) -> Result<Resource>;

    /// Mutate the backing cloud resource to match the desired state
    async fn update(
        &self,
        desired: &Resource,
        latest: &Resource,
        delta: &Delta,
    ) -> Result<Resource>;

    /// Delete the backing cloud resource. Returns the last observed state
    /// when the delete mutated the resource on the way out.
    async fn delete(&self, observed: &Resource) -> Result<Option<Resource>>;

    /// Populate spec fields the cloud filled with server-side defaults
    async fn late_initialize(&self, latest: &Resource) -> Result<Resource>;

    /// True when the latest observed state matches the desired state
    async fn is_synced(&self, latest: &Resource) -> Result<bool>;
}

/// Factory constructing resource managers per reconcile call
///
/// Shared across concurrent reconciles; `manager_for` must be safe to call
/// concurrently.
#[cfg_attr(test, automock)]
pub trait ResourceManagerFactory: Send + Sync {
    /// Descriptor for the kind this factory serves
    fn resource_descriptor(&self) -> Arc<dyn ResourceDescriptor>;

    /// Build a manager bound to the given session
    fn manager_for(
        &self,
        config: &Config,
        secrets: Arc<dyn SecretResolver>,
        session: Session,
    ) -> Result<Arc<dyn ResourceManager>>;

    /// Controller-author override for the resync period, in seconds;
    /// 0 when unset
    fn requeue_on_success_seconds(&self) -> u64;
}

/// Session construction and service identity
#[cfg_attr(test, automock)]
pub trait ServiceController: Send + Sync {
    /// Build an authenticated session for the given context
    fn new_session(&self, context: &SessionContext) -> Result<Session>;

    /// Identity of the cloud service this controller manages
    fn metadata(&self) -> ServiceMetadata;
}

/// Resolves secret references on behalf of resource managers
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Resolve a secret key reference to its value
    async fn secret_value_from_reference(
        &self,
        reference: &SecretKeyReference,
    ) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::named_resource;
    use serde_json::json;

    struct BareDescriptor;

    impl ResourceDescriptor for BareDescriptor {
        fn group_kind(&self) -> GroupKind {
            GroupKind {
                group: "s3.services.k8s.aws".to_string(),
                kind: "Bucket".to_string(),
            }
        }

        fn api_resource(&self) -> ApiResource {
            ApiResource {
                group: "s3.services.k8s.aws".to_string(),
                version: "v1alpha1".to_string(),
                api_version: "s3.services.k8s.aws/v1alpha1".to_string(),
                kind: "Bucket".to_string(),
                plural: "buckets".to_string(),
            }
        }

        fn empty_runtime_object(&self) -> DynamicObject {
            DynamicObject::new("", &self.api_resource())
        }

        fn resource_from_object(&self, object: DynamicObject) -> Resource {
            Resource::from_object(object)
        }

        fn delta(&self, _desired: &Resource, _latest: &Resource) -> Delta {
            Delta::new()
        }
    }

    mod delta {
        use super::*;

        #[test]
        fn test_empty_delta_differs_nowhere() {
            let delta = Delta::new();
            assert!(delta.is_empty());
            assert!(!delta.different_at("Spec"));
        }

        /// Story: an update fires only for spec-level drift
        ///
        /// The reconciler asks `different_at("Spec")`; a difference recorded
        /// at `Spec.size` must answer that question, while a difference at
        /// `Metadata.labels` must not.
        #[test]
        fn story_different_at_matches_path_prefixes() {
            let mut delta = Delta::new();
            delta.add("Spec.size", json!(10), json!(5));

            assert!(delta.different_at("Spec"));
            assert!(delta.different_at("Spec.size"));
            assert!(!delta.different_at("Spec.sizeLimit"));
            assert!(!delta.different_at("Metadata"));

            let mut meta_only = Delta::new();
            meta_only.add("Metadata.labels", json!({}), json!({"a": "b"}));
            assert!(!meta_only.different_at("Spec"));
        }
    }

    mod finalizer_marking {
        use super::*;

        /// Story: managed means finalizer, nothing else
        #[test]
        fn story_mark_managed_adds_the_finalizer_once() {
            let rd = BareDescriptor;
            let mut res = named_resource("orders", "prod");
            assert!(!rd.is_managed(&res));

            rd.mark_managed(&mut res);
            assert!(rd.is_managed(&res));

            // marking twice must not duplicate the entry
            rd.mark_managed(&mut res);
            assert_eq!(res.meta().finalizers.as_ref().unwrap().len(), 1);
        }

        #[test]
        fn story_mark_unmanaged_keeps_foreign_finalizers() {
            let rd = BareDescriptor;
            let mut res = named_resource("orders", "prod");
            res.meta_mut().finalizers = Some(vec![
                "other.example.com/finalizer".to_string(),
                FINALIZER.to_string(),
            ]);

            rd.mark_unmanaged(&mut res);
            assert!(!rd.is_managed(&res));
            assert_eq!(
                res.meta().finalizers.as_deref(),
                Some(&["other.example.com/finalizer".to_string()][..])
            );
        }
    }

    #[test]
    fn test_group_kind_display() {
        let gk = GroupKind {
            group: "s3.services.k8s.aws".to_string(),
            kind: "Bucket".to_string(),
        };
        assert_eq!(gk.to_string(), "Bucket.s3.services.k8s.aws");

        let core = GroupKind {
            group: String::new(),
            kind: "ConfigMap".to_string(),
        };
        assert_eq!(core.to_string(), "ConfigMap");
    }
}
