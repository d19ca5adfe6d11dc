//! Kind-agnostic custom resource wrapper
//!
//! The reconciliation core never sees concrete CRD types. Every kind flows
//! through [`Resource`], a thin wrapper over [`DynamicObject`] with typed
//! metadata and opaque JSON `spec`/`status` subtrees. Per-kind knowledge
//! (delta computation, finalizer marking, API coordinates) lives behind the
//! descriptor trait; everything here is shape-only.

use kube::api::DynamicObject;
use kube::core::{GroupVersionKind, ObjectMeta};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::condition::Condition;
use crate::Result;

/// Annotation overriding the region a resource is reconciled against
pub const ANNOTATION_REGION: &str = "services.k8s.aws/region";

/// Annotation overriding the deletion policy for a single resource
pub const ANNOTATION_DELETION_POLICY: &str = "services.k8s.aws/deletion-policy";

/// Annotation marking a resource as observe-only adopted: the backing cloud
/// resource already exists and must be discovered, never created
pub const ANNOTATION_ADOPTED: &str = "services.k8s.aws/adopted";

/// Finalizer marking a resource as managed by the controller
pub const FINALIZER: &str = "services.k8s.aws/finalizer";

/// Identifiers of the backing cloud resource, recorded under
/// `status.ackResourceMetadata` once known
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceIdentifiers {
    /// Cloud account that owns the backing resource
    #[serde(rename = "ownerAccountID")]
    pub owner_account_id: Option<String>,

    /// Region the backing resource lives in
    pub region: Option<String>,

    /// Fully-qualified cloud resource name
    pub arn: Option<String>,
}

/// Reference to a key inside a Kubernetes Secret
///
/// Embedded in resource specs for fields whose values must not appear in the
/// CR itself (passwords, tokens). Resolved through
/// [`crate::manager::SecretResolver`].
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SecretKeyReference {
    /// Namespace of the Secret; the `default` namespace when empty
    pub namespace: Option<String>,

    /// Name of the Secret
    pub name: String,

    /// Key within the Secret's data
    pub key: String,
}

/// A single namespaced custom resource instance, independent of its kind
///
/// Cloning a `Resource` is a deep copy; the wrapper owns its object.
#[derive(Clone, Debug)]
pub struct Resource {
    object: DynamicObject,
}

impl Resource {
    /// Wrap a dynamic object fetched from the cluster
    pub fn from_object(object: DynamicObject) -> Self {
        Self { object }
    }

    /// Borrow the underlying dynamic object
    pub fn object(&self) -> &DynamicObject {
        &self.object
    }

    /// Unwrap into the underlying dynamic object
    pub fn into_object(self) -> DynamicObject {
        self.object
    }

    /// Object metadata
    pub fn meta(&self) -> &ObjectMeta {
        &self.object.metadata
    }

    /// Mutable object metadata
    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.object.metadata
    }

    /// Resource name; empty when unset
    pub fn name(&self) -> &str {
        self.object.metadata.name.as_deref().unwrap_or("")
    }

    /// Resource namespace, falling back to `default`
    pub fn namespace(&self) -> &str {
        self.object.metadata.namespace.as_deref().unwrap_or("default")
    }

    /// Group/version/kind recorded on the object, if any
    pub fn gvk(&self) -> Option<GroupVersionKind> {
        let types = self.object.types.as_ref()?;
        let (group, version) = match types.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", types.api_version.as_str()),
        };
        Some(GroupVersionKind::gvk(group, version, &types.kind))
    }

    /// Look up a metadata annotation
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.object
            .metadata
            .annotations
            .as_ref()?
            .get(key)
            .map(String::as_str)
    }

    /// True once the cluster has stamped a deletion timestamp on the object
    pub fn is_being_deleted(&self) -> bool {
        self.object.metadata.deletion_timestamp.is_some()
    }

    /// True when the resource carries the adoption marker annotation
    pub fn is_adopted(&self) -> bool {
        self.annotation(ANNOTATION_ADOPTED)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Identifiers of the backing cloud resource recorded in status
    pub fn identifiers(&self) -> ResourceIdentifiers {
        self.object
            .data
            .get("status")
            .and_then(|status| status.get("ackResourceMetadata"))
            .cloned()
            .and_then(|meta| serde_json::from_value(meta).ok())
            .unwrap_or_default()
    }

    /// The declarative spec subtree, if present
    pub fn spec_value(&self) -> Option<&Value> {
        self.object.data.get("spec")
    }

    /// A copy of the status subtree, if present
    pub fn status_value(&self) -> Option<Value> {
        self.object.data.get("status").cloned()
    }

    /// Replace (or remove) the status subtree
    pub fn set_status_value(&mut self, status: Option<Value>) {
        let data = self.data_map();
        match status {
            Some(status) => {
                data.insert("status".to_string(), status);
            }
            None => {
                data.remove("status");
            }
        }
    }

    /// Copy the other resource's status subtree onto this one
    pub fn set_status_from(&mut self, other: &Resource) {
        self.set_status_value(other.status_value());
    }

    /// Status conditions currently recorded on the resource
    pub fn conditions(&self) -> Vec<Condition> {
        self.object
            .data
            .get("status")
            .and_then(|status| status.get("conditions"))
            .cloned()
            .and_then(|conditions| serde_json::from_value(conditions).ok())
            .unwrap_or_default()
    }

    /// Replace the full condition list
    pub fn set_conditions(&mut self, conditions: &[Condition]) {
        let value = serde_json::to_value(conditions)
            .unwrap_or_else(|_| Value::Array(Vec::new()));
        self.status_map().insert("conditions".to_string(), value);
    }

    /// Strip all conditions. Conditions describe the observations of a
    /// single reconcile pass, so each pass starts from a clean list.
    pub fn clear_conditions(&mut self) {
        if let Some(status) = self
            .data_map()
            .get_mut("status")
            .and_then(Value::as_object_mut)
        {
            status.remove("conditions");
        }
    }

    /// Serialize the full object for patch computation
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.object)?)
    }

    fn data_map(&mut self) -> &mut Map<String, Value> {
        if !self.object.data.is_object() {
            self.object.data = Value::Object(Map::new());
        }
        match &mut self.object.data {
            Value::Object(map) => map,
            _ => unreachable!("object data normalized above"),
        }
    }

    fn status_map(&mut self) -> &mut Map<String, Value> {
        let data = self.data_map();
        let status = data
            .entry("status".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !status.is_object() {
            *status = Value::Object(Map::new());
        }
        match status {
            Value::Object(map) => map,
            _ => unreachable!("status normalized above"),
        }
    }
}

/// Resource fixtures shared by unit tests across the crate
#[cfg(test)]
pub mod tests {
    use super::*;
    use serde_json::json;

    /// Build a minimal Bucket resource used by tests across the crate
    pub fn named_resource(name: &str, namespace: &str) -> Resource {
        resource_from_json(json!({
            "apiVersion": "s3.services.k8s.aws/v1alpha1",
            "kind": "Bucket",
            "metadata": {
                "name": name,
                "namespace": namespace,
            },
            "spec": {
                "name": name,
            },
        }))
    }

    /// Build a resource from raw JSON
    pub fn resource_from_json(value: serde_json::Value) -> Resource {
        let object: DynamicObject =
            serde_json::from_value(value).expect("valid dynamic object");
        Resource::from_object(object)
    }

    #[test]
    fn test_name_and_namespace_fall_back() {
        let res = named_resource("orders", "prod");
        assert_eq!(res.name(), "orders");
        assert_eq!(res.namespace(), "prod");

        let bare = resource_from_json(json!({
            "apiVersion": "s3.services.k8s.aws/v1alpha1",
            "kind": "Bucket",
            "metadata": {"name": "orders"},
        }));
        assert_eq!(bare.namespace(), "default");
    }

    #[test]
    fn test_gvk_splits_group_and_version() {
        let res = named_resource("orders", "prod");
        let gvk = res.gvk().expect("gvk present");
        assert_eq!(gvk.group, "s3.services.k8s.aws");
        assert_eq!(gvk.version, "v1alpha1");
        assert_eq!(gvk.kind, "Bucket");
    }

    #[test]
    fn test_deletion_timestamp_marks_resource_as_being_deleted() {
        let res = resource_from_json(json!({
            "apiVersion": "s3.services.k8s.aws/v1alpha1",
            "kind": "Bucket",
            "metadata": {
                "name": "orders",
                "namespace": "prod",
                "deletionTimestamp": "2026-03-01T10:00:00Z",
                "finalizers": [FINALIZER],
            },
        }));
        assert!(res.is_being_deleted());
        assert!(!named_resource("orders", "prod").is_being_deleted());
    }

    #[test]
    fn test_adoption_marker_is_case_insensitive() {
        let res = resource_from_json(json!({
            "apiVersion": "s3.services.k8s.aws/v1alpha1",
            "kind": "Bucket",
            "metadata": {
                "name": "orders",
                "namespace": "prod",
                "annotations": {ANNOTATION_ADOPTED: "True"},
            },
        }));
        assert!(res.is_adopted());
        assert!(!named_resource("orders", "prod").is_adopted());
    }

    /// Story: status identifiers decide which account owns the resource
    ///
    /// Once a resource has been created or discovered, the owner account and
    /// region recorded in status take precedence over every configuration
    /// source, so they must round-trip through the wrapper.
    #[test]
    fn story_identifiers_come_from_status_metadata() {
        let res = resource_from_json(json!({
            "apiVersion": "s3.services.k8s.aws/v1alpha1",
            "kind": "Bucket",
            "metadata": {"name": "orders", "namespace": "prod"},
            "status": {
                "ackResourceMetadata": {
                    "ownerAccountID": "111122223333",
                    "region": "eu-west-1",
                    "arn": "arn:aws:s3:::orders",
                },
            },
        }));
        let ids = res.identifiers();
        assert_eq!(ids.owner_account_id.as_deref(), Some("111122223333"));
        assert_eq!(ids.region.as_deref(), Some("eu-west-1"));
        assert_eq!(ids.arn.as_deref(), Some("arn:aws:s3:::orders"));

        // absent status yields empty identifiers, not an error
        assert_eq!(
            named_resource("orders", "prod").identifiers(),
            ResourceIdentifiers::default()
        );
    }

    /// Story: the observed cloud state replaces status wholesale
    ///
    /// After a post-create read, the reconciler copies the observed status
    /// onto the resource it is about to patch.
    #[test]
    fn story_status_is_copied_between_resources() {
        let mut target = named_resource("orders", "prod");
        let observed = resource_from_json(json!({
            "apiVersion": "s3.services.k8s.aws/v1alpha1",
            "kind": "Bucket",
            "metadata": {"name": "orders", "namespace": "prod"},
            "status": {"size": 10},
        }));

        target.set_status_from(&observed);
        assert_eq!(target.status_value(), observed.status_value());

        // copying from a status-less resource removes the subtree
        target.set_status_from(&named_resource("orders", "prod"));
        assert_eq!(target.status_value(), None);
    }

    /// Story: a user manifest becomes a resource as-is
    ///
    /// Resources arrive from the cluster as dynamic objects deserialized
    /// from user-authored manifests; the wrapper must expose exactly what
    /// the manifest declared.
    #[test]
    fn story_yaml_manifest_round_trips() {
        let yaml = r#"
apiVersion: s3.services.k8s.aws/v1alpha1
kind: Bucket
metadata:
  name: orders
  namespace: prod
  annotations:
    services.k8s.aws/region: eu-west-1
spec:
  name: orders
  size: 10
"#;
        let object: DynamicObject = serde_yaml::from_str(yaml).unwrap();
        let res = Resource::from_object(object);

        assert_eq!(res.name(), "orders");
        assert_eq!(res.namespace(), "prod");
        assert_eq!(res.annotation(ANNOTATION_REGION), Some("eu-west-1"));
        assert_eq!(
            res.spec_value().and_then(|spec| spec.get("size")),
            Some(&json!(10))
        );
        assert_eq!(res.status_value(), None);
    }

    #[test]
    fn test_conditions_round_trip_and_clear() {
        use crate::condition::{Condition, ConditionStatus, TYPE_SYNCED};

        let mut res = named_resource("orders", "prod");
        assert!(res.conditions().is_empty());

        res.set_conditions(&[Condition::new(
            TYPE_SYNCED,
            ConditionStatus::True,
            Some("Synced".to_string()),
            None,
        )]);
        let conditions = res.conditions();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].type_, TYPE_SYNCED);
        assert_eq!(conditions[0].status, ConditionStatus::True);

        res.clear_conditions();
        assert!(res.conditions().is_empty());
        // clearing must not invent a conditions key
        assert_eq!(
            res.status_value().and_then(|s| s.get("conditions").cloned()),
            None
        );
    }
}
