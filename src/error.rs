//! Error types for the stratus runtime
//!
//! A single error enum covers the whole crate. Some variants are sentinels
//! with fixed meaning to the reconciliation loop rather than failures in the
//! usual sense: [`Error::NotFound`] drives the create and delete-cleanup
//! paths, [`Error::Terminal`] marks a stable failure that no amount of
//! retrying will clear, and the requeue variants ask the controller runtime
//! to schedule another reconcile instead of applying error backoff.

use std::time::Duration;

use thiserror::Error;

use crate::resource::Resource;

/// Main error type for stratus operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The cloud resource does not exist. Resource managers return this from
    /// read operations; the reconciler turns it into a create (or, during
    /// deletion, into plain finalizer removal).
    #[error("resource not found")]
    NotFound,

    /// An adopted resource's backing cloud resource could not be found.
    /// Adopted resources must be discovered, never created, so there is
    /// nothing the reconciler can do until the cloud resource appears.
    #[error("adopted resource not found")]
    AdoptedResourceNotFound,

    /// A referenced Kubernetes Secret (or the key within it) does not exist
    #[error("secret not found")]
    SecretNotFound,

    /// A referenced Kubernetes Secret is not of type Opaque
    #[error("secret type not supported")]
    SecretTypeNotSupported,

    /// The resource is in a terminal state: without a change to the desired
    /// state it will never converge, so the reconciler stops requeueing.
    #[error("resource is in terminal condition")]
    Terminal,

    /// The latest observed state drifted from the desired state; used as the
    /// cause on the short out-of-sync requeue.
    #[error("temporary out of sync, reconcile after requeue")]
    TemporaryOutOfSync,

    /// The cloud resource could not be read back within the post-create
    /// retry budget
    #[error("failed to read resource after {attempts} post-create attempts")]
    ReadOneFailAfterCreate {
        /// Number of read attempts performed before giving up
        attempts: u32,
    },

    /// Sentinel requesting an immediate requeue of the resource
    #[error("requeue needed{}", fmt_cause(.cause))]
    Requeue {
        /// Error that triggered the requeue, if any
        cause: Option<Box<Error>>,
    },

    /// Sentinel requesting a requeue after a delay. Asynchronous cloud
    /// operations (deletes in flight, pending late initialization) carry the
    /// most recent observed state so the reconciler can still patch it.
    #[error("requeue needed after {after:?}{}", fmt_cause(.cause))]
    RequeueAfter {
        /// Delay before the next reconcile attempt
        after: Duration,
        /// In-flight resource state observed before the operation paused
        latest: Option<Box<Resource>>,
        /// Error that triggered the requeue, if any
        cause: Option<Box<Error>>,
    },

    /// Session construction error
    #[error("session error: {0}")]
    Session(String),

    /// Invalid operator configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource manager error that fits no other category
    #[error("resource manager error: {0}")]
    ResourceManager(String),
}

fn fmt_cause(cause: &Option<Box<Error>>) -> String {
    match cause {
        Some(cause) => format!(": {cause}"),
        None => String::new(),
    }
}

impl Error {
    /// Create a session error with the given message
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a resource manager error with the given message
    pub fn resource_manager(msg: impl Into<String>) -> Self {
        Self::ResourceManager(msg.into())
    }

    /// Request an immediate requeue
    pub fn requeue() -> Self {
        Self::Requeue { cause: None }
    }

    /// Request an immediate requeue caused by the given error
    pub fn requeue_with_cause(cause: Error) -> Self {
        Self::Requeue {
            cause: Some(Box::new(cause)),
        }
    }

    /// Request a requeue after the given delay
    pub fn requeue_after(after: Duration) -> Self {
        Self::RequeueAfter {
            after,
            latest: None,
            cause: None,
        }
    }

    /// Request a requeue after the given delay, caused by the given error
    pub fn requeue_after_with_cause(after: Duration, cause: Error) -> Self {
        Self::RequeueAfter {
            after,
            latest: None,
            cause: Some(Box::new(cause)),
        }
    }

    /// Attach the in-flight resource state to a requeue-after sentinel.
    ///
    /// No-op for every other variant.
    pub fn with_latest(mut self, resource: Resource) -> Self {
        if let Self::RequeueAfter { latest, .. } = &mut self {
            *latest = Some(Box::new(resource));
        }
        self
    }

    /// Returns the in-flight resource state carried by a requeue-after
    /// sentinel, if any
    pub fn requeue_latest(&self) -> Option<&Resource> {
        match self {
            Self::RequeueAfter { latest, .. } => latest.as_deref(),
            _ => None,
        }
    }

    /// Returns true for the terminal sentinel
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }

    /// Returns true for the cloud-resource NotFound sentinel
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns true when the underlying Kubernetes API call failed with 404,
    /// i.e. the cluster-stored object is gone
    pub fn is_cluster_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Sentinel Classification Stories
    // =========================================================================
    //
    // The reconciliation loop branches on error *categories*, not messages.
    // These tests pin down the classification helpers the loop relies on.

    /// Story: cloud 404 is a control-flow signal, not a failure
    ///
    /// A read returning NotFound sends the reconciler down the create path
    /// (or straight to finalizer removal during deletion).
    #[test]
    fn story_not_found_is_recognized() {
        assert!(Error::NotFound.is_not_found());
        assert!(!Error::Terminal.is_not_found());
        assert!(!Error::AdoptedResourceNotFound.is_not_found());
    }

    /// Story: terminal failures stop the requeue treadmill
    ///
    /// A terminal resource will never converge without a spec change, so the
    /// loop must report done instead of scheduling retries.
    #[test]
    fn story_terminal_is_recognized() {
        assert!(Error::Terminal.is_terminal());
        assert!(!Error::NotFound.is_terminal());
        assert!(!Error::requeue().is_terminal());
    }

    /// Story: cluster 404 differs from cloud 404
    ///
    /// A status patch racing a CR deletion fails with a Kubernetes 404 and
    /// must be swallowed; the cloud NotFound sentinel must not be.
    #[test]
    fn story_cluster_not_found_is_distinct() {
        let cluster_gone = Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "notfound".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        }));
        assert!(cluster_gone.is_cluster_not_found());
        assert!(!cluster_gone.is_not_found());
        assert!(!Error::NotFound.is_cluster_not_found());
    }

    /// Story: async cloud deletions carry their in-flight state
    ///
    /// A resource manager with a deletion pending returns a requeue-after
    /// sentinel holding the last observed resource, so the reconciler can
    /// still patch annotations recorded during the delete call.
    #[test]
    fn story_requeue_after_carries_latest() {
        let res = crate::resource::tests::named_resource("orders-db", "prod");
        let err = Error::requeue_after(Duration::from_secs(15)).with_latest(res);

        let carried = err.requeue_latest().expect("latest should be carried");
        assert_eq!(carried.name(), "orders-db");

        match err {
            Error::RequeueAfter { after, .. } => {
                assert_eq!(after, Duration::from_secs(15));
            }
            _ => panic!("Expected RequeueAfter variant"),
        }
    }

    /// Story: with_latest does not invent requeues
    #[test]
    fn story_with_latest_is_noop_for_other_variants() {
        let res = crate::resource::tests::named_resource("orders-db", "prod");
        let err = Error::Terminal.with_latest(res);
        assert!(err.requeue_latest().is_none());
        assert!(err.is_terminal());
    }

    /// Story: causes show up in rendered messages
    ///
    /// Condition reasons are built from `Error::to_string()`, so a requeue
    /// caused by drift must mention the drift.
    #[test]
    fn story_cause_is_rendered() {
        let err = Error::requeue_after_with_cause(
            Duration::from_secs(30),
            Error::TemporaryOutOfSync,
        );
        let rendered = err.to_string();
        assert!(rendered.contains("requeue needed after"));
        assert!(rendered.contains("out of sync"));

        let bare = Error::requeue_after(Duration::from_secs(30));
        assert!(!bare.to_string().contains(':'));
    }
}
