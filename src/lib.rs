//! Stratus - reconciliation runtime for cloud-service Kubernetes controllers
//!
//! Stratus is the reconciliation core shared by controllers that drive
//! externally-managed cloud resources toward the declarative state expressed
//! in namespaced custom resources. A service controller binary supplies the
//! per-kind pieces (a resource descriptor, a resource manager factory and a
//! session builder); stratus supplies the state machine that ties them
//! together: reference resolution, discovery, create/update/delete/adopt/
//! retain decisions, late initialization, condition discipline, status
//! patching and requeue scheduling.
//!
//! # Architecture
//!
//! One [`reconciler::Reconciler`] exists per resource kind. Each reconcile
//! call is a strictly sequential pipeline over a single CR:
//!
//! - fetch the CR through an uncached reader (cache staleness is real)
//! - derive the session context (account, role, region, endpoint)
//! - resolve references and inject controller tags
//! - probe the cloud, then create, update, delete or adopt
//! - late-initialize server-defaulted spec fields
//! - patch metadata+spec and status back to the cluster
//! - translate the outcome into a requeue decision
//!
//! Multiple kinds reconcile concurrently in one process; the core holds no
//! global mutable state.
//!
//! # Modules
//!
//! - [`cache`] - namespace and account lookup tables
//! - [`client`] - cluster read/write surface and merge-patch utilities
//! - [`condition`] - Synced / Terminal condition helpers
//! - [`config`] - operator flag surface
//! - [`error`] - error kinds and requeue sentinels
//! - [`manager`] - capability traits implemented per kind
//! - [`reconciler`] - the reconciliation core
//! - [`resource`] - the kind-agnostic resource wrapper
//! - [`retry`] - bounded exponential backoff

#![cfg_attr(not(test), deny(missing_docs))]

pub mod cache;
pub mod client;
pub mod condition;
pub mod config;
pub mod error;
pub mod manager;
pub mod reconciler;
pub mod resource;
pub mod retry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

use std::time::Duration;

/// Wall-clock budget for re-reading a cloud resource right after creation.
///
/// Some eventually-consistent cloud APIs return a 404 from a read issued
/// immediately after a successful create. Reads are retried with backoff
/// until this much time has elapsed.
pub const READ_ONE_AFTER_CREATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Resync period applied when neither the configuration nor the resource
/// manager factory specifies one.
pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(10 * 60 * 60);

/// Delay before re-reconciling a resource whose Synced condition is False.
pub const DEFAULT_OUT_OF_SYNC_REQUEUE: Duration = Duration::from_secs(30);
