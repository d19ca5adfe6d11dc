//! Status condition types and helpers
//!
//! Conditions summarize a reconcile pass on the resource's status. Two types
//! matter to the core: the `Synced` condition, of which exactly one exists
//! after every pass, and the `Terminal` condition, present only when the
//! resource can never converge without user intervention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resource::Resource;

/// Condition type summarizing whether live state matches desired state
pub const TYPE_SYNCED: &str = "ACK.ResourceSynced";

/// Condition type marking a stable failure that requires user intervention
pub const TYPE_TERMINAL: &str = "ACK.Terminal";

/// Condition type carrying transient, recoverable failure detail
pub const TYPE_RECOVERABLE: &str = "ACK.Recoverable";

/// Message on a Synced condition with status True
pub const SYNCED_MESSAGE: &str = "Synced";

/// Message on a Synced condition with status False
pub const NOT_SYNCED_MESSAGE: &str = "NotSynced";

/// Message on a Synced condition with status Unknown
pub const UNKNOWN_SYNCED_MESSAGE: &str = "Unknown";

/// Message on the Terminal condition set for an unmanaged resource
pub const NOT_MANAGED_MESSAGE: &str =
    "This resource is not managed by the controller";

/// Reason on the Terminal condition set for an unmanaged resource
pub const NOT_MANAGED_REASON: &str = "NotManaged";

/// Status of a condition (True, False, Unknown)
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ConditionStatus {
    /// The condition holds
    True,
    /// The condition does not hold
    False,
    /// The condition could not be evaluated
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A single entry of the resource's status condition list
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g. ACK.ResourceSynced)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        message: Option<String>,
        reason: Option<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason,
            message,
            last_transition_time: Some(Utc::now()),
        }
    }
}

/// Returns the first condition of the given type, if present
pub fn of_type(res: &Resource, type_: &str) -> Option<Condition> {
    res.conditions().into_iter().find(|c| c.type_ == type_)
}

/// Returns the Synced condition, if present
pub fn synced(res: &Resource) -> Option<Condition> {
    of_type(res, TYPE_SYNCED)
}

/// Returns the Terminal condition, if present
pub fn terminal(res: &Resource) -> Option<Condition> {
    of_type(res, TYPE_TERMINAL)
}

/// Remove all conditions from the resource
pub fn clear(res: &mut Resource) {
    res.clear_conditions();
}

/// Write a condition, replacing any existing condition of the same type
pub fn set(res: &mut Resource, condition: Condition) {
    let mut conditions = res.conditions();
    conditions.retain(|c| c.type_ != condition.type_);
    conditions.push(condition);
    res.set_conditions(&conditions);
}

/// Write the Synced condition, replacing any existing one
pub fn set_synced(
    res: &mut Resource,
    status: ConditionStatus,
    message: Option<String>,
    reason: Option<String>,
) {
    set(res, Condition::new(TYPE_SYNCED, status, message, reason));
}

/// Write the Terminal condition, replacing any existing one
pub fn set_terminal(
    res: &mut Resource,
    status: ConditionStatus,
    message: Option<String>,
    reason: Option<String>,
) {
    set(res, Condition::new(TYPE_TERMINAL, status, message, reason));
}

/// Write the Recoverable condition, replacing any existing one.
///
/// Resource managers use this to record transient failure detail that will
/// clear on its own (throttling, propagation delays).
pub fn set_recoverable(
    res: &mut Resource,
    status: ConditionStatus,
    message: Option<String>,
    reason: Option<String>,
) {
    set(res, Condition::new(TYPE_RECOVERABLE, status, message, reason));
}
