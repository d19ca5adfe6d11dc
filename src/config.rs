//! Operator configuration
//!
//! The flag surface shared by every service controller binary. Host binaries
//! embed [`Config`] with `#[command(flatten)]`; the reconciler reads it as an
//! immutable snapshot. Per-resource and per-namespace overrides (annotations,
//! namespace cache entries) take precedence over everything here.

use std::collections::HashMap;

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// What happens to the backing cloud resource when its CR is deleted
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DeletionPolicy {
    /// Delete the cloud resource along with the CR
    #[default]
    Delete,
    /// Keep the cloud resource, only release the CR
    Retain,
}

impl std::str::FromStr for DeletionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "retain" => Ok(Self::Retain),
            _ => Err(Error::config(format!(
                "invalid deletion policy: {s}, expected one of: delete, retain"
            ))),
        }
    }
}

impl std::fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delete => write!(f, "delete"),
            Self::Retain => write!(f, "retain"),
        }
    }
}

/// Operator flags consumed by the reconciliation core
#[derive(Args, Clone, Debug, Default)]
pub struct Config {
    /// Cloud account resources are managed in unless overridden per
    /// namespace or per resource
    #[arg(long = "aws-account-id", env = "AWS_ACCOUNT_ID", default_value = "")]
    pub account_id: String,

    /// Region resources are managed in unless overridden per namespace or
    /// per resource
    #[arg(long = "aws-region", env = "AWS_REGION", default_value = "")]
    pub region: String,

    /// Custom service endpoint URL; the service default applies when empty
    #[arg(long = "aws-endpoint-url", env = "AWS_ENDPOINT_URL", default_value = "")]
    pub endpoint_url: String,

    /// Default deletion policy for all resources of this controller's kinds
    #[arg(long = "deletion-policy", value_enum, default_value_t = DeletionPolicy::Delete)]
    pub deletion_policy: DeletionPolicy,

    /// Default period, in seconds, between two resyncs of a healthy
    /// resource; 0 defers to the built-in default
    #[arg(long = "reconcile-default-resync-seconds", default_value_t = 0)]
    pub reconcile_default_resync_seconds: u64,

    /// Per-kind resync overrides in `kind=seconds` form, comma separated
    /// (e.g. `bucket=120,table=3600`)
    #[arg(long = "reconcile-resource-resync-seconds", value_delimiter = ',')]
    pub reconcile_resource_resync_seconds: Vec<String>,
}

impl Config {
    /// Parse the per-kind resync overrides into a map keyed by lowercased
    /// kind name
    pub fn parse_resource_resync_seconds(&self) -> Result<HashMap<String, u64>> {
        let mut periods = HashMap::new();
        for entry in &self.reconcile_resource_resync_seconds {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (kind, seconds) = entry.split_once('=').ok_or_else(|| {
                Error::config(format!(
                    "invalid resource resync entry {entry:?}, expected kind=seconds"
                ))
            })?;
            let kind = kind.trim().to_lowercase();
            if kind.is_empty() {
                return Err(Error::config(format!(
                    "invalid resource resync entry {entry:?}, kind is empty"
                )));
            }
            let seconds: u64 = seconds.trim().parse().map_err(|_| {
                Error::config(format!(
                    "invalid resource resync entry {entry:?}, seconds must be a positive integer"
                ))
            })?;
            periods.insert(kind, seconds);
        }
        Ok(periods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod deletion_policy {
        use super::*;

        #[test]
        fn test_from_str_valid() {
            assert_eq!(
                "delete".parse::<DeletionPolicy>().unwrap(),
                DeletionPolicy::Delete
            );
            assert_eq!(
                "retain".parse::<DeletionPolicy>().unwrap(),
                DeletionPolicy::Retain
            );
        }

        #[test]
        fn test_from_str_case_insensitive() {
            assert_eq!(
                "Retain".parse::<DeletionPolicy>().unwrap(),
                DeletionPolicy::Retain
            );
        }

        #[test]
        fn test_from_str_invalid() {
            let err = "drop".parse::<DeletionPolicy>().unwrap_err();
            assert!(err.to_string().contains("invalid deletion policy"));
        }

        #[test]
        fn test_display_round_trips() {
            for policy in [DeletionPolicy::Delete, DeletionPolicy::Retain] {
                assert_eq!(
                    policy.to_string().parse::<DeletionPolicy>().unwrap(),
                    policy
                );
            }
        }
    }

    mod resync_overrides {
        use super::*;

        fn config_with_entries(entries: &[&str]) -> Config {
            Config {
                reconcile_resource_resync_seconds: entries
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                ..Config::default()
            }
        }

        #[test]
        fn test_empty_map_parses() {
            let periods = Config::default().parse_resource_resync_seconds().unwrap();
            assert!(periods.is_empty());
        }

        /// Story: operators pin fast-moving kinds to short resyncs
        ///
        /// `--reconcile-resource-resync-seconds bucket=120,table=3600` must
        /// produce per-kind periods keyed case-insensitively, since kind
        /// names arrive in PascalCase from descriptors.
        #[test]
        fn story_per_kind_overrides_parse_lowercased() {
            let config = config_with_entries(&["Bucket=120", "table=3600"]);
            let periods = config.parse_resource_resync_seconds().unwrap();
            assert_eq!(periods.get("bucket").copied(), Some(120));
            assert_eq!(periods.get("table").copied(), Some(3600));
            assert!(periods.get("Bucket").is_none());
        }

        #[test]
        fn test_malformed_entry_is_rejected() {
            for bad in ["bucket", "=120", "bucket=twelve"] {
                let config = config_with_entries(&[bad]);
                let err = config.parse_resource_resync_seconds().unwrap_err();
                assert!(
                    err.to_string().contains("invalid resource resync entry"),
                    "unexpected message for {bad:?}: {err}"
                );
            }
        }

        #[test]
        fn test_blank_entries_are_skipped() {
            let config = config_with_entries(&["", "bucket=60"]);
            let periods = config.parse_resource_resync_seconds().unwrap();
            assert_eq!(periods.len(), 1);
        }
    }
}
