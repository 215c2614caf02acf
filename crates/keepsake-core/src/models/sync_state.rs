//! Per-entity sync state

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Outbox state of a locally-owned entity.
///
/// `Syncing` is a transient marker for an in-flight upload; it is never
/// trusted across a process restart, since no transfer survives a crash.
/// The store resets interrupted `Syncing` rows to `Failed` when it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Created or mutated locally, waiting for upload
    Pending,
    /// Upload in flight
    Syncing,
    /// Remote copy matches the last local mutation
    Synced,
    /// Last upload attempt failed; retried on the next drain
    Failed,
}

impl SyncState {
    /// String tag persisted in the local store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }

    /// Whether a drain pass should pick this entity up.
    #[must_use]
    pub const fn needs_upload(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "syncing" => Ok(Self::Syncing),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("Unknown sync state: {other}"))),
        }
    }
}
