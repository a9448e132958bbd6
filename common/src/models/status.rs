//! Query status vocabulary and reconciliation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle status of a query, as seen by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Accepted by the resource, not started.
    Queued,
    /// Running on the resource.
    Pending,
    /// Result can be fetched.
    Available,
    /// The resource reported a failure.
    Error,
    /// Anything the gateway cannot classify.
    #[serde(other)]
    Unknown,
}

impl Status {
    /// Maps a resource-native status string onto the gateway vocabulary.
    ///
    /// Matching is case-insensitive; any string not listed below maps to
    /// `Unknown`.
    ///
    /// | resource status        | gateway status |
    /// |------------------------|----------------|
    /// | `RUNNING`, `PENDING`   | `Pending`      |
    /// | `QUEUED`               | `Queued`       |
    /// | `AVAILABLE`, `COMPLETE`| `Available`    |
    /// | `ERROR`, `FAILED`      | `Error`        |
    pub fn from_resource_status(native: &str) -> Self {
        match native.trim().to_ascii_uppercase().as_str() {
            "RUNNING" | "PENDING" => Status::Pending,
            "QUEUED" => Status::Queued,
            "AVAILABLE" | "COMPLETE" => Status::Available,
            "ERROR" | "FAILED" => Status::Error,
            _ => Status::Unknown,
        }
    }

    /// Whether no further transition is expected.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Available | Status::Error)
    }

    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Queued => "QUEUED",
            Status::Pending => "PENDING",
            Status::Available => "AVAILABLE",
            Status::Error => "ERROR",
            Status::Unknown => "UNKNOWN",
        }
    }

    /// Parses a stored wire name; unrecognised names become `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value {
            "QUEUED" => Status::Queued,
            "PENDING" => Status::Pending,
            "AVAILABLE" => Status::Available,
            "ERROR" => Status::Error,
            _ => Status::Unknown,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collapses several upstream statuses into one.
///
/// Precedence: `Error` > `Pending`/`Queued` (reported as `Pending`) >
/// `Unknown` > `Available`. An empty input yields `Unknown`.
pub fn reconcile<I>(statuses: I) -> Status
where
    I: IntoIterator<Item = Status>,
{
    let present: HashSet<Status> = statuses.into_iter().collect();

    if present.contains(&Status::Error) {
        Status::Error
    } else if present.contains(&Status::Pending) || present.contains(&Status::Queued) {
        Status::Pending
    } else if present.contains(&Status::Unknown) {
        Status::Unknown
    } else if present.contains(&Status::Available) {
        Status::Available
    } else {
        Status::Unknown
    }
}
