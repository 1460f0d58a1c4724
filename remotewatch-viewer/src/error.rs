//! Error taxonomy for the viewer engine

use std::path::PathBuf;
use std::time::Duration;

/// Which backend endpoint a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Inventory,
    Usage,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Inventory => f.write_str("inventory"),
            Endpoint::Usage => f.write_str("usage"),
        }
    }
}

/// Coarse classification used for notifications and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Malformed,
}

/// A failed fetch cycle. Either endpoint failing fails the whole cycle.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{endpoint} endpoint unreachable: {source}")]
    Transport {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} endpoint returned HTTP {status}")]
    Status {
        endpoint: Endpoint,
        status: u16,
    },
    #[error("{endpoint} endpoint did not answer within {}s", .deadline.as_secs_f32())]
    Timeout {
        endpoint: Endpoint,
        deadline: Duration,
    },
    #[error("{endpoint} endpoint sent a malformed body: {source}")]
    Malformed {
        endpoint: Endpoint,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            FetchError::Transport { endpoint, .. }
            | FetchError::Status { endpoint, .. }
            | FetchError::Timeout { endpoint, .. }
            | FetchError::Malformed { endpoint, .. } => *endpoint,
        }
    }

    /// Deadline expiry counts as a network failure
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Malformed { .. } => FailureKind::Malformed,
            _ => FailureKind::Network,
        }
    }
}

/// Why a device has no aligned history. Not an error for callers of `align`,
/// which simply get an empty sequence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlignmentGap {
    #[error("{0} history is missing or empty")]
    MissingSeries(&'static str),
    #[error("history lengths differ (cpu {cpu}, memory {memory}, disk {disk})")]
    LengthMismatch { cpu: usize, memory: usize, disk: usize },
    #[error("history timestamps diverge at index {index}")]
    TimestampDrift { index: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error("poller is stopped")]
    Stopped,
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
