// src/models/task.rs

//! Durable ingestion task and its lifecycle.
//!
//! ```text
//! claimed -> downloading -> downloaded -> parsing -> ingested
//!                 |   \                      |
//!                 |    -> skipped            -> failed
//!                 -> failed
//! ```
//!
//! `ingested` and `skipped` are terminal. `failed` is terminal until an
//! administrative reset returns the task to `claimed`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a task in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub external_id: String,
    pub source_tag: String,
}

impl TaskKey {
    pub fn new(external_id: impl Into<String>, source_tag: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            source_tag: source_tag.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source_tag, self.external_id)
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Claimed,
    Downloading,
    Downloaded,
    Parsing,
    Ingested,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 7] = [
        Self::Claimed,
        Self::Downloading,
        Self::Downloaded,
        Self::Parsing,
        Self::Ingested,
        Self::Failed,
        Self::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claimed => "claimed",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Parsing => "parsing",
            Self::Ingested => "ingested",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// The only status a forward `advance` into `self` may start from.
    ///
    /// `None` for statuses that are not reached through `advance`.
    fn forward_predecessor(&self) -> Option<TaskStatus> {
        match self {
            Self::Downloading => Some(Self::Claimed),
            Self::Downloaded => Some(Self::Downloading),
            Self::Parsing => Some(Self::Downloaded),
            Self::Ingested => Some(Self::Parsing),
            Self::Claimed | Self::Failed | Self::Skipped => None,
        }
    }

    /// Whether the ingestion path may move a task from `self` to `next`.
    pub fn can_advance_to(&self, next: TaskStatus) -> bool {
        match next {
            Self::Failed => matches!(self, Self::Downloading | Self::Parsing),
            Self::Skipped => *self == Self::Downloading,
            _ => next.forward_predecessor() == Some(*self),
        }
    }

    /// Every status a transition into `next` may start from.
    pub fn predecessors_of(next: TaskStatus) -> Vec<TaskStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_advance_to(next))
            .collect()
    }

    /// Phase recorded when a task stuck in `self` is failed administratively.
    ///
    /// Tasks that never started downloading count as download failures.
    pub fn stalled_step(&self) -> Option<FailedStep> {
        match self {
            Self::Claimed | Self::Downloading => Some(FailedStep::Downloading),
            Self::Downloaded | Self::Parsing => Some(FailedStep::Parsing),
            Self::Ingested | Self::Failed | Self::Skipped => None,
        }
    }

    /// Statuses a task may be stuck in after a crash.
    pub fn in_flight() -> [TaskStatus; 4] {
        [
            Self::Claimed,
            Self::Downloading,
            Self::Downloaded,
            Self::Parsing,
        ]
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claimed" => Ok(Self::Claimed),
            "downloading" => Ok(Self::Downloading),
            "downloaded" => Ok(Self::Downloaded),
            "parsing" => Ok(Self::Parsing),
            "ingested" => Ok(Self::Ingested),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

/// Phase in which a failed task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStep {
    Downloading,
    Parsing,
}

impl FailedStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Parsing => "parsing",
        }
    }

    /// Status the task must be in for a failure at this step.
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Downloading => TaskStatus::Downloading,
            Self::Parsing => TaskStatus::Parsing,
        }
    }
}

impl fmt::Display for FailedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailedStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downloading" => Ok(Self::Downloading),
            "parsing" => Ok(Self::Parsing),
            other => Err(format!("unknown failed step '{other}'")),
        }
    }
}

/// Why a task was skipped instead of processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    TooLarge,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TooLarge => "too_large",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkipReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "too_large" => Ok(Self::TooLarge),
            other => Err(format!("unknown skip reason '{other}'")),
        }
    }
}

/// Result of an attempt to claim a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller now owns the task
    Claimed,
    /// Someone else claimed it first (or it was already processed)
    AlreadyClaimed,
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, Self::Claimed)
    }
}

/// One row of the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionTask {
    pub external_id: String,
    pub source_tag: String,
    pub status: TaskStatus,
    /// Set by an administrative reset until the task is claimed again
    pub requeued: bool,
    pub document_url: Option<String>,
    pub failed_step: Option<FailedStep>,
    pub error_detail: Option<String>,
    pub skip_reason: Option<SkipReason>,
    pub skip_metadata: Option<serde_json::Value>,
    pub note: Option<String>,
    pub notified_at: Option<DateTime<Utc>>,
    pub claimed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IngestionTask {
    pub fn key(&self) -> TaskKey {
        TaskKey::new(&self.external_id, &self.source_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path_is_linear() {
        use TaskStatus::*;
        assert!(Claimed.can_advance_to(Downloading));
        assert!(Downloading.can_advance_to(Downloaded));
        assert!(Downloaded.can_advance_to(Parsing));
        assert!(Parsing.can_advance_to(Ingested));

        assert!(!Claimed.can_advance_to(Downloaded));
        assert!(!Ingested.can_advance_to(Parsing));
        assert!(!Downloaded.can_advance_to(Downloading));
    }

    #[test]
    fn test_failure_and_skip_branches() {
        use TaskStatus::*;
        assert!(Downloading.can_advance_to(Failed));
        assert!(Parsing.can_advance_to(Failed));
        assert!(!Downloaded.can_advance_to(Failed));
        assert!(!Claimed.can_advance_to(Failed));

        assert!(Downloading.can_advance_to(Skipped));
        assert!(!Parsing.can_advance_to(Skipped));
    }

    #[test]
    fn test_terminal_states_go_nowhere() {
        use TaskStatus::*;
        for terminal in [Ingested, Skipped, Failed] {
            for next in TaskStatus::ALL {
                assert!(!terminal.can_advance_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_predecessors_follow_transition_table() {
        use TaskStatus::*;
        assert_eq!(TaskStatus::predecessors_of(Downloaded), vec![Downloading]);
        assert_eq!(TaskStatus::predecessors_of(Skipped), vec![Downloading]);
        assert_eq!(
            TaskStatus::predecessors_of(Failed),
            vec![Downloading, Parsing]
        );
        assert!(TaskStatus::predecessors_of(Claimed).is_empty());
    }

    #[test]
    fn test_only_in_flight_statuses_can_stall() {
        for status in TaskStatus::ALL {
            let in_flight = TaskStatus::in_flight().contains(&status);
            assert_eq!(status.stalled_step().is_some(), in_flight, "{status}");
        }
        assert_eq!(
            TaskStatus::Downloaded.stalled_step(),
            Some(FailedStep::Parsing)
        );
    }

    #[test]
    fn test_status_roundtrip_through_str() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("pending".parse::<TaskStatus>().is_err());
    }
}
