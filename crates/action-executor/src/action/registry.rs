//! Per-UID bookkeeping of executed and in-flight actions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::action::{TurboAction, TurboActionStatus};
use crate::error::ExecutorError;

/// What the registry knows about one action UID
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ActionRecord {
    /// Claimed for execution, no plan built yet
    #[serde(rename_all = "camelCase")]
    Accepted { accepted_at: DateTime<Utc> },
    /// Plan built; the action carries its own status
    Tracked(TurboAction),
    /// Failed before a plan could be built
    #[serde(rename_all = "camelCase")]
    Rejected {
        reason: String,
        rejected_at: DateTime<Utc>,
    },
}

impl ActionRecord {
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        match self {
            Self::Accepted { .. } => true,
            Self::Tracked(action) => !action.status.is_terminal(),
            Self::Rejected { .. } => false,
        }
    }

    #[must_use]
    pub fn executed(&self) -> Option<&TurboAction> {
        match self {
            Self::Tracked(action) if action.status == TurboActionStatus::Executed => Some(action),
            _ => None,
        }
    }
}

/// Outcome of claiming a UID for execution
#[derive(Debug)]
pub enum Claim {
    /// Execute the action
    Fresh,
    /// The action already executed; this is its record
    Executed(TurboAction),
}

/// Registry of actions keyed by action UID.
///
/// Records are never evicted by the executor.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    records: Arc<DashMap<String, ActionRecord>>,
}

impl ActionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `uid` for execution.
    ///
    /// Executed actions are returned as-is, in-flight ones are rejected, failed ones may run again.
    pub fn claim(&self, uid: &str) -> Result<Claim, ExecutorError> {
        match self.records.entry(uid.to_string()) {
            Entry::Occupied(mut entry) => {
                if let Some(action) = entry.get().executed() {
                    return Ok(Claim::Executed(action.clone()));
                }
                if entry.get().is_in_flight() {
                    return Err(ExecutorError::DuplicateAction {
                        uid: uid.to_string(),
                    });
                }
                debug!(action_uid = %uid, "Re-running previously failed action");
                entry.insert(ActionRecord::Accepted {
                    accepted_at: Utc::now(),
                });
                Ok(Claim::Fresh)
            }
            Entry::Vacant(entry) => {
                entry.insert(ActionRecord::Accepted {
                    accepted_at: Utc::now(),
                });
                Ok(Claim::Fresh)
            }
        }
    }

    /// Store the current state of `action`
    pub fn track(&self, action: &TurboAction) {
        self.records
            .insert(action.uid.clone(), ActionRecord::Tracked(action.clone()));
    }

    /// Record a failure that happened before a plan existed
    pub fn reject(&self, uid: &str, reason: impl Into<String>) {
        self.records.insert(
            uid.to_string(),
            ActionRecord::Rejected {
                reason: reason.into(),
                rejected_at: Utc::now(),
            },
        );
    }

    #[must_use]
    pub fn get(&self, uid: &str) -> Option<ActionRecord> {
        self.records.get(uid).map(|record| record.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
