//! Turbo action record and its lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::action::ActionItemType;
use crate::error::ExecutorError;

/// Scaling direction derived from the incoming action type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurboActionType {
    /// Scale out
    Provision,
    /// Scale in
    Unbind,
}

impl TurboActionType {
    /// Map an upstream action type to a scaling direction.
    ///
    /// Unbind requests arrive as `MOVE` from the analysis engine.
    pub fn from_item(action_type: ActionItemType) -> Result<Self, ExecutorError> {
        match action_type {
            ActionItemType::Provision => Ok(Self::Provision),
            ActionItemType::Move => Ok(Self::Unbind),
            other => Err(ExecutorError::UnsupportedActionType { action_type: other }),
        }
    }
}

/// Lifecycle status of a turbo action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurboActionStatus {
    Pending,
    Executing,
    Executed,
    Failed,
}

impl TurboActionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Failed)
    }

    /// `Pending -> Executing -> {Executed, Failed}`; an action may also fail while pending.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Executing | Self::Failed)
                | (Self::Executing, Self::Executed | Self::Failed)
        )
    }
}

impl fmt::Display for TurboActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Controller kinds whose replica count can be changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ControllerKind {
    ReplicationController,
    ReplicaSet,
}

impl ControllerKind {
    #[must_use]
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "ReplicationController" => Some(Self::ReplicationController),
            "ReplicaSet" => Some(Self::ReplicaSet),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReplicationController => "ReplicationController",
            Self::ReplicaSet => "ReplicaSet",
        }
    }
}

/// The concrete pod an action was resolved to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetObject {
    pub uid: String,
    pub namespace: String,
    pub name: String,
    pub kind: String,
}

impl TargetObject {
    #[must_use]
    pub fn from_pod(pod: &Pod) -> Self {
        Self {
            uid: pod.uid().unwrap_or_default(),
            namespace: pod.namespace().unwrap_or_default(),
            name: pod.name_any(),
            kind: "Pod".to_string(),
        }
    }
}

/// The controller owning the target pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentObjectRef {
    pub uid: String,
    pub namespace: String,
    pub name: String,
    pub kind: ControllerKind,
}

/// Replica change applied by a scaling action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleSpec {
    pub original_replicas: i32,
    pub new_replicas: i32,
}

impl ScaleSpec {
    /// Compute the replica change for `action_type`, moving by `delta` replicas.
    ///
    /// Rejects any result below zero (or outside `i32`) before anything is mutated.
    pub fn plan(
        original_replicas: i32,
        action_type: TurboActionType,
        delta: i32,
        parent: &ParentObjectRef,
    ) -> Result<Self, ExecutorError> {
        let signed = match action_type {
            TurboActionType::Provision => i64::from(delta),
            TurboActionType::Unbind => -i64::from(delta),
        };
        let new_replicas = i64::from(original_replicas) + signed;

        match i32::try_from(new_replicas) {
            Ok(new_replicas) if new_replicas >= 0 => Ok(Self {
                original_replicas,
                new_replicas,
            }),
            _ => Err(ExecutorError::InvalidReplicas {
                namespace: parent.namespace.clone(),
                name: parent.name.clone(),
                new_replicas,
            }),
        }
    }
}

/// Action-specific payload of a turbo action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionSpec {
    Scale(ScaleSpec),
}

impl ActionSpec {
    #[must_use]
    pub fn scale(&self) -> &ScaleSpec {
        match self {
            Self::Scale(spec) => spec,
        }
    }
}

/// Content of a turbo action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurboActionContent {
    pub action_type: TurboActionType,
    pub target_object: TargetObject,
    pub parent_object_ref: ParentObjectRef,
    pub action_spec: ActionSpec,
}

/// Record of one action execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurboAction {
    pub uid: String,
    pub namespace: String,
    pub content: TurboActionContent,
    pub status: TurboActionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl TurboAction {
    /// Create a pending action in the namespace of its owning controller
    #[must_use]
    pub fn new(uid: impl Into<String>, content: TurboActionContent) -> Self {
        let now = Utc::now();
        Self {
            uid: uid.into(),
            namespace: content.parent_object_ref.namespace.clone(),
            content,
            status: TurboActionStatus::Pending,
            created_at: now,
            updated_at: now,
            failure_reason: None,
        }
    }

    pub fn transition(&mut self, next: TurboActionStatus) -> Result<(), ExecutorError> {
        if !self.status.can_transition_to(next) {
            return Err(ExecutorError::InvalidTransition {
                uid: self.uid.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the action failed. A no-op on an action that already reached a terminal state.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.transition(TurboActionStatus::Failed).is_ok() {
            self.failure_reason = Some(reason.into());
        }
    }

    #[must_use]
    pub fn scale_spec(&self) -> &ScaleSpec {
        self.content.action_spec.scale()
    }
}
