//! Error taxonomy for action execution.
//!
//! Every variant carries enough identifiers (namespace, name, keys) to diagnose a
//! failure without querying the cluster again. Nothing here is retried by the executor;
//! deciding whether a failure is fatal is left to the caller.

use std::time::Duration;

use thiserror::Error;

use crate::action::{ActionItemType, EntityType, TurboActionStatus};
use crate::cluster::ClusterError;
use crate::placement::PlacementError;

/// Errors produced while resolving, planning, or executing a scaling action
#[derive(Error, Debug)]
pub enum ExecutorError {
    // Validation: detected before any mutation, no partial effects.
    #[error("wrong entity type for scaling: {entity_type} is neither a pod, an application nor a virtual application")]
    InvalidEntityType { entity_type: EntityType },

    #[error("not a scaling action: {action_type}")]
    UnsupportedActionType { action_type: ActionItemType },

    #[error("unexpected current entity for an unbind action: expected Application, found {found}")]
    UnexpectedCurrentEntity { found: String },

    #[error("invalid new replica count {new_replicas} for {namespace}/{name}")]
    InvalidReplicas {
        namespace: String,
        name: String,
        new_replicas: i64,
    },

    #[error("owning controller {namespace}/{name} has no UID to wait on")]
    MissingParentUid { namespace: String, name: String },

    #[error("scaling {kind} {namespace}/{name} is not supported")]
    UnsupportedControllerKind {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("action {uid} is already being executed")]
    DuplicateAction { uid: String },

    #[error("action {uid} cannot move from {from} to {to}")]
    InvalidTransition {
        uid: String,
        from: TurboActionStatus,
        to: TurboActionStatus,
    },

    // Resolution: read-only failures, no partial effects.
    #[error("cannot find pod with UID {uid} in the cluster")]
    PodNotFound { uid: String },

    #[error("cannot find a provider pod for {target}")]
    NoProviderPod { target: String },

    #[error("pod {namespace}/{pod} is not owned by a recognized controller")]
    NoOwningController { namespace: String, pod: String },

    #[error("pod {namespace}/{pod} matches more than one controller: {}", candidates.join(", "))]
    AmbiguousOwner {
        namespace: String,
        pod: String,
        candidates: Vec<String>,
    },

    #[error("cluster read failed: {0}")]
    Cluster(#[from] ClusterError),

    // Mutation: the replica update was rejected by the API server.
    #[error("failed to update replicas of {kind} {namespace}/{name}: {source}")]
    Mutation {
        kind: &'static str,
        namespace: String,
        name: String,
        #[source]
        source: ClusterError,
    },

    // Rendezvous: the replica change is already committed when these occur.
    #[error("timed out after {waited:?} waiting for a new pod of controller {key}")]
    RendezvousTimeout { key: String, waited: Duration },

    #[error("pod broker closed while waiting for a new pod of controller {key}")]
    BrokerClosed { key: String },

    // Placement: the replica change is already committed when this occurs.
    #[error("failed to place new pod {namespace}/{name}: {source}")]
    Placement {
        namespace: String,
        name: String,
        #[source]
        source: PlacementError,
    },
}

/// Coarse classification of [`ExecutorError`] for callers deciding on retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Resolution,
    Mutation,
    Rendezvous,
    Placement,
}

impl ExecutorError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidEntityType { .. }
            | Self::UnsupportedActionType { .. }
            | Self::UnexpectedCurrentEntity { .. }
            | Self::InvalidReplicas { .. }
            | Self::MissingParentUid { .. }
            | Self::UnsupportedControllerKind { .. }
            | Self::DuplicateAction { .. }
            | Self::InvalidTransition { .. } => ErrorClass::Validation,
            Self::PodNotFound { .. }
            | Self::NoProviderPod { .. }
            | Self::NoOwningController { .. }
            | Self::AmbiguousOwner { .. }
            | Self::Cluster(_) => ErrorClass::Resolution,
            Self::Mutation { .. } => ErrorClass::Mutation,
            Self::RendezvousTimeout { .. } | Self::BrokerClosed { .. } => ErrorClass::Rendezvous,
            Self::Placement { .. } => ErrorClass::Placement,
        }
    }

    /// Whether the replica change had already been committed when this error occurred.
    ///
    /// The executor never rolls a committed replica change back. A `true` here means
    /// "the mutation most likely took effect, completion is unconfirmed".
    #[must_use]
    pub fn mutation_committed(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Rendezvous | ErrorClass::Placement
        )
    }
}
