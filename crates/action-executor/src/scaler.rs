//! # Horizontal Scaler
//!
//! Drives one scaling action from an incoming [`ActionItem`] to a terminal
//! [`TurboAction`]:
//!
//! 1. Claim the action UID in the [`ActionRegistry`].
//! 2. Validate the action kind, resolve the target pod and its owning controller, and
//!    plan the replica change. Nothing has been mutated if this step fails.
//! 3. Scale in: write the new replica count and finish.
//! 4. Scale out: subscribe for the controller's next pod, write the new replica count,
//!    wait for the pod (bounded by the rendezvous timeout), hand it to the placer and
//!    finish.
//!
//! A replica change that has been written is never rolled back. Errors raised after the
//! write report [`ExecutorError::mutation_committed`].

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use crate::action::{
    ActionItem, ActionRegistry, ActionSpec, Claim, ParentObjectRef, ScaleSpec, TargetObject,
    TurboAction, TurboActionContent, TurboActionStatus, TurboActionType,
};
use crate::broker::PodBroker;
use crate::cluster::ClusterClient;
use crate::config::ExecutorConfig;
use crate::error::ExecutorError;
use crate::mutator::ReplicaMutator;
use crate::placement::PodPlacer;
use crate::resolver::{ObjectResolver, ResolvedTarget};

/// Executes provision and unbind actions by changing controller replica counts
pub struct HorizontalScaler {
    resolver: ObjectResolver,
    mutator: ReplicaMutator,
    broker: Arc<dyn PodBroker>,
    placer: Arc<dyn PodPlacer>,
    registry: ActionRegistry,
    scale_delta: i32,
    rendezvous_timeout: Duration,
}

impl HorizontalScaler {
    #[must_use]
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        broker: Arc<dyn PodBroker>,
        placer: Arc<dyn PodPlacer>,
        registry: ActionRegistry,
        config: &ExecutorConfig,
    ) -> Self {
        Self {
            resolver: ObjectResolver::new(Arc::clone(&cluster), config.owner_resolution),
            mutator: ReplicaMutator::new(cluster, config.owner_resolution),
            broker,
            placer,
            registry,
            scale_delta: config.scale_delta,
            rendezvous_timeout: config.rendezvous_timeout(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Execute `item`, returning the terminal action record.
    ///
    /// An action UID that already executed is answered from the registry without
    /// touching the cluster. A UID that is still in flight is rejected.
    pub async fn execute(&self, item: &ActionItem) -> Result<TurboAction, ExecutorError> {
        if let Claim::Executed(action) = self.registry.claim(&item.uid)? {
            info!(action_uid = %item.uid, "Action already executed, returning recorded result");
            return Ok(action);
        }
        self.run_claimed(item).await
    }

    /// Execute an action whose UID the caller has already claimed in the registry
    #[instrument(skip(self, item), fields(action_uid = %item.uid, action_type = %item.action_type))]
    pub async fn run_claimed(&self, item: &ActionItem) -> Result<TurboAction, ExecutorError> {
        let mut action = match self.build_pending_action(item).await {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, "Rejected action before any mutation");
                self.registry.reject(&item.uid, e.to_string());
                return Err(e);
            }
        };
        self.registry.track(&action);

        match self.horizontal_scale(&mut action).await {
            Ok(()) => {
                info!(
                    namespace = %action.namespace,
                    parent = %action.content.parent_object_ref.name,
                    original_replicas = action.scale_spec().original_replicas,
                    new_replicas = action.scale_spec().new_replicas,
                    "Action executed"
                );
                self.registry.track(&action);
                Ok(action)
            }
            Err(e) => {
                error!(
                    error = %e,
                    mutation_committed = e.mutation_committed(),
                    "Action failed"
                );
                action.fail(e.to_string());
                self.registry.track(&action);
                Err(e)
            }
        }
    }

    /// Validate `item` and plan its replica change. Reads the cluster, never mutates it.
    async fn build_pending_action(&self, item: &ActionItem) -> Result<TurboAction, ExecutorError> {
        let action_type = TurboActionType::from_item(item.action_type)?;
        let ResolvedTarget {
            pod,
            target,
            parent,
        } = self.resolver.resolve(item).await?;

        if action_type == TurboActionType::Provision && parent.uid.is_empty() {
            return Err(ExecutorError::MissingParentUid {
                namespace: parent.namespace.clone(),
                name: parent.name.clone(),
            });
        }

        let original_replicas = self.mutator.current_replicas(&parent, &pod).await?;
        let scale = ScaleSpec::plan(original_replicas, action_type, self.scale_delta, &parent)?;
        debug!(
            pod = %pod.name_any(),
            parent_kind = parent.kind.as_str(),
            parent = %parent.name,
            original_replicas = scale.original_replicas,
            new_replicas = scale.new_replicas,
            "Planned replica change"
        );

        Ok(TurboAction::new(
            item.uid.clone(),
            TurboActionContent {
                action_type,
                target_object: target,
                parent_object_ref: parent,
                action_spec: ActionSpec::Scale(scale),
            },
        ))
    }

    async fn horizontal_scale(&self, action: &mut TurboAction) -> Result<(), ExecutorError> {
        action.transition(TurboActionStatus::Executing)?;
        self.registry.track(action);

        let parent = action.content.parent_object_ref.clone();
        let target = action.content.target_object.clone();
        let new_replicas = action.scale_spec().new_replicas;

        match action.content.action_type {
            TurboActionType::Unbind => {
                self.mutator
                    .apply_replicas(&parent, &target, new_replicas)
                    .await?;
            }
            TurboActionType::Provision => {
                self.scale_out(&parent, &target, new_replicas).await?;
            }
        }

        action.transition(TurboActionStatus::Executed)
    }

    /// Subscribe, mutate, wait for the new pod and place it.
    ///
    /// The subscription is released on every path out of this function.
    async fn scale_out(
        &self,
        parent: &ParentObjectRef,
        target: &TargetObject,
        new_replicas: i32,
    ) -> Result<(), ExecutorError> {
        let key = parent.uid.as_str();
        let mut subscription = self.broker.subscribe(key);

        if let Err(e) = self
            .mutator
            .apply_replicas(parent, target, new_replicas)
            .await
        {
            self.broker.unsubscribe(key, &subscription);
            return Err(e);
        }

        debug!(
            key = %key,
            timeout_seconds = self.rendezvous_timeout.as_secs(),
            "Waiting for new pod"
        );
        let waited = tokio::time::timeout(self.rendezvous_timeout, subscription.recv()).await;
        self.broker.unsubscribe(key, &subscription);

        let pod = match waited {
            Ok(Some(pod)) => pod,
            Ok(None) => {
                return Err(ExecutorError::BrokerClosed {
                    key: key.to_string(),
                })
            }
            Err(_) => {
                return Err(ExecutorError::RendezvousTimeout {
                    key: key.to_string(),
                    waited: self.rendezvous_timeout,
                })
            }
        };

        let namespace = pod.namespace().unwrap_or_default();
        let name = pod.name_any();
        info!(
            namespace = %namespace,
            pod = %name,
            key = %subscription.key(),
            waited = ?subscription.registered_at().elapsed(),
            "New pod created, handing it to placement"
        );

        self.placer
            .place(&pod)
            .await
            .map_err(|source| ExecutorError::Placement {
                namespace,
                name,
                source,
            })
    }
}
