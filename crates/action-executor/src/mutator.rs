//! Replica count mutation
//!
//! Replication controllers are scaled directly. A replica set parent is treated as a
//! proxy: the deployment owning it is re-derived from the target pod's labels and the
//! deployment is scaled instead.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::action::{ControllerKind, ParentObjectRef, TargetObject};
use crate::cluster::{label_selector_matches, pick_by_name, ClusterClient, ClusterError};
use crate::config::OwnerResolution;
use crate::error::ExecutorError;

/// Kubernetes defaults an unset `spec.replicas` to one.
const DEFAULT_REPLICAS: i32 = 1;

/// Reads and writes desired replica counts of owning controllers
#[derive(Clone)]
pub struct ReplicaMutator {
    cluster: Arc<dyn ClusterClient>,
    policy: OwnerResolution,
}

impl ReplicaMutator {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterClient>, policy: OwnerResolution) -> Self {
        Self { cluster, policy }
    }

    /// Desired replica count of the object that will be scaled for `parent`
    pub async fn current_replicas(
        &self,
        parent: &ParentObjectRef,
        pod: &Pod,
    ) -> Result<i32, ExecutorError> {
        match parent.kind {
            ControllerKind::ReplicationController => {
                let rc = self
                    .cluster
                    .get_replication_controller(&parent.namespace, &parent.name)
                    .await?;
                Ok(rc
                    .spec
                    .and_then(|spec| spec.replicas)
                    .unwrap_or(DEFAULT_REPLICAS))
            }
            ControllerKind::ReplicaSet => {
                let deployment = self.deployment_for_pod(pod).await?;
                Ok(deployment
                    .spec
                    .and_then(|spec| spec.replicas)
                    .unwrap_or(DEFAULT_REPLICAS))
            }
        }
    }

    /// Set the desired replica count for `parent` to `new_replicas`.
    ///
    /// The scaled object is fetched again right before the update. A rejected update is
    /// returned as is; nothing is retried.
    pub async fn apply_replicas(
        &self,
        parent: &ParentObjectRef,
        target: &TargetObject,
        new_replicas: i32,
    ) -> Result<(), ExecutorError> {
        match parent.kind {
            ControllerKind::ReplicationController => {
                let mutation_error = |source: ClusterError| ExecutorError::Mutation {
                    kind: "ReplicationController",
                    namespace: parent.namespace.clone(),
                    name: parent.name.clone(),
                    source,
                };

                let mut rc = self
                    .cluster
                    .get_replication_controller(&parent.namespace, &parent.name)
                    .await
                    .map_err(mutation_error)?;
                rc.spec.get_or_insert_with(Default::default).replicas = Some(new_replicas);

                let updated = self
                    .cluster
                    .replace_replication_controller(&rc)
                    .await
                    .map_err(mutation_error)?;
                info!(
                    namespace = %parent.namespace,
                    name = %parent.name,
                    replicas = ?updated.spec.and_then(|spec| spec.replicas),
                    "Updated replication controller replicas"
                );
                Ok(())
            }
            ControllerKind::ReplicaSet => {
                let pod = self
                    .cluster
                    .get_pod(&target.namespace, &target.name)
                    .await
                    .map_err(|source| ExecutorError::Mutation {
                        kind: "Pod",
                        namespace: target.namespace.clone(),
                        name: target.name.clone(),
                        source,
                    })?;
                let mut deployment = self.deployment_for_pod(&pod).await?;
                let namespace = deployment.namespace().unwrap_or_default();
                let name = deployment.name_any();
                deployment
                    .spec
                    .get_or_insert_with(Default::default)
                    .replicas = Some(new_replicas);

                let updated = self
                    .cluster
                    .replace_deployment(&deployment)
                    .await
                    .map_err(|source| ExecutorError::Mutation {
                        kind: "Deployment",
                        namespace: namespace.clone(),
                        name: name.clone(),
                        source,
                    })?;
                info!(
                    namespace = %namespace,
                    name = %name,
                    replicas = ?updated.spec.and_then(|spec| spec.replicas),
                    "Updated deployment replicas"
                );
                Ok(())
            }
        }
    }

    /// Find the deployment whose selector matches the pod's labels
    async fn deployment_for_pod(&self, pod: &Pod) -> Result<Deployment, ExecutorError> {
        let namespace = pod.namespace().unwrap_or_default();
        let labels = pod.labels();

        let matching: Vec<Deployment> = self
            .cluster
            .list_deployments(&namespace)
            .await?
            .into_iter()
            .filter(|deployment| {
                deployment
                    .spec
                    .as_ref()
                    .is_some_and(|spec| label_selector_matches(&spec.selector, labels))
            })
            .collect();
        debug!(
            namespace = %namespace,
            pod = %pod.name_any(),
            matches = matching.len(),
            "Matched deployments against pod labels"
        );

        match pick_by_name(matching, ResourceExt::name_any, self.policy) {
            Ok(Some(deployment)) => Ok(deployment),
            Ok(None) => Err(ExecutorError::NoOwningController {
                namespace,
                pod: pod.name_any(),
            }),
            Err(candidates) => Err(ExecutorError::AmbiguousOwner {
                namespace,
                pod: pod.name_any(),
                candidates,
            }),
        }
    }
}
