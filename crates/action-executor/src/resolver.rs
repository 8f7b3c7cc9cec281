//! Cluster object resolution
//!
//! Turns the target of an [`ActionItem`] into the concrete pod it refers to and the
//! controller that owns that pod. Resolution only reads cluster state.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, warn};

use crate::action::{ActionItem, ControllerKind, EntityType, ParentObjectRef, TargetObject};
use crate::cluster::{label_selector_matches, pick_by_name, selector_matches, ClusterClient};
use crate::config::OwnerResolution;
use crate::error::ExecutorError;

/// A pod and the controller that owns it
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub pod: Pod,
    pub target: TargetObject,
    pub parent: ParentObjectRef,
}

/// Locates target pods and their owning controllers
#[derive(Clone)]
pub struct ObjectResolver {
    cluster: Arc<dyn ClusterClient>,
    policy: OwnerResolution,
}

impl ObjectResolver {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterClient>, policy: OwnerResolution) -> Self {
        Self { cluster, policy }
    }

    pub async fn resolve(&self, item: &ActionItem) -> Result<ResolvedTarget, ExecutorError> {
        let pod = self.find_target_pod(item).await?;
        debug!(
            namespace = %pod.namespace().unwrap_or_default(),
            pod = %pod.name_any(),
            "Resolved provider pod"
        );

        let parent = self.find_parent(&pod).await?;
        Ok(ResolvedTarget {
            target: TargetObject::from_pod(&pod),
            pod,
            parent,
        })
    }

    /// Find the pod an action is about.
    ///
    /// Entity-type checks happen before any cluster call.
    pub async fn find_target_pod(&self, item: &ActionItem) -> Result<Pod, ExecutorError> {
        let target = &item.target_se;
        match target.entity_type {
            EntityType::ContainerPod => self.pod_by_uid(&target.id).await,
            EntityType::Application => {
                let candidates: Vec<&str> = item
                    .providers
                    .iter()
                    .filter(|provider| provider.entity_type == EntityType::ContainerPod)
                    .flat_map(|provider| provider.ids.iter().map(String::as_str))
                    .collect();
                if candidates.is_empty() {
                    return Err(ExecutorError::NoProviderPod {
                        target: target.label().to_string(),
                    });
                }

                let pods = self.cluster.list_all_pods().await?;
                candidates
                    .iter()
                    .find_map(|id| {
                        let found = find_by_uid(&pods, id);
                        if found.is_none() {
                            warn!(pod_uid = %id, "Provider pod not found, trying next provider");
                        }
                        found
                    })
                    .ok_or_else(|| ExecutorError::NoProviderPod {
                        target: target.label().to_string(),
                    })
            }
            EntityType::VirtualApplication => {
                let current = item.current_se.as_ref();
                let application = match current {
                    Some(current) if current.entity_type == EntityType::Application => current,
                    _ => {
                        return Err(ExecutorError::UnexpectedCurrentEntity {
                            found: current.map_or_else(
                                || "nothing".to_string(),
                                |current| current.entity_type.to_string(),
                            ),
                        })
                    }
                };

                // The last pod provider in the commodities bought map wins.
                let pod_id = application
                    .commodities_bought
                    .iter()
                    .rev()
                    .find(|bought| bought.provider_type == EntityType::ContainerPod)
                    .map(|bought| bought.provider_id.as_str())
                    .ok_or_else(|| ExecutorError::NoProviderPod {
                        target: application.label().to_string(),
                    })?;

                self.pod_by_uid(pod_id).await
            }
            other => Err(ExecutorError::InvalidEntityType { entity_type: other }),
        }
    }

    /// Find the controller that owns `pod`.
    ///
    /// A controller owner reference is authoritative. Without one, replication
    /// controllers and replica sets in the pod's namespace are matched by selector.
    pub async fn find_parent(&self, pod: &Pod) -> Result<ParentObjectRef, ExecutorError> {
        let namespace = pod.namespace().unwrap_or_default();

        if let Some(owner) = pod
            .owner_references()
            .iter()
            .find(|owner| owner.controller == Some(true))
        {
            let kind = ControllerKind::from_kind(&owner.kind).ok_or_else(|| {
                ExecutorError::UnsupportedControllerKind {
                    kind: owner.kind.clone(),
                    namespace: namespace.clone(),
                    name: owner.name.clone(),
                }
            })?;
            return Ok(ParentObjectRef {
                uid: owner.uid.clone(),
                namespace,
                name: owner.name.clone(),
                kind,
            });
        }

        let labels = pod.labels();
        if labels.is_empty() {
            warn!(
                namespace = %namespace,
                pod = %pod.name_any(),
                "Pod has no labels, it cannot be owned by a controller"
            );
            return Err(no_owner(pod));
        }

        let mut candidates: Vec<ParentObjectRef> = self
            .cluster
            .list_replication_controllers(&namespace)
            .await?
            .into_iter()
            .filter(|rc| {
                rc.spec
                    .as_ref()
                    .and_then(|spec| spec.selector.as_ref())
                    .is_some_and(|selector| selector_matches(selector, labels))
            })
            .map(|rc| ParentObjectRef {
                uid: rc.uid().unwrap_or_default(),
                namespace: namespace.clone(),
                name: rc.name_any(),
                kind: ControllerKind::ReplicationController,
            })
            .collect();

        candidates.extend(
            self.cluster
                .list_replica_sets(&namespace)
                .await?
                .into_iter()
                .filter(|rs| {
                    rs.spec
                        .as_ref()
                        .is_some_and(|spec| label_selector_matches(&spec.selector, labels))
                })
                .map(|rs| ParentObjectRef {
                    uid: rs.uid().unwrap_or_default(),
                    namespace: namespace.clone(),
                    name: rs.name_any(),
                    kind: ControllerKind::ReplicaSet,
                }),
        );

        match pick_by_name(candidates, |parent| parent.name.clone(), self.policy) {
            Ok(Some(parent)) => Ok(parent),
            Ok(None) => Err(no_owner(pod)),
            Err(candidates) => Err(ExecutorError::AmbiguousOwner {
                namespace,
                pod: pod.name_any(),
                candidates,
            }),
        }
    }

    async fn pod_by_uid(&self, uid: &str) -> Result<Pod, ExecutorError> {
        let pods = self.cluster.list_all_pods().await?;
        find_by_uid(&pods, uid).ok_or_else(|| ExecutorError::PodNotFound {
            uid: uid.to_string(),
        })
    }
}

fn no_owner(pod: &Pod) -> ExecutorError {
    ExecutorError::NoOwningController {
        namespace: pod.namespace().unwrap_or_default(),
        pod: pod.name_any(),
    }
}

fn find_by_uid(pods: &[Pod], uid: &str) -> Option<Pod> {
    pods.iter()
        .find(|pod| pod.metadata.uid.as_deref() == Some(uid))
        .cloned()
}
