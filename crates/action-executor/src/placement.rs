//! Placement of newly created pods
//!
//! After a scale-out the executor hands the new pod to a [`PodPlacer`]. The bundled
//! [`BindingPlacer`] binds an unscheduled pod to the ready node currently running the
//! fewest pods. A pod the default scheduler bound in the meantime is left untouched,
//! including when that bind races ours and the API server answers `409 Conflict`.

use std::collections::HashMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Binding, Node, ObjectReference, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams, PostParams};
use kube::{Client, ResourceExt};
use thiserror::Error;
use tracing::{debug, info};

/// Errors returned while placing a pod
#[derive(Error, Debug)]
pub enum PlacementError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("no schedulable node available for pod {pod}")]
    NoSchedulableNode { pod: String },

    #[error("failed to encode binding: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Hands a newly created pod to a placement decision
#[async_trait]
pub trait PodPlacer: Send + Sync {
    async fn place(&self, pod: &Pod) -> Result<(), PlacementError>;
}

/// [`PodPlacer`] that writes a `Binding` for unscheduled pods
#[derive(Clone)]
pub struct BindingPlacer {
    client: Client,
}

impl BindingPlacer {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodPlacer for BindingPlacer {
    async fn place(&self, pod: &Pod) -> Result<(), PlacementError> {
        let namespace = pod.namespace().unwrap_or_default();
        let name = pod.name_any();

        if let Some(node) = pod.spec.as_ref().and_then(|spec| spec.node_name.as_deref()) {
            debug!(namespace = %namespace, pod = %name, node = %node, "Pod already bound, nothing to place");
            return Ok(());
        }

        // The delivered copy predates scheduling; ask the API server for the current one.
        let namespaced: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        if let Some(node) = bound_node(&namespaced, &name).await? {
            debug!(namespace = %namespace, pod = %name, node = %node, "Pod already bound, nothing to place");
            return Ok(());
        }

        let nodes: Api<Node> = Api::all(self.client.clone());
        let pods: Api<Pod> = Api::all(self.client.clone());
        let node_list = nodes.list(&ListParams::default()).await?.items;
        let pod_list = pods.list(&ListParams::default()).await?.items;

        let node_name =
            choose_node(&node_list, &pod_list).ok_or_else(|| PlacementError::NoSchedulableNode {
                pod: format!("{namespace}/{name}"),
            })?;

        let binding = Binding {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.clone()),
                ..Default::default()
            },
            target: ObjectReference {
                api_version: Some("v1".to_string()),
                kind: Some("Node".to_string()),
                name: Some(node_name.clone()),
                ..Default::default()
            },
        };

        let posted = namespaced
            .create_subresource::<serde_json::Value>(
                "binding",
                &name,
                &PostParams::default(),
                serde_json::to_vec(&binding)?,
            )
            .await;

        match posted {
            Ok(_) => {
                info!(namespace = %namespace, pod = %name, node = %node_name, "Bound new pod to node");
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 409 => {
                match bound_node(&namespaced, &name).await? {
                    Some(node) => {
                        info!(namespace = %namespace, pod = %name, node = %node, "Pod was bound concurrently");
                        Ok(())
                    }
                    None => Err(kube::Error::Api(response).into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn bound_node(api: &Api<Pod>, name: &str) -> Result<Option<String>, PlacementError> {
    let current = api.get(name).await?;
    Ok(current.spec.and_then(|spec| spec.node_name))
}

/// Pick the ready, schedulable node with the fewest bound pods.
///
/// Ties go to the node whose name sorts first.
#[must_use]
pub fn choose_node(nodes: &[Node], pods: &[Pod]) -> Option<String> {
    let mut load: HashMap<&str, usize> = HashMap::new();
    for node_name in pods
        .iter()
        .filter_map(|pod| pod.spec.as_ref()?.node_name.as_deref())
    {
        *load.entry(node_name).or_default() += 1;
    }

    nodes
        .iter()
        .filter(|node| is_schedulable(node))
        .map(|node| {
            let name = node.name_any();
            let bound = load.get(name.as_str()).copied().unwrap_or_default();
            (bound, name)
        })
        .min()
        .map(|(_, name)| name)
}

fn is_schedulable(node: &Node) -> bool {
    let cordoned = node
        .spec
        .as_ref()
        .and_then(|spec| spec.unschedulable)
        .unwrap_or(false);

    let ready = node
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|condition| condition.type_ == "Ready" && condition.status == "True")
        });

    ready && !cordoned
}
