//! Cluster API access
//!
//! [`ClusterClient`] is the narrow set of namespace-scoped reads and writes the executor
//! needs. [`KubeCluster`] implements it against a live API server.

pub mod selector;

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Pod, ReplicationController};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, PostParams};
use kube::{Client, Error as KubeError, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub use selector::{label_selector_matches, pick_by_name, selector_matches};

/// Errors returned by cluster reads and writes
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] KubeError),

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("{kind} object is missing metadata.name")]
    MissingName { kind: &'static str },

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Cluster operations used by the resolver and the replica mutator
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List pods in every namespace
    async fn list_all_pods(&self) -> Result<Vec<Pod>, ClusterError>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError>;

    async fn list_replication_controllers(
        &self,
        namespace: &str,
    ) -> Result<Vec<ReplicationController>, ClusterError>;

    async fn get_replication_controller(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicationController, ClusterError>;

    async fn replace_replication_controller(
        &self,
        rc: &ReplicationController,
    ) -> Result<ReplicationController, ClusterError>;

    async fn list_replica_sets(&self, namespace: &str) -> Result<Vec<ReplicaSet>, ClusterError>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError>;

    async fn replace_deployment(&self, deployment: &Deployment)
        -> Result<Deployment, ClusterError>;
}

/// [`ClusterClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn list_in<K: NamespacedObject>(&self, namespace: &str) -> Result<Vec<K>, ClusterError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_in<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<K, ClusterError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(object) => Ok(object),
            Err(KubeError::Api(err)) if err.code == 404 => Err(ClusterError::NotFound {
                kind: K::KIND,
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(ClusterError::KubeError(e)),
        }
    }

    async fn replace_in<K: NamespacedObject>(&self, object: &K) -> Result<K, ClusterError> {
        let name = object
            .meta()
            .name
            .clone()
            .ok_or(ClusterError::MissingName { kind: K::KIND })?;
        let namespace = object.namespace().unwrap_or_default();
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        let updated = api.replace(&name, &PostParams::default(), object).await?;
        debug!(
            kind = K::KIND,
            namespace = %namespace,
            name = %name,
            "Replaced object"
        );
        Ok(updated)
    }
}

/// Namespaced built-in object the generic helpers can read and replace
trait NamespacedObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + k8s_openapi::Resource
    + Clone
    + Serialize
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
}

impl<K> NamespacedObject for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + k8s_openapi::Resource
        + Clone
        + Serialize
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static
{
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn list_all_pods(&self) -> Result<Vec<Pod>, ClusterError> {
        let api: Api<Pod> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        self.get_in(namespace, name).await
    }

    async fn list_replication_controllers(
        &self,
        namespace: &str,
    ) -> Result<Vec<ReplicationController>, ClusterError> {
        self.list_in(namespace).await
    }

    async fn get_replication_controller(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicationController, ClusterError> {
        self.get_in(namespace, name).await
    }

    async fn replace_replication_controller(
        &self,
        rc: &ReplicationController,
    ) -> Result<ReplicationController, ClusterError> {
        self.replace_in(rc).await
    }

    async fn list_replica_sets(&self, namespace: &str) -> Result<Vec<ReplicaSet>, ClusterError> {
        self.list_in(namespace).await
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError> {
        self.list_in(namespace).await
    }

    async fn replace_deployment(
        &self,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError> {
        self.replace_in(deployment).await
    }
}
