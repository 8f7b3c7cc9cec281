//! Shared fixtures for the executor integration tests.
//!
//! [`FakeCluster`] keeps pods and controllers in memory and records every call in a
//! [`CallLog`] shared with [`RecordingBroker`], so tests can assert on call order.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use action_executor::cluster::{ClusterClient, ClusterError};
use action_executor::placement::{PlacementError, PodPlacer};
use action_executor::{InMemoryPodBroker, PodBroker, PodSubscription};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, ReplicaSet, ReplicaSetSpec};
use k8s_openapi::api::core::v1::{Pod, ReplicationController, ReplicationControllerSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::ResourceExt;
use mockall::mock;

pub type CallLog = Arc<Mutex<Vec<String>>>;

type ScaleHook = Box<dyn Fn(&str, i32) + Send + Sync>;

// =============================================================================
// Object builders
// =============================================================================

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn meta(namespace: &str, name: &str, uid: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        uid: Some(uid.to_string()),
        ..Default::default()
    }
}

pub fn pod(namespace: &str, name: &str, uid: &str, pod_labels: &[(&str, &str)]) -> Pod {
    let mut metadata = meta(namespace, name, uid);
    if !pod_labels.is_empty() {
        metadata.labels = Some(labels(pod_labels));
    }
    Pod {
        metadata,
        ..Default::default()
    }
}

/// Mark `pod` as controlled by the given owner
pub fn owned_by(mut pod: Pod, kind: &str, name: &str, uid: &str) -> Pod {
    pod.metadata.owner_references = Some(vec![OwnerReference {
        api_version: if kind == "ReplicaSet" { "apps/v1" } else { "v1" }.to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: uid.to_string(),
        controller: Some(true),
        ..Default::default()
    }]);
    pod
}

pub fn rc(
    namespace: &str,
    name: &str,
    uid: &str,
    replicas: i32,
    selector: &[(&str, &str)],
) -> ReplicationController {
    ReplicationController {
        metadata: meta(namespace, name, uid),
        spec: Some(ReplicationControllerSpec {
            replicas: Some(replicas),
            selector: Some(labels(selector)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn replica_set(namespace: &str, name: &str, uid: &str, selector: &[(&str, &str)]) -> ReplicaSet {
    ReplicaSet {
        metadata: meta(namespace, name, uid),
        spec: Some(ReplicaSetSpec {
            selector: LabelSelector {
                match_labels: Some(labels(selector)),
                match_expressions: None,
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn deployment(
    namespace: &str,
    name: &str,
    uid: &str,
    replicas: i32,
    selector: &[(&str, &str)],
) -> Deployment {
    Deployment {
        metadata: meta(namespace, name, uid),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels(selector)),
                match_expressions: None,
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

// =============================================================================
// Fake cluster
// =============================================================================

/// In-memory [`ClusterClient`]
#[derive(Default)]
pub struct FakeCluster {
    pods: Mutex<Vec<Pod>>,
    rcs: Mutex<Vec<ReplicationController>>,
    replica_sets: Mutex<Vec<ReplicaSet>>,
    deployments: Mutex<Vec<Deployment>>,
    log: CallLog,
    reject_updates: AtomicBool,
    on_scale: Mutex<Option<ScaleHook>>,
}

impl FakeCluster {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn with_pod(self, pod: Pod) -> Self {
        self.pods.lock().unwrap().push(pod);
        self
    }

    pub fn with_rc(self, rc: ReplicationController) -> Self {
        self.rcs.lock().unwrap().push(rc);
        self
    }

    pub fn with_replica_set(self, rs: ReplicaSet) -> Self {
        self.replica_sets.lock().unwrap().push(rs);
        self
    }

    pub fn with_deployment(self, deployment: Deployment) -> Self {
        self.deployments.lock().unwrap().push(deployment);
        self
    }

    /// Make every replace call fail
    pub fn reject_updates(&self) {
        self.reject_updates.store(true, Ordering::SeqCst);
    }

    /// Run `hook(name, replicas)` after each successful replica update
    pub fn on_scale(&self, hook: impl Fn(&str, i32) + Send + Sync + 'static) {
        *self.on_scale.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn rc_replicas(&self, name: &str) -> Option<i32> {
        self.rcs
            .lock()
            .unwrap()
            .iter()
            .find(|rc| rc.name_any() == name)
            .and_then(|rc| rc.spec.as_ref()?.replicas)
    }

    pub fn deployment_replicas(&self, name: &str) -> Option<i32> {
        self.deployments
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.name_any() == name)
            .and_then(|d| d.spec.as_ref()?.replicas)
    }

    fn record(&self, call: String) {
        self.log.lock().unwrap().push(call);
    }

    fn scaled(&self, name: &str, replicas: i32) {
        if let Some(hook) = self.on_scale.lock().unwrap().as_ref() {
            hook(name, replicas);
        }
    }

    fn check_updates_allowed(&self) -> Result<(), ClusterError> {
        if self.reject_updates.load(Ordering::SeqCst) {
            return Err(ClusterError::Rejected(
                "the object has been modified".to_string(),
            ));
        }
        Ok(())
    }
}

fn in_namespace<K: ResourceExt + Clone>(objects: &[K], namespace: &str) -> Vec<K> {
    objects
        .iter()
        .filter(|object| object.namespace().as_deref() == Some(namespace))
        .cloned()
        .collect()
}

fn by_name<K: ResourceExt + Clone>(objects: &[K], namespace: &str, name: &str) -> Option<K> {
    objects
        .iter()
        .find(|object| object.namespace().as_deref() == Some(namespace) && object.name_any() == name)
        .cloned()
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_all_pods(&self) -> Result<Vec<Pod>, ClusterError> {
        self.record("list_all_pods".to_string());
        Ok(self.pods.lock().unwrap().clone())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        self.record(format!("get_pod {namespace}/{name}"));
        by_name(&self.pods.lock().unwrap(), namespace, name).ok_or(ClusterError::NotFound {
            kind: "Pod",
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    async fn list_replication_controllers(
        &self,
        namespace: &str,
    ) -> Result<Vec<ReplicationController>, ClusterError> {
        self.record(format!("list_rcs {namespace}"));
        Ok(in_namespace(&self.rcs.lock().unwrap(), namespace))
    }

    async fn get_replication_controller(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicationController, ClusterError> {
        self.record(format!("get_rc {namespace}/{name}"));
        by_name(&self.rcs.lock().unwrap(), namespace, name).ok_or(ClusterError::NotFound {
            kind: "ReplicationController",
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    async fn replace_replication_controller(
        &self,
        rc: &ReplicationController,
    ) -> Result<ReplicationController, ClusterError> {
        let namespace = rc.namespace().unwrap_or_default();
        let name = rc.name_any();
        let replicas = rc.spec.as_ref().and_then(|spec| spec.replicas).unwrap_or(1);
        self.record(format!("replace_rc {namespace}/{name} replicas={replicas}"));
        self.check_updates_allowed()?;

        {
            let mut rcs = self.rcs.lock().unwrap();
            let slot = rcs
                .iter_mut()
                .find(|existing| existing.name_any() == name)
                .ok_or_else(|| ClusterError::NotFound {
                    kind: "ReplicationController",
                    namespace: namespace.clone(),
                    name: name.clone(),
                })?;
            *slot = rc.clone();
        }
        self.scaled(&name, replicas);
        Ok(rc.clone())
    }

    async fn list_replica_sets(&self, namespace: &str) -> Result<Vec<ReplicaSet>, ClusterError> {
        self.record(format!("list_rs {namespace}"));
        Ok(in_namespace(&self.replica_sets.lock().unwrap(), namespace))
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError> {
        self.record(format!("list_deployments {namespace}"));
        Ok(in_namespace(&self.deployments.lock().unwrap(), namespace))
    }

    async fn replace_deployment(
        &self,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError> {
        let namespace = deployment.namespace().unwrap_or_default();
        let name = deployment.name_any();
        let replicas = deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1);
        self.record(format!(
            "replace_deployment {namespace}/{name} replicas={replicas}"
        ));
        self.check_updates_allowed()?;

        {
            let mut deployments = self.deployments.lock().unwrap();
            let slot = deployments
                .iter_mut()
                .find(|existing| existing.name_any() == name)
                .ok_or_else(|| ClusterError::NotFound {
                    kind: "Deployment",
                    namespace: namespace.clone(),
                    name: name.clone(),
                })?;
            *slot = deployment.clone();
        }
        self.scaled(&name, replicas);
        Ok(deployment.clone())
    }
}

// =============================================================================
// Recording broker
// =============================================================================

/// [`InMemoryPodBroker`] that also records calls in the shared [`CallLog`]
pub struct RecordingBroker {
    inner: InMemoryPodBroker,
    log: CallLog,
}

impl RecordingBroker {
    pub fn new(log: CallLog) -> Self {
        Self {
            inner: InMemoryPodBroker::new(),
            log,
        }
    }

    pub fn is_subscribed(&self, key: &str) -> bool {
        self.inner.is_subscribed(key)
    }
}

impl PodBroker for RecordingBroker {
    fn subscribe(&self, key: &str) -> PodSubscription {
        self.log.lock().unwrap().push(format!("subscribe {key}"));
        self.inner.subscribe(key)
    }

    fn publish(&self, key: &str, pod: Pod) -> bool {
        let delivered = self.inner.publish(key, pod);
        self.log
            .lock()
            .unwrap()
            .push(format!("publish {key} delivered={delivered}"));
        delivered
    }

    fn unsubscribe(&self, key: &str, subscription: &PodSubscription) -> bool {
        let released = self.inner.unsubscribe(key, subscription);
        self.log
            .lock()
            .unwrap()
            .push(format!("unsubscribe {key} released={released}"));
        released
    }

    fn close(&self) {
        self.log.lock().unwrap().push("close".to_string());
        self.inner.close();
    }
}

// =============================================================================
// Placement mock
// =============================================================================

mock! {
    pub Placer {}

    #[async_trait]
    impl PodPlacer for Placer {
        async fn place(&self, pod: &Pod) -> Result<(), PlacementError>;
    }
}

/// Calls recorded so far
pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Position of the first call starting with `prefix`
pub fn position(log: &CallLog, prefix: &str) -> Option<usize> {
    calls(log).iter().position(|call| call.starts_with(prefix))
}

/// Number of replica updates issued
pub fn mutation_count(log: &CallLog) -> usize {
    calls(log)
        .iter()
        .filter(|call| call.starts_with("replace_"))
        .count()
}
