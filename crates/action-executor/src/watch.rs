//! Pod-creation watcher
//!
//! Feeds the [`PodBroker`] from a pod watch: every pod created after the watcher
//! started that is not bound to a node yet is published under the UID of its
//! controlling owner. A pod is published at most once.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, ResourceExt};
use tracing::{debug, info, warn};

use crate::broker::PodBroker;

/// Broker key for a newly created pod, if `pod` is one.
///
/// A pod qualifies when it has a controller owner, has no node yet, is not being
/// deleted and was created at or after `since`. Creation timestamps only carry whole
/// seconds, so `since` is compared at that precision.
#[must_use]
pub fn creation_key(pod: &Pod, since: DateTime<Utc>) -> Option<String> {
    if pod.metadata.deletion_timestamp.is_some() {
        return None;
    }
    if pod
        .spec
        .as_ref()
        .is_some_and(|spec| spec.node_name.is_some())
    {
        return None;
    }

    let created = pod.metadata.creation_timestamp.as_ref()?;
    if created.0 < since.trunc_subsecs(0) {
        return None;
    }

    pod.owner_references()
        .iter()
        .find(|owner| owner.controller == Some(true))
        .map(|owner| owner.uid.clone())
}

/// Publish-once bookkeeping between pod watch events and a [`PodBroker`]
///
/// A pod UID is published the first time it qualifies as new. It stays remembered
/// until the pod stops qualifying, is deleted, or is missing from a re-list.
pub struct CreationPublisher {
    broker: Arc<dyn PodBroker>,
    since: DateTime<Utc>,
    published: HashSet<String>,
    relisted: Option<HashSet<String>>,
}

impl CreationPublisher {
    #[must_use]
    pub fn new(broker: Arc<dyn PodBroker>, since: DateTime<Utc>) -> Self {
        Self {
            broker,
            since,
            published: HashSet::new(),
            relisted: None,
        }
    }

    /// Apply one watch event. Returns whether a pod was published.
    pub fn handle(&mut self, event: watcher::Event<Pod>) -> bool {
        match event {
            watcher::Event::Apply(pod) => self.observe(&pod),
            watcher::Event::InitApply(pod) => {
                if let (Some(seen), Some(uid)) = (self.relisted.as_mut(), pod.uid()) {
                    seen.insert(uid);
                }
                self.observe(&pod)
            }
            watcher::Event::Delete(pod) => {
                if let Some(uid) = pod.uid() {
                    self.published.remove(&uid);
                }
                false
            }
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                false
            }
            watcher::Event::InitDone => {
                if let Some(seen) = self.relisted.take() {
                    self.published.retain(|uid| seen.contains(uid));
                }
                false
            }
        }
    }

    /// Number of pod UIDs currently remembered as published
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.published.len()
    }

    fn observe(&mut self, pod: &Pod) -> bool {
        let Some(pod_uid) = pod.uid() else {
            return false;
        };

        let Some(key) = creation_key(pod, self.since) else {
            self.published.remove(&pod_uid);
            return false;
        };
        if !self.published.insert(pod_uid) {
            return false;
        }

        let delivered = self.broker.publish(&key, pod.clone());
        debug!(
            namespace = %pod.namespace().unwrap_or_default(),
            pod = %pod.name_any(),
            key = %key,
            delivered,
            "Observed new pod"
        );
        true
    }
}

/// Watches pods and publishes new ones to a [`PodBroker`]
pub struct PodCreationWatcher {
    client: Client,
    broker: Arc<dyn PodBroker>,
    namespace: Option<String>,
}

impl PodCreationWatcher {
    /// Watch `namespace`, or every namespace when `None`
    #[must_use]
    pub fn new(client: Client, broker: Arc<dyn PodBroker>, namespace: Option<String>) -> Self {
        Self {
            client,
            broker,
            namespace,
        }
    }

    /// Run until the watch stream ends. Watch errors are logged and retried with backoff.
    pub async fn run(self) {
        let api: Api<Pod> = match &self.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        };
        info!(
            namespace = self.namespace.as_deref().unwrap_or("*"),
            "Starting pod creation watcher"
        );

        let mut publisher = CreationPublisher::new(self.broker.clone(), Utc::now());
        let mut events =
            std::pin::pin!(watcher(api, watcher::Config::default()).default_backoff());

        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    publisher.handle(event);
                }
                Err(e) => warn!(error = %e, "Pod watch error"),
            }
        }

        info!("Pod creation watcher stopped");
    }
}
