//! # Pod-Creation Broker
//!
//! A keyed rendezvous between whoever observes newly created pods (the watcher) and the
//! scale-out actions waiting for them. Keys are owning-controller UIDs.
//!
//! - One slot per key. Subscribing again replaces the previous slot.
//! - A publish with no subscriber is dropped; the broker keeps no history.
//! - Delivery is at most once per subscription: a publish consumes the slot.
//!
//! The broker is constructed once by the process owner and shared as
//! `Arc<dyn PodBroker>`; tests can supply their own implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

/// Keyed publish/subscribe rendezvous for newly created pods
pub trait PodBroker: Send + Sync {
    /// Register interest in the next pod published under `key`
    fn subscribe(&self, key: &str) -> PodSubscription;

    /// Hand `pod` to the current subscriber of `key`, if any.
    ///
    /// Returns whether a subscriber received it.
    fn publish(&self, key: &str, pod: Pod) -> bool;

    /// Release the slot held by `subscription`. Returns whether a slot was released.
    ///
    /// Safe to call after delivery or timeout; a slot owned by a newer subscription is
    /// left alone.
    fn unsubscribe(&self, key: &str, subscription: &PodSubscription) -> bool;

    /// Tear the broker down. Waiting subscribers observe a closed channel.
    fn close(&self);
}

/// Handle for one registration with a [`PodBroker`]
#[derive(Debug)]
pub struct PodSubscription {
    key: String,
    id: Uuid,
    registered_at: Instant,
    receiver: Option<oneshot::Receiver<Pod>>,
}

impl PodSubscription {
    /// Create a subscription and the sender that completes it.
    ///
    /// Broker implementations keep the sender in their slot for `key`.
    #[must_use]
    pub fn channel(key: &str) -> (oneshot::Sender<Pod>, Self) {
        let (sender, receiver) = oneshot::channel();
        let subscription = Self {
            key: key.to_string(),
            id: Uuid::new_v4(),
            registered_at: Instant::now(),
            receiver: Some(receiver),
        };
        (sender, subscription)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn registered_at(&self) -> Instant {
        self.registered_at
    }

    /// Wait for the pod. `None` means the channel was closed without a delivery.
    ///
    /// Single shot: once a pod or a close has been observed, later calls return `None`.
    pub async fn recv(&mut self) -> Option<Pod> {
        let receiver = self.receiver.as_mut()?;
        let result = receiver.await.ok();
        self.receiver = None;
        result
    }
}

struct Slot {
    id: Uuid,
    sender: oneshot::Sender<Pod>,
}

/// Process-local [`PodBroker`]
#[derive(Default)]
pub struct InMemoryPodBroker {
    slots: DashMap<String, Slot>,
    closed: AtomicBool,
}

impl InMemoryPodBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a subscription is currently registered for `key`
    #[must_use]
    pub fn is_subscribed(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.slots.len()
    }
}

impl PodBroker for InMemoryPodBroker {
    fn subscribe(&self, key: &str) -> PodSubscription {
        let (sender, subscription) = PodSubscription::channel(key);

        if self.closed.load(Ordering::Acquire) {
            warn!(key = %key, "Subscribing to a closed pod broker");
            return subscription;
        }

        let previous = self.slots.insert(
            key.to_string(),
            Slot {
                id: subscription.id(),
                sender,
            },
        );
        if previous.is_some() {
            warn!(key = %key, "Replaced an existing pod subscription");
        }
        debug!(key = %key, subscription = %subscription.id(), "Registered pod subscription");
        subscription
    }

    fn publish(&self, key: &str, pod: Pod) -> bool {
        let Some((_, slot)) = self.slots.remove(key) else {
            debug!(key = %key, pod = %pod.name_any(), "No subscriber for new pod, dropping it");
            return false;
        };

        let pod_name = pod.name_any();
        match slot.sender.send(pod) {
            Ok(()) => {
                debug!(key = %key, pod = %pod_name, subscription = %slot.id, "Delivered new pod");
                true
            }
            Err(_) => {
                debug!(key = %key, pod = %pod_name, "Subscriber went away before delivery");
                false
            }
        }
    }

    fn unsubscribe(&self, key: &str, subscription: &PodSubscription) -> bool {
        let released = self
            .slots
            .remove_if(key, |_, slot| slot.id == subscription.id())
            .is_some();
        debug!(
            key = %key,
            subscription = %subscription.id(),
            released,
            "Released pod subscription"
        );
        released
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let dropped = self.slots.len();
        self.slots.clear();
        debug!(dropped, "Closed pod broker");
    }
}
