// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Subscriber registry: per-topic, registration-ordered subscriber lists.
//!
//! The whole registry sits behind one `tokio::sync::RwLock`. Delivery holds
//! the read side for the duration of a publish call (across `.await`s, which
//! is why this is not a `parking_lot` lock); registration and close take the
//! write side. A subscriber is therefore never observed half-added, and a
//! delivery loop never iterates a list that is being mutated.
//!
//! Closing drops every `flume::Sender`, which is what ends each consumer's
//! stream. After that the registry refuses registrations: a late subscriber
//! is dropped on the spot and its consumer sees end-of-stream immediately.

use crate::message::Message;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Identifier of one subscription instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Engine-side half of a subscription: the id and the queue's sending end.
pub(crate) struct RegisteredSubscriber {
    pub(crate) id: SubscriberId,
    pub(crate) sender: flume::Sender<Message>,
}

impl RegisteredSubscriber {
    pub(crate) fn new(id: SubscriberId, sender: flume::Sender<Message>) -> Self {
        Self { id, sender }
    }

    /// The consumer dropped its `Subscription`.
    pub(crate) fn is_departed(&self) -> bool {
        self.sender.is_disconnected()
    }
}

#[derive(Default)]
pub(crate) struct RegistryState {
    closed: bool,
    topics: HashMap<String, Vec<RegisteredSubscriber>>,
}

impl RegistryState {
    /// Subscribers of `topic` in registration order.
    pub(crate) fn subscribers(&self, topic: &str) -> &[RegisteredSubscriber] {
        self.topics.get(topic).map_or(&[], Vec::as_slice)
    }

    /// Appends `subscriber` to the topic's live set.
    ///
    /// Hands the subscriber back if the registry is closed. Departed
    /// subscribers of the same topic are pruned on the way.
    pub(crate) fn register(
        &mut self,
        topic: &str,
        subscriber: RegisteredSubscriber,
    ) -> Result<(), RegisteredSubscriber> {
        if self.closed {
            return Err(subscriber);
        }
        let subscribers = self.topics.entry(topic.to_owned()).or_default();
        let before = subscribers.len();
        subscribers.retain(|s| !s.is_departed());
        let pruned = before - subscribers.len();
        if pruned > 0 {
            tracing::debug!(topic, pruned, "Pruned departed subscribers");
        }
        subscribers.push(subscriber);
        Ok(())
    }

    /// Subscribers of `topic` whose consumer still holds its `Subscription`.
    fn live_count(&self, topic: &str) -> usize {
        self.subscribers(topic)
            .iter()
            .filter(|s| !s.is_departed())
            .count()
    }

    fn topic_names(&self) -> Vec<String> {
        self.topics
            .iter()
            .filter(|(_, subscribers)| subscribers.iter().any(|s| !s.is_departed()))
            .map(|(topic, _)| topic.clone())
            .collect()
    }
}

pub(crate) struct SubscriberRegistry {
    state: RwLock<RegistryState>,
}

impl SubscriberRegistry {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Shared view used by delivery. Registration waits until it is dropped.
    pub(crate) async fn snapshot(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().await
    }

    /// Exclusive access used to add a subscriber.
    pub(crate) async fn lock_for_registration(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().await
    }

    /// Disables registration and closes every subscriber queue. Returns the
    /// number of queues closed; a second call closes nothing.
    pub(crate) async fn close_all(&self) -> usize {
        let mut state = self.state.write().await;
        state.closed = true;
        // Dropping the senders is what closes the queues.
        state.topics.drain().map(|(_, subscribers)| subscribers.len()).sum()
    }

    /// Live subscribers of `topic`. Departed entries awaiting pruning are
    /// not counted.
    pub(crate) async fn subscriber_count(&self, topic: &str) -> usize {
        self.state.read().await.live_count(topic)
    }

    /// Topics with at least one live subscriber.
    pub(crate) async fn topic_names(&self) -> Vec<String> {
        self.state.read().await.topic_names()
    }
}
