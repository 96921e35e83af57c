// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The pub/sub engine: publish, subscribe, close.
//!
//! # Delivery
//!
//! `publish` is blocking in the sense that matters to producers: it returns
//! only after every subscriber registered at the time of the call has acked
//! every message (or was skipped because the engine is closing or the
//! consumer went away). Subscribers are served one after the other in
//! registration order, so a subscriber that keeps nacking stalls the ones
//! behind it for that publish call. Publishes to different topics only share
//! the registry read lock and do not wait on each other.
//!
//! # Replay/Registration Lock Protocol
//!
//! In persistent mode two `tokio::sync::RwLock`s are involved, the topic's
//! retention log lock and the registry lock, always taken in that order:
//!
//! ```text
//!   publish:    retention.write -> append -> registry.read -> release retention
//!               -> deliver batch -> release registry
//!   subscribe:  retention.read -> replay -> registry.write -> register
//!               -> release retention -> release registry
//! ```
//!
//! A publish that appends before a subscription's replay snapshot already
//! holds the registry read lock when it releases the retention lock, so the
//! subscription cannot register until that publish has finished delivering:
//! the message arrives through replay only. A publish that appends after the
//! snapshot waits on the retention write lock until the subscription is
//! registered: the message arrives live only. Either way, exactly once.
//!
//! # Shutdown
//!
//! `close` flips the closed flag, cancels the shutdown token (waking every
//! blocked send and ack wait), then closes all queues under the registry
//! write lock.

use crate::contract::{Publisher, Subscriber};
use crate::delivery::{send_to_subscriber, Delivery};
use crate::error::Error;
use crate::message::Message;
use crate::registry::{RegisteredSubscriber, SubscriberId, SubscriberRegistry};
use crate::retention::RetentionStore;
use crate::subscription::Subscription;
use async_trait::async_trait;
use membus_config::{PubSubConfig, SendTimeout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// In-process publish/subscribe engine.
///
/// Cheaply cloneable; all clones share the same topics and subscribers. There
/// is no global instance, so producers and consumers of one logical bus must
/// be handed the same `PubSub`.
#[derive(Clone)]
pub struct PubSub {
    inner: Arc<PubSubInner>,
}

struct PubSubInner {
    output_buffer: usize,
    send_timeout: SendTimeout,
    registry: SubscriberRegistry,
    // `Some` in persistent mode.
    retention: Option<RetentionStore>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl PubSub {
    /// Builds an engine from validated settings.
    pub fn new(config: PubSubConfig) -> Result<Self, Error> {
        let errors = config.validation_errors("pubsub");
        if !errors.is_empty() {
            return Err(Error::InvalidConfig {
                reason: errors.join("; "),
            });
        }
        Ok(Self {
            inner: Arc::new(PubSubInner {
                output_buffer: config.output_buffer,
                send_timeout: config.send_timeout,
                registry: SubscriberRegistry::new(),
                retention: config.persistent.then(RetentionStore::new),
                shutdown: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Builds an engine that retains messages and replays them to late
    /// subscribers, whatever `config.persistent` says.
    pub fn persistent(config: PubSubConfig) -> Result<Self, Error> {
        Self::new(config.persistent())
    }

    /// Publishes `messages` on `topic`, in order.
    ///
    /// Returns the first send timeout encountered. Messages already delivered
    /// or retained at that point stay delivered/retained, and the remaining
    /// messages of the call are not delivered.
    pub async fn publish(&self, topic: &str, messages: Vec<Message>) -> Result<(), Error> {
        if self.is_closed() {
            tracing::debug!(topic, count = messages.len(), "Pub/sub closed, messages discarded");
            return Ok(());
        }
        let messages: Vec<Arc<Message>> = messages.into_iter().map(Arc::new).collect();

        let registry = match &self.inner.retention {
            Some(retention) => {
                let mut log = retention.lock_for_append(topic).await;
                log.extend(messages.iter().cloned());
                let registry = self.inner.registry.snapshot().await;
                drop(log);
                registry
            }
            None => self.inner.registry.snapshot().await,
        };

        for msg in &messages {
            for subscriber in registry.subscribers(topic) {
                _ = send_to_subscriber(
                    topic,
                    msg,
                    subscriber,
                    self.inner.send_timeout,
                    &self.inner.shutdown,
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Publishes a single message on `topic`.
    pub async fn publish_one(&self, topic: &str, message: Message) -> Result<(), Error> {
        self.publish(topic, vec![message]).await
    }

    /// Subscribes to `topic`.
    ///
    /// Returns at once; registration (and, in persistent mode, replay of the
    /// retained history) runs on a spawned task. Messages published before
    /// that task registers the subscriber are received only through replay.
    /// Subscribing on a closed engine yields an already-ended stream.
    pub async fn subscribe(&self, topic: &str) -> Result<Subscription, Error> {
        let (sender, receiver) = flume::bounded(self.inner.output_buffer);
        let id = SubscriberId::new();
        let subscriber = RegisteredSubscriber::new(id, sender);

        let inner = Arc::clone(&self.inner);
        let task_topic = topic.to_owned();
        _ = tokio::spawn(async move {
            inner.register(task_topic, subscriber).await;
        });

        Ok(Subscription::new(id, topic.to_owned(), receiver))
    }

    /// Shuts the engine down. Idempotent.
    ///
    /// In-flight publishes stop waiting on their subscribers and return `Ok`;
    /// every subscription stream ends.
    pub async fn close(&self) -> Result<(), Error> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.shutdown.cancel();
        let closed = self.inner.registry.close_all().await;
        tracing::debug!(subscribers = closed, "Pub/sub closed");
        Ok(())
    }

    /// Returns `true` once `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of live subscribers on `topic`. Subscriptions that were dropped
    /// are not counted.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.registry.subscriber_count(topic).await
    }

    /// Number of retained messages for `topic`; always 0 when not persistent.
    pub async fn retained(&self, topic: &str) -> usize {
        match &self.inner.retention {
            Some(retention) => retention.len(topic).await,
            None => 0,
        }
    }

    /// Topics that currently have at least one live subscriber.
    pub async fn topics(&self) -> Vec<String> {
        self.inner.registry.topic_names().await
    }

    /// This engine seen through the publisher contract.
    #[must_use]
    pub fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::new(self.clone())
    }

    /// This engine seen through the subscriber contract.
    #[must_use]
    pub fn subscriber(&self) -> Arc<dyn Subscriber> {
        Arc::new(self.clone())
    }
}

impl PubSubInner {
    /// Replays retained history (persistent mode) and then adds the
    /// subscriber to the live set, following the lock protocol above.
    async fn register(&self, topic: String, subscriber: RegisteredSubscriber) {
        let topic = topic.as_str();
        let subscriber_uuid = subscriber.id;

        let Some(retention) = &self.retention else {
            let mut registry = self.registry.lock_for_registration().await;
            if registry.register(topic, subscriber).is_err() {
                tracing::debug!(topic, %subscriber_uuid, "Pub/sub closed, subscription not registered");
            } else {
                tracing::debug!(topic, %subscriber_uuid, "Subscriber registered");
            }
            return;
        };

        let retained = retention.lock_for_replay(topic).await;
        tracing::debug!(topic, %subscriber_uuid, count = retained.len(), "Replaying retained messages");
        for msg in retained.iter() {
            match send_to_subscriber(topic, msg, &subscriber, SendTimeout::Disabled, &self.shutdown)
                .await
            {
                Ok(Delivery::Acked) => {}
                Ok(Delivery::Discarded) => break,
                Ok(Delivery::Departed) => {
                    tracing::debug!(topic, %subscriber_uuid, "Subscriber departed during replay");
                    return;
                }
                Err(err) => {
                    tracing::error!(topic, %subscriber_uuid, error = %err, "Replay failed, dropping subscriber");
                    return;
                }
            }
        }

        let mut registry = self.registry.lock_for_registration().await;
        let registered = registry.register(topic, subscriber).is_ok();
        drop(retained);
        drop(registry);

        if registered {
            tracing::debug!(topic, %subscriber_uuid, "Subscriber registered");
        } else {
            tracing::debug!(topic, %subscriber_uuid, "Pub/sub closed, subscription not registered");
        }
    }
}

#[async_trait]
impl Publisher for PubSub {
    async fn publish(&self, topic: &str, messages: Vec<Message>) -> Result<(), Error> {
        PubSub::publish(self, topic, messages).await
    }

    async fn close(&self) -> Result<(), Error> {
        PubSub::close(self).await
    }
}

#[async_trait]
impl Subscriber for PubSub {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, Error> {
        PubSub::subscribe(self, topic).await
    }

    async fn close(&self) -> Result<(), Error> {
        PubSub::close(self).await
    }
}
