// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Consumer-side handle returned by `subscribe`.
//!
//! A `Subscription` owns the receiving end of one subscriber queue. Every
//! message it yields is a private copy: resolve it with `ack()` or `nack()`.
//! Until that happens the publisher keeps waiting on this subscriber.
//!
//! The stream ends (`recv()` returns `None`) when the engine is closed.
//! Dropping the `Subscription` unsubscribes: the engine skips it from then on.

use crate::message::Message;
use crate::registry::SubscriberId;
use futures_core::Stream;

/// A registered consumer's inbound stream of messages.
pub struct Subscription {
    id: SubscriberId,
    topic: String,
    receiver: flume::Receiver<Message>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, topic: String, receiver: flume::Receiver<Message>) -> Self {
        Self {
            id,
            topic,
            receiver,
        }
    }

    /// Identifier of this subscription instance.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Topic this subscription is bound to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receives the next message, or `None` once the engine is closed and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv_async().await.ok()
    }

    /// Returns a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }

    /// Converts this subscription into a `Stream` of messages.
    pub fn into_stream(self) -> impl Stream<Item = Message> + Send + 'static {
        self.receiver.into_stream()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("queued", &self.receiver.len())
            .finish()
    }
}
