// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Backend-agnostic publish/subscribe traits.
//!
//! Higher layers (routers, handler wiring) depend on these traits rather than
//! on `PubSub` directly, so another transport can stand in without changing
//! them.

use crate::error::Error;
use crate::message::Message;
use crate::subscription::Subscription;
use async_trait::async_trait;

/// Producer-side API.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes `messages` on `topic` and waits until every current
    /// subscriber has acknowledged each of them.
    async fn publish(&self, topic: &str, messages: Vec<Message>) -> Result<(), Error>;

    /// Stops the publisher. Idempotent.
    async fn close(&self) -> Result<(), Error>;
}

/// Consumer-side API.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Subscribes to `topic`. Every message published on it from registration
    /// onward is delivered to the returned subscription.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, Error>;

    /// Stops the subscriber and ends all of its subscriptions. Idempotent.
    async fn close(&self) -> Result<(), Error>;
}
