// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Engine-level tests grouped by area: fan-out, ack/nack outcomes, retention
//! and replay, lifecycle.

use crate::{Message, PubSub, PubSubConfig, SendTimeout, Subscription};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub(super) fn pubsub(output_buffer: usize, send_timeout: SendTimeout) -> PubSub {
    PubSub::new(PubSubConfig::new(output_buffer, send_timeout)).expect("config should be valid")
}

pub(super) fn persistent_pubsub(output_buffer: usize) -> PubSub {
    PubSub::persistent(PubSubConfig::new(output_buffer, SendTimeout::Disabled))
        .expect("config should be valid")
}

pub(super) fn msg(uuid: &str) -> Message {
    Message::new(uuid.to_owned(), format!("payload-{uuid}"))
}

pub(super) fn msgs(uuids: &[&str]) -> Vec<Message> {
    uuids.iter().map(|uuid| msg(uuid)).collect()
}

/// Waits until `count` subscribers are registered on `topic`.
pub(super) async fn wait_for_subscribers(pubsub: &PubSub, topic: &str, count: usize) {
    timeout(Duration::from_secs(1), async {
        while pubsub.subscriber_count(topic).await < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("subscribers should register in time");
}

/// Acks everything it receives and returns the uuids once the stream ends.
pub(super) fn spawn_acking_consumer(mut subscription: Subscription) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(message) = subscription.recv().await {
            seen.push(message.uuid().to_owned());
            assert!(message.ack());
        }
        seen
    })
}
