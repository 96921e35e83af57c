// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! In-process publish/subscribe engine.
//!
//! Producers publish messages on a topic; every subscriber registered on that
//! topic receives its own copy of every message, in publish order, and must
//! ack or nack it. A nack sends a fresh copy again, without limit, until the
//! subscriber acks, the per-send timeout expires, or the engine closes.
//!
//! ```text
//!   publish(topic, msgs)
//!        │
//!        ├── [persistent] RetentionStore: append to topic log
//!        ▼
//!   SubscriberRegistry (read lock) ──► for each msg, for each subscriber
//!                                          │ (registration order)
//!                                          ▼
//!                            copy ─► bounded queue ─► ack / nack / shutdown
//! ```
//!
//! Each subscriber queue is a bounded `flume` channel, so a slow consumer
//! pushes back on the producer. In persistent mode a late subscriber first
//! replays everything retained for its topic, then switches to live delivery
//! with no gap and no duplicate.

mod contract;
mod delivery;
mod error;
mod message;
mod pubsub;
mod registry;
mod retention;
mod subscription;

#[cfg(test)]
mod tests;

pub use contract::{Publisher, Subscriber};
pub use error::Error;
pub use membus_config::{PubSubConfig, SendTimeout};
pub use message::{AckStatus, Message, Metadata};
pub use pubsub::PubSub;
pub use registry::SubscriberId;
pub use subscription::Subscription;
