// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Message envelope and the acknowledgment protocol.
//!
//! A `Message` is the unit of transport. The engine never hands the same
//! instance to two consumers: every delivery attempt gets its own `copy()`,
//! which shares the uuid, payload and metadata but owns a fresh
//! acknowledgment cell and a derived cancellation context.
//!
//! # Ack State
//!
//! The acknowledgment cell is a `tokio::sync::watch` channel holding an
//! `AckStatus`. The consumer resolves it through `ack()`/`nack()` on the copy
//! it received; the delivery loop observes it through an `AckWatch` taken
//! before the copy is handed off. Resolution is a compare-and-set from
//! `Pending`, so exactly one of ack/nack ever becomes visible.
//!
//! A copy dropped while still `Pending` closes the cell. The watcher reports
//! that as `None` and the delivery loop treats it like a nack.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Acknowledgment state of one delivered copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckStatus {
    /// Not yet resolved by the consumer.
    #[default]
    Pending,
    /// Consumer processed the message.
    Acked,
    /// Consumer rejected the message; the engine will send a fresh copy.
    Nacked,
}

impl AckStatus {
    /// Returns `true` once the copy is acked or nacked.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// String metadata carried alongside the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(HashMap<String, String>);

impl Metadata {
    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        _ = self.0.insert(key.into(), value.into());
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when there is no metadata.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over key/value pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A published message.
#[derive(Debug)]
pub struct Message {
    uuid: Arc<str>,
    payload: Bytes,
    metadata: Metadata,
    ack: watch::Sender<AckStatus>,
    context: CancellationToken,
}

impl Message {
    /// Creates a message with a producer-assigned identifier.
    pub fn new(uuid: impl Into<Arc<str>>, payload: impl Into<Bytes>) -> Self {
        let (ack, _) = watch::channel(AckStatus::Pending);
        Self {
            uuid: uuid.into(),
            payload: payload.into(),
            metadata: Metadata::default(),
            ack,
            context: CancellationToken::new(),
        }
    }

    /// Creates a message identified by a random v4 UUID.
    pub fn with_random_uuid(payload: impl Into<Bytes>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), payload)
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.set(key, value);
        self
    }

    /// Message identifier, identical on every copy.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Message body.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Metadata attached by the producer.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Sets one metadata entry on this instance only.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.set(key, value);
    }

    /// Execution context of this copy. Cancelled by the engine at the latest
    /// when delivery of the copy is over.
    #[must_use]
    pub fn context(&self) -> &CancellationToken {
        &self.context
    }

    /// Replaces the execution context.
    pub fn set_context(&mut self, context: CancellationToken) {
        self.context = context;
    }

    /// Returns an independent clone with a fresh ack state and a context
    /// derived from this one.
    #[must_use]
    pub fn copy(&self) -> Self {
        let (ack, _) = watch::channel(AckStatus::Pending);
        Self {
            uuid: Arc::clone(&self.uuid),
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
            ack,
            context: self.context.child_token(),
        }
    }

    /// Marks the message as processed. Returns `false` if it was already
    /// acked or nacked.
    pub fn ack(&self) -> bool {
        self.resolve(AckStatus::Acked)
    }

    /// Rejects the message so the engine sends it again. Returns `false` if it
    /// was already acked or nacked.
    pub fn nack(&self) -> bool {
        self.resolve(AckStatus::Nacked)
    }

    /// Current acknowledgment state.
    #[must_use]
    pub fn status(&self) -> AckStatus {
        *self.ack.borrow()
    }

    /// Waits until the message is acked or nacked.
    pub async fn resolved(&self) -> AckStatus {
        let mut watch = self.watch();
        // The sender lives in `self`, so the cell cannot close while we wait.
        watch.resolved().await.unwrap_or(AckStatus::Nacked)
    }

    pub(crate) fn watch(&self) -> AckWatch {
        AckWatch {
            rx: self.ack.subscribe(),
        }
    }

    fn resolve(&self, outcome: AckStatus) -> bool {
        self.ack.send_if_modified(|status| {
            if status.is_resolved() {
                false
            } else {
                *status = outcome;
                true
            }
        })
    }
}

/// Observer side of one copy's ack cell, held by the delivery loop.
pub(crate) struct AckWatch {
    rx: watch::Receiver<AckStatus>,
}

impl AckWatch {
    /// Resolves to the final status, or `None` if the copy was dropped while
    /// still pending.
    pub(crate) async fn resolved(&mut self) -> Option<AckStatus> {
        match self.rx.wait_for(AckStatus::is_resolved).await {
            Ok(status) => Some(*status),
            Err(_) => None,
        }
    }
}
