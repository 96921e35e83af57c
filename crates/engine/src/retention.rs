// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Append-only, per-topic message log for persistent mode.
//!
//! Each topic log has its own `tokio::sync::RwLock`: publish appends under
//! the write side, a new subscriber replays under the read side, and a long
//! replay on one topic does not hold up publishers of another. The index from
//! topic name to log is a `parking_lot::Mutex` held only to clone an `Arc`.
//!
//! Logs are never pruned and live as long as the engine.

use crate::message::Message;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

pub(crate) type TopicLog = Vec<Arc<Message>>;

pub(crate) struct RetentionStore {
    topics: Mutex<HashMap<String, Arc<RwLock<TopicLog>>>>,
}

impl RetentionStore {
    pub(crate) fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn topic_log(&self, topic: &str) -> Arc<RwLock<TopicLog>> {
        let mut topics = self.topics.lock();
        if let Some(log) = topics.get(topic) {
            return Arc::clone(log);
        }
        Arc::clone(topics.entry(topic.to_owned()).or_default())
    }

    /// Exclusive access to `topic`'s log, for appending.
    pub(crate) async fn lock_for_append(&self, topic: &str) -> OwnedRwLockWriteGuard<TopicLog> {
        self.topic_log(topic).write_owned().await
    }

    /// Shared access to `topic`'s log, for replaying it oldest first.
    pub(crate) async fn lock_for_replay(&self, topic: &str) -> OwnedRwLockReadGuard<TopicLog> {
        self.topic_log(topic).read_owned().await
    }

    pub(crate) async fn len(&self, topic: &str) -> usize {
        let log = self.topics.lock().get(topic).cloned();
        match log {
            Some(log) => log.read().await.len(),
            None => 0,
        }
    }
}
