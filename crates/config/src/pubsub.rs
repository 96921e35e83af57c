// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Engine-wide pub/sub settings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-subscriber, per-attempt deadline for handing a message to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendTimeout {
    /// Wait for queue space for as long as it takes (or until shutdown).
    #[default]
    Disabled,
    /// Fail the publish when the subscriber does not accept the message in time.
    After(Duration),
}

impl SendTimeout {
    /// Builds a timeout from a millisecond count.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self::After(Duration::from_millis(millis))
    }

    /// Returns the deadline, or `None` when the timeout is disabled.
    #[must_use]
    pub const fn duration(&self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::After(duration) => Some(*duration),
        }
    }

    /// Returns `true` for the "no timeout" sentinel.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }
}

impl From<Option<Duration>> for SendTimeout {
    fn from(value: Option<Duration>) -> Self {
        value.map_or(Self::Disabled, Self::After)
    }
}

/// Settings recognized by the pub/sub engine.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PubSubConfig {
    /// Capacity of each subscriber's queue. `0` makes every hand-off a
    /// rendezvous with the consumer.
    #[serde(default = "default_output_buffer")]
    pub output_buffer: usize,
    /// Deadline for pushing one message copy into one subscriber queue.
    #[serde(
        default,
        rename = "send_timeout_ms",
        with = "send_timeout_ms",
        skip_serializing_if = "SendTimeout::is_disabled"
    )]
    #[schemars(with = "Option<u64>")]
    pub send_timeout: SendTimeout,
    /// Retain every published message and replay it to late subscribers.
    #[serde(default)]
    pub persistent: bool,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            output_buffer: default_output_buffer(),
            send_timeout: SendTimeout::Disabled,
            persistent: false,
        }
    }
}

impl PubSubConfig {
    /// Non-persistent settings with the given queue capacity and send timeout.
    #[must_use]
    pub fn new(output_buffer: usize, send_timeout: SendTimeout) -> Self {
        Self {
            output_buffer,
            send_timeout,
            persistent: false,
        }
    }

    /// Turns on retention and replay-on-subscribe.
    #[must_use]
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    /// Returns validation errors for these settings.
    #[must_use]
    pub fn validation_errors(&self, path_prefix: &str) -> Vec<String> {
        let mut errors = Vec::new();
        if self.send_timeout == SendTimeout::After(Duration::ZERO) {
            errors.push(format!(
                "{path_prefix}.send_timeout_ms must be greater than 0 (omit it to disable the timeout)"
            ));
        }
        errors
    }
}

const fn default_output_buffer() -> usize {
    0
}

mod send_timeout_ms {
    use super::SendTimeout;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(
        value: &SendTimeout,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value.duration() {
            Some(duration) => {
                serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
            }
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<SendTimeout, D::Error> {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis).into())
    }
}
