// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use crate::registry::SubscriberId;
use std::time::Duration;

/// Errors produced by pub/sub operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A subscriber did not accept a message copy within the send timeout.
    ///
    /// Fatal to the publish call that hit it: remaining subscribers and
    /// remaining messages of that call are not delivered.
    #[error(
        "sending message `{message_uuid}` to subscriber `{subscriber}` on topic `{topic}` timed out after {timeout:?}"
    )]
    SendTimeout {
        /// Topic the message was published on.
        topic: String,
        /// Producer-assigned message identifier.
        message_uuid: String,
        /// Subscriber whose queue stayed full.
        subscriber: SubscriberId,
        /// Configured per-attempt deadline.
        timeout: Duration,
    },
    /// Engine configuration is invalid.
    #[error("invalid pub/sub configuration: {reason}")]
    InvalidConfig {
        /// Validation error details.
        reason: String,
    },
}
