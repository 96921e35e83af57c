// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-subscriber resend loop.
//!
//! One call delivers one logical message to one subscriber:
//!
//! 1. Make a fresh copy of the original, with a context scoped to this call.
//! 2. Push the copy into the subscriber queue, racing the send timeout and
//!    the shutdown signal.
//! 3. Wait for the copy's ack/nack, racing the shutdown signal.
//! 4. On nack (or a copy dropped unresolved), go back to 1. No backoff and no
//!    retry limit.
//!
//! Both selects are `biased` toward shutdown so a closed engine never pushes
//! another message into a queue.

use crate::error::Error;
use crate::message::{AckStatus, Message};
use crate::registry::RegisteredSubscriber;
use membus_config::SendTimeout;
use std::future;
use tokio_util::sync::CancellationToken;

/// How delivery to one subscriber ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The consumer acked a copy.
    Acked,
    /// The engine is shutting down; the message was dropped for this subscriber.
    Discarded,
    /// The consumer dropped its subscription.
    Departed,
}

pub(crate) async fn send_to_subscriber(
    topic: &str,
    msg: &Message,
    subscriber: &RegisteredSubscriber,
    send_timeout: SendTimeout,
    shutdown: &CancellationToken,
) -> Result<Delivery, Error> {
    let message_uuid = msg.uuid();
    let subscriber_uuid = subscriber.id;

    // Every context handed out below is cancelled when this call returns.
    let scope = shutdown.child_token();
    let _cancel_on_exit = scope.clone().drop_guard();

    loop {
        let mut msg_to_send = msg.copy();
        msg_to_send.set_context(scope.child_token());
        let mut ack = msg_to_send.watch();

        let deadline = async {
            match send_timeout.duration() {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                tracing::trace!(topic, message_uuid, %subscriber_uuid, "Closing, message discarded");
                return Ok(Delivery::Discarded);
            }
            sent = subscriber.sender.send_async(msg_to_send) => {
                if sent.is_err() {
                    tracing::debug!(topic, message_uuid, %subscriber_uuid, "Subscriber departed, message skipped");
                    return Ok(Delivery::Departed);
                }
                tracing::trace!(topic, message_uuid, %subscriber_uuid, "Sent message to subscriber");
            }
            () = deadline => {
                return Err(Error::SendTimeout {
                    topic: topic.to_owned(),
                    message_uuid: message_uuid.to_owned(),
                    subscriber: subscriber_uuid,
                    timeout: send_timeout.duration().unwrap_or_default(),
                });
            }
        }

        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                tracing::trace!(topic, message_uuid, %subscriber_uuid, "Closing, message discarded");
                return Ok(Delivery::Discarded);
            }
            status = ack.resolved() => match status {
                Some(AckStatus::Acked) => {
                    tracing::trace!(topic, message_uuid, %subscriber_uuid, "Message acked");
                    return Ok(Delivery::Acked);
                }
                Some(_) => {
                    tracing::trace!(topic, message_uuid, %subscriber_uuid, "Nack received, resending message");
                }
                None => {
                    tracing::debug!(topic, message_uuid, %subscriber_uuid, "Message dropped without ack, resending message");
                }
            }
        }
    }
}
