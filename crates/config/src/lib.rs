// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration model for the membus pub/sub engine.
//!
//! Types here are plain data: they deserialize from YAML/JSON, describe
//! themselves through `schemars`, and report problems through
//! `validation_errors()` instead of failing on the first one. The engine
//! decides what to do with those errors at construction time.

pub mod pubsub;

pub use pubsub::{PubSubConfig, SendTimeout};
