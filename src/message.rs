//! Control message protocol between the page and the worker.
//!
//! The page posts `{ "type": "<COMMAND>" }`; when it supplies a reply
//! channel the worker answers exactly once with `{ "success": true }` after
//! the command completes.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Cache invalidation commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Drop themed pages from the dynamic cache.
    ClearThemedCache,
    /// Drop everything under the data directory from the dynamic cache.
    ClearDataCache,
    /// Delete every cache this application owns.
    ClearAllCache,
}

impl ControlMessage {
    /// Parses a message payload. Payloads that are not a known command are
    /// not errors; they yield `None` and are ignored.
    #[must_use]
    pub fn parse(data: &serde_json::Value) -> Option<Self> {
        Self::deserialize(data).ok()
    }
}

/// Acknowledgment sent on the reply channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Whether the command completed.
    pub success: bool,
    /// Failure description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    /// Successful acknowledgment.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// Failed acknowledgment.
    #[must_use]
    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Reply channel for one acknowledgment.
pub type ReplyPort = oneshot::Sender<Ack>;

/// A message event delivered to the worker.
#[derive(Debug)]
pub struct MessageEvent {
    /// Arbitrary JSON payload.
    pub data: serde_json::Value,
    /// Where to send the acknowledgment, if anywhere.
    pub reply: Option<ReplyPort>,
}

impl MessageEvent {
    /// Creates an event without a reply channel.
    #[must_use]
    pub const fn new(data: serde_json::Value) -> Self {
        Self { data, reply: None }
    }

    /// Creates an event with a reply channel and returns the receiving end.
    #[must_use]
    pub fn with_reply(data: serde_json::Value) -> (Self, oneshot::Receiver<Ack>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                data,
                reply: Some(tx),
            },
            rx,
        )
    }
}
