//! HMR wire protocol.
//!
//! Every frame on the channel is one JSON object discriminated by `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One `js-update` record inside an `update` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    /// Public path of the accepting boundary (owner module)
    pub path: String,
    /// Public path of the module that changed
    pub accepted_path: String,
    /// Milliseconds since the epoch, used to bust the import cache
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateKind {
    JsUpdate,
}

impl Update {
    pub fn js(path: impl Into<String>, accepted_path: impl Into<String>, timestamp: u64) -> Self {
        Self {
            kind: UpdateKind::JsUpdate,
            path: path.into(),
            accepted_path: accepted_path.into(),
            timestamp,
        }
    }
}

/// Server-side failure shown by the client overlay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HmrPayload {
    Connected,
    Update {
        updates: Vec<Update>,
    },
    Prune {
        paths: Vec<String>,
    },
    FullReload {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    Error {
        err: ErrorPayload,
    },
    Custom {
        event: String,
        #[serde(default)]
        data: Value,
    },
}

impl HmrPayload {
    /// Wire name of the payload, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            HmrPayload::Connected => "connected",
            HmrPayload::Update { .. } => "update",
            HmrPayload::Prune { .. } => "prune",
            HmrPayload::FullReload { .. } => "full-reload",
            HmrPayload::Error { .. } => "error",
            HmrPayload::Custom { .. } => "custom",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        HmrPayload::Error {
            err: ErrorPayload {
                message: message.into(),
                stack: None,
            },
        }
    }
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
