//! Message type namespace for bridge requests.
//!
//! Every request carries a `namespace:action` tag. The set known at
//! compile time is a sum type so the built-in operations are matched
//! exhaustively; `Custom` covers types registered dynamically at worker
//! startup.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing a wire message-type string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageTypeError {
    /// The string is not of the form `namespace:action`.
    #[error("malformed message type {value:?}: expected \"namespace:action\"")]
    Malformed { value: String },
}

/// The `namespace:action` tag identifying a request's operation.
///
/// Known operations are variants; anything else registered at runtime
/// travels as `Custom`. The wire form is always the plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `core:initialize`: the bootstrap request, and the only type the
    /// worker accepts before its lifecycle reaches `ready` (besides
    /// status polling).
    CoreInitialize,
    /// `core:getStatus`: lifecycle snapshot, pollable in every phase.
    CoreGetStatus,
    /// `chat:getMessages`
    ChatGetMessages,
    /// `chat:sendMessage`
    ChatSendMessage,
    /// `ai:chat`
    AiChat,
    /// `storage:getQuota`
    StorageGetQuota,
    /// `storage:requestPersistent`
    StorageRequestPersistent,
    /// `storage:cleanup`: destructive reclamation, performed by the
    /// storage engine, not by the quota monitor.
    StorageCleanup,
    /// A dynamically registered type, validated to the
    /// `namespace:action` shape at parse time.
    Custom(String),
}

impl MessageType {
    /// The wire string for this type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CoreInitialize => "core:initialize",
            Self::CoreGetStatus => "core:getStatus",
            Self::ChatGetMessages => "chat:getMessages",
            Self::ChatSendMessage => "chat:sendMessage",
            Self::AiChat => "ai:chat",
            Self::StorageGetQuota => "storage:getQuota",
            Self::StorageRequestPersistent => "storage:requestPersistent",
            Self::StorageCleanup => "storage:cleanup",
            Self::Custom(s) => s,
        }
    }

    /// The namespace half of the tag.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.as_str().split(':').next().unwrap_or_default()
    }

    /// The action half of the tag.
    #[must_use]
    pub fn action(&self) -> &str {
        self.as_str().split(':').nth(1).unwrap_or_default()
    }

    /// Whether this type bypasses the initialization gate.
    ///
    /// `core:initialize` must pass so the worker can be bootstrapped at
    /// all; `core:getStatus` must pass so callers can poll progress in
    /// every phase.
    #[must_use]
    pub fn is_gate_exempt(&self) -> bool {
        matches!(self, Self::CoreInitialize | Self::CoreGetStatus)
    }

    /// Build a custom type, validating the `namespace:action` shape.
    pub fn custom(value: impl Into<String>) -> Result<Self, MessageTypeError> {
        value.into().parse()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = MessageTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core:initialize" => Ok(Self::CoreInitialize),
            "core:getStatus" => Ok(Self::CoreGetStatus),
            "chat:getMessages" => Ok(Self::ChatGetMessages),
            "chat:sendMessage" => Ok(Self::ChatSendMessage),
            "ai:chat" => Ok(Self::AiChat),
            "storage:getQuota" => Ok(Self::StorageGetQuota),
            "storage:requestPersistent" => Ok(Self::StorageRequestPersistent),
            "storage:cleanup" => Ok(Self::StorageCleanup),
            other => {
                let mut parts = other.splitn(2, ':');
                let namespace = parts.next().unwrap_or_default();
                let action = parts.next().unwrap_or_default();
                if namespace.is_empty() || action.is_empty() {
                    return Err(MessageTypeError::Malformed {
                        value: other.to_string(),
                    });
                }
                Ok(Self::Custom(other.to_string()))
            }
        }
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
