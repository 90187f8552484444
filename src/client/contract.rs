//! Versioned command/response/event envelopes between surfaces and the
//! scheduling backend.

use serde::{Deserialize, Serialize};

/// Contract version for command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Commands understood by the scheduling backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "timer.ping")]
    TimerPing,
    #[serde(rename = "timer.version")]
    TimerVersion,
    #[serde(rename = "timer.schedule")]
    TimerSchedule,
    #[serde(rename = "timer.cancel")]
    TimerCancel,
    #[serde(rename = "preferences.get")]
    PreferencesGet,
    #[serde(rename = "preferences.set")]
    PreferencesSet,
    #[serde(rename = "snapshot.get")]
    SnapshotGet,
    #[serde(rename = "bridge.stop")]
    BridgeStop,
}

impl CommandName {
    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimerPing => "timer.ping",
            Self::TimerVersion => "timer.version",
            Self::TimerSchedule => "timer.schedule",
            Self::TimerCancel => "timer.cancel",
            Self::PreferencesGet => "preferences.get",
            Self::PreferencesSet => "preferences.set",
            Self::SnapshotGet => "snapshot.get",
            Self::BridgeStop => "bridge.stop",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "timer.ping" => Some(Self::TimerPing),
            "timer.version" => Some(Self::TimerVersion),
            "timer.schedule" => Some(Self::TimerSchedule),
            "timer.cancel" => Some(Self::TimerCancel),
            "preferences.get" => Some(Self::PreferencesGet),
            "preferences.set" => Some(Self::PreferencesSet),
            "snapshot.get" => Some(Self::SnapshotGet),
            "bridge.stop" => Some(Self::BridgeStop),
            _ => None,
        }
    }
}

/// Events broadcast by the command server.
pub mod events {
    pub const TASK_STARTED: &str = "timer.task_started";
    pub const TASK_CANCELLED: &str = "timer.task_cancelled";
    pub const TASK_COMPLETED: &str = "timer.task_completed";
    pub const PREFERENCES_UPDATED: &str = "preferences.updated";
}

/// A versioned response envelope from backend -> surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned command envelope from surface -> backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Build a v1 command envelope with a fresh random request id.
    #[must_use]
    pub fn with_fresh_id(command: CommandName, payload: serde_json::Value) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), command, payload)
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned event envelope from backend -> surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

/// Envelope validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}
