//! Audit log events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of audit event.
///
/// The serialized names are the wire contract with the backend and predate
/// this agent; they cannot be renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Token plugged in and session flow started.
    #[serde(rename = "conexión")]
    Connect,
    /// Token removed after an orderly session end.
    #[serde(rename = "desconexión")]
    Disconnect,
    /// Synthesized: a second Connect arrived with no Disconnect between.
    #[serde(rename = "desconexión_no_registrada")]
    UnregisteredDisconnect,
    /// Synthesized: a second Disconnect arrived with no Connect between.
    #[serde(rename = "evento_desconocido")]
    UnknownEvent,
    /// Backend rejected a login attempt.
    #[serde(rename = "login_fallido")]
    LoginFail,
    /// Operator ended the session.
    #[serde(rename = "logout")]
    Logout,
}

/// One immutable audit event. Identity is `event_id`, which the backend
/// uses to de-duplicate resent batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub event_id: Uuid,
    pub user_id: String,
    pub device_serial: String,
    pub event_type: EventType,
    pub ip: String,
    pub mac: String,
    pub timestamp_utc: DateTime<Utc>,
}

impl LogEvent {
    /// Build a fresh event stamped with a new UUID and the current time.
    pub fn new(
        user_id: impl Into<String>,
        device_serial: impl Into<String>,
        event_type: EventType,
        ip: impl Into<String>,
        mac: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            user_id: user_id.into(),
            device_serial: device_serial.into(),
            event_type,
            ip: ip.into(),
            mac: mac.into(),
            timestamp_utc: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&EventType::Connect).unwrap(),
            "\"conexión\""
        );
        assert_eq!(
            serde_json::to_string(&EventType::UnregisteredDisconnect).unwrap(),
            "\"desconexión_no_registrada\""
        );
        assert_eq!(
            serde_json::to_string(&EventType::UnknownEvent).unwrap(),
            "\"evento_desconocido\""
        );
    }

    #[test]
    fn event_serializes_camel_case() {
        let event = LogEvent::new("user-1", "ABC123", EventType::Connect, "10.0.0.5", "AA:BB");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"eventId\""));
        assert!(json.contains("\"deviceSerial\":\"ABC123\""));
        assert!(json.contains("\"timestampUtc\""));
    }

    #[test]
    fn event_json_roundtrip() {
        let event = LogEvent::new("user-1", "ABC123", EventType::Logout, "10.0.0.5", "AA:BB");
        let json = serde_json::to_string(&event).unwrap();
        let back: LogEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
