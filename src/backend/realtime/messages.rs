//! Realtime Message Types
//!
//! Wire format of the realtime channel. Every frame, in either direction,
//! is one JSON object `{topic, event, payload, ref}` (Phoenix channels).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backend::{BackendError, BackendResult, ChangeEvent, ChangeFilter, ChangeKind};

/// Topic used for socket-level heartbeats
pub const HEARTBEAT_TOPIC: &str = "phoenix";

/// One channel frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixMessage {
    /// Join a channel with a postgres-changes listener
    pub fn join(
        topic: &str,
        filter: &ChangeFilter,
        access_token: Option<&str>,
        reference: &str,
    ) -> Self {
        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": filter.events.as_str(),
                    "schema": filter.schema,
                    "table": filter.table,
                }],
            },
        });

        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }

        Self {
            topic: topic.to_string(),
            event: "phx_join".to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    /// Leave a channel
    pub fn leave(topic: &str, reference: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    /// Keep the socket alive
    pub fn heartbeat(reference: &str) -> Self {
        Self {
            topic: HEARTBEAT_TOPIC.to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Reply to a join, leave or heartbeat
    Reply {
        topic: String,
        reference: Option<String>,
        ok: bool,
        response: Value,
    },
    /// A row changed
    Change(ChangeEvent),
    /// Server status for the channel (e.g. subscription confirmed or failed)
    System { status: String, message: String },
    /// The channel crashed on the server
    ChannelError { topic: String },
    /// The channel was closed by the server
    ChannelClosed { topic: String },
    /// Anything else (presence, broadcast, ...)
    Other { event: String },
}

#[derive(Deserialize)]
struct ReplyPayload {
    status: String,
    #[serde(default)]
    response: Value,
}

#[derive(Deserialize)]
struct ChangesPayload {
    data: ChangeData,
}

#[derive(Deserialize)]
struct ChangeData {
    schema: String,
    table: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    commit_timestamp: Option<String>,
}

#[derive(Deserialize)]
struct SystemPayload {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

impl InboundMessage {
    /// Decode a text frame
    pub fn decode(text: &str) -> BackendResult<Self> {
        let frame: PhoenixMessage = serde_json::from_str(text)?;

        let message = match frame.event.as_str() {
            "phx_reply" => {
                let reply: ReplyPayload = serde_json::from_value(frame.payload)?;
                InboundMessage::Reply {
                    topic: frame.topic,
                    reference: frame.reference,
                    ok: reply.status == "ok",
                    response: reply.response,
                }
            }
            "postgres_changes" => {
                let changes: ChangesPayload = serde_json::from_value(frame.payload)?;
                let kind = ChangeKind::parse(&changes.data.kind).ok_or_else(|| {
                    BackendError::Decode(format!("unknown change type {}", changes.data.kind))
                })?;

                InboundMessage::Change(ChangeEvent {
                    kind,
                    schema: changes.data.schema,
                    table: changes.data.table,
                    commit_timestamp: changes.data.commit_timestamp,
                })
            }
            "system" => {
                let system: SystemPayload = serde_json::from_value(frame.payload)?;
                InboundMessage::System {
                    status: system.status,
                    message: system.message,
                }
            }
            "phx_error" => InboundMessage::ChannelError { topic: frame.topic },
            "phx_close" => InboundMessage::ChannelClosed { topic: frame.topic },
            _ => InboundMessage::Other { event: frame.event },
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_frame() {
        let filter = ChangeFilter::all_rows("public", "bookmarks");
        let msg = PhoenixMessage::join("realtime:bookmarks-channel", &filter, Some("jwt"), "1");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["topic"], "realtime:bookmarks-channel");
        assert_eq!(json["event"], "phx_join");
        assert_eq!(json["ref"], "1");
        assert_eq!(json["payload"]["access_token"], "jwt");

        let listener = &json["payload"]["config"]["postgres_changes"][0];
        assert_eq!(listener["event"], "*");
        assert_eq!(listener["schema"], "public");
        assert_eq!(listener["table"], "bookmarks");
    }

    #[test]
    fn test_join_without_token() {
        let filter = ChangeFilter::all_rows("public", "bookmarks");
        let msg = PhoenixMessage::join("realtime:x", &filter, None, "1");
        assert!(msg.payload.get("access_token").is_none());
    }

    #[test]
    fn test_heartbeat_frame() {
        let json = serde_json::to_string(&PhoenixMessage::heartbeat("7")).unwrap();
        assert!(json.contains("\"topic\":\"phoenix\""));
        assert!(json.contains("\"event\":\"heartbeat\""));
        assert!(json.contains("\"ref\":\"7\""));
    }

    #[test]
    fn test_decode_join_reply() {
        let text = r#"{"topic":"realtime:bookmarks-channel","event":"phx_reply","payload":{"status":"ok","response":{"postgres_changes":[{"id":123,"event":"*","schema":"public","table":"bookmarks"}]}},"ref":"1"}"#;

        match InboundMessage::decode(text).unwrap() {
            InboundMessage::Reply {
                reference, ok, response, ..
            } => {
                assert_eq!(reference.as_deref(), Some("1"));
                assert!(ok);
                assert_eq!(response["postgres_changes"][0]["id"], 123);
            }
            other => panic!("Expected Reply, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_reply() {
        let text = r#"{"topic":"realtime:x","event":"phx_reply","payload":{"status":"error","response":{"reason":"unauthorized"}},"ref":"1"}"#;
        assert!(matches!(
            InboundMessage::decode(text).unwrap(),
            InboundMessage::Reply { ok: false, .. }
        ));
    }

    #[test]
    fn test_decode_postgres_change() {
        let text = r#"{"topic":"realtime:bookmarks-channel","event":"postgres_changes","payload":{"ids":[123],"data":{"schema":"public","table":"bookmarks","commit_timestamp":"2024-01-01T00:00:00Z","type":"DELETE","old_record":{"id":"b1"},"columns":[],"errors":null}},"ref":null}"#;

        match InboundMessage::decode(text).unwrap() {
            InboundMessage::Change(event) => {
                assert_eq!(event.kind, ChangeKind::Delete);
                assert_eq!(event.table, "bookmarks");
                assert_eq!(event.schema, "public");
                assert_eq!(event.commit_timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
            }
            other => panic!("Expected Change, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_change_type() {
        let text = r#"{"topic":"t","event":"postgres_changes","payload":{"data":{"schema":"public","table":"bookmarks","type":"TRUNCATE"}},"ref":null}"#;
        assert!(matches!(
            InboundMessage::decode(text),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_control_frames() {
        let error = r#"{"topic":"realtime:x","event":"phx_error","payload":{},"ref":null}"#;
        assert!(matches!(
            InboundMessage::decode(error).unwrap(),
            InboundMessage::ChannelError { .. }
        ));

        let system = r#"{"topic":"realtime:x","event":"system","payload":{"status":"ok","message":"Subscribed to PostgreSQL","extension":"postgres_changes"},"ref":null}"#;
        assert_eq!(
            InboundMessage::decode(system).unwrap(),
            InboundMessage::System {
                status: "ok".to_string(),
                message: "Subscribed to PostgreSQL".to_string()
            }
        );

        let presence = r#"{"topic":"realtime:x","event":"presence_state","payload":{}}"#;
        assert!(matches!(
            InboundMessage::decode(presence).unwrap(),
            InboundMessage::Other { .. }
        ));
    }
}
