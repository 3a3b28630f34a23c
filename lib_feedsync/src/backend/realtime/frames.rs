//! Phoenix channel frames (`vsn=1.0.0` JSON serializer) as spoken by the
//! realtime server: outbound join, heartbeat and leave; inbound classification.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backend::{ChannelTopic, EdgeTable};
use crate::error::{BackendError, BackendResult};

/// Topic of the socket-level heartbeat.
pub const HEARTBEAT_TOPIC: &str = "phoenix";

const SCHEMA: &str = "public";

/// One message on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixFrame {
    pub fn parse(text: &str) -> BackendResult<Self> {
        serde_json::from_str(text).map_err(|e| BackendError::Channel(format!("Bad frame: {}", e)))
    }

    pub fn to_text(&self) -> BackendResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Joins `topic`, asking for row changes on each of its tables.
pub fn join_frame(topic: &ChannelTopic, access_token: Option<&str>, reference: &str) -> PhoenixFrame {
    let changes: Vec<Value> = topic
        .tables
        .iter()
        .map(|t| json!({ "event": "*", "schema": SCHEMA, "table": t.table_name() }))
        .collect();

    let mut payload = json!({
        "config": {
            "broadcast": { "ack": false, "self": false },
            "presence": { "key": "" },
            "postgres_changes": changes,
            "private": false
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }

    PhoenixFrame {
        topic: topic.name(),
        event: "phx_join".to_string(),
        payload,
        reference: Some(reference.to_string()),
    }
}

pub fn heartbeat_frame(reference: &str) -> PhoenixFrame {
    PhoenixFrame {
        topic: HEARTBEAT_TOPIC.to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

pub fn leave_frame(topic: &ChannelTopic, reference: &str) -> PhoenixFrame {
    PhoenixFrame {
        topic: topic.name(),
        event: "phx_leave".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

/// What an inbound frame means for a channel joined on `topic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// The server accepted the join sent with this ref.
    Joined { reference: Option<String> },
    /// The server refused the join or the change subscription.
    Rejected(String),
    /// A row changed on one of the subscribed tables.
    Change(Option<EdgeTable>),
    HeartbeatAck,
    /// The server closed or crashed the channel.
    Closed(String),
    /// Presence, broadcast, other topics, replies to our own leave.
    Ignored,
}

fn reason(payload: &Value) -> String {
    payload
        .pointer("/response/reason")
        .or_else(|| payload.get("message"))
        .or_else(|| payload.get("reason"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string())
}

pub fn classify(frame: &PhoenixFrame, topic: &str) -> Inbound {
    if frame.topic == HEARTBEAT_TOPIC {
        return match frame.event.as_str() {
            "phx_reply" => Inbound::HeartbeatAck,
            _ => Inbound::Ignored,
        };
    }
    if frame.topic != topic {
        return Inbound::Ignored;
    }

    match frame.event.as_str() {
        "postgres_changes" => {
            let table = frame
                .payload
                .pointer("/data/table")
                .and_then(Value::as_str)
                .and_then(EdgeTable::from_table_name);
            Inbound::Change(table)
        }
        "phx_reply" => match frame.payload.get("status").and_then(Value::as_str) {
            Some("ok") => Inbound::Joined {
                reference: frame.reference.clone(),
            },
            _ => Inbound::Rejected(reason(&frame.payload)),
        },
        "system" => match frame.payload.get("status").and_then(Value::as_str) {
            Some("error") => Inbound::Rejected(reason(&frame.payload)),
            _ => Inbound::Ignored,
        },
        "phx_error" => Inbound::Closed("channel crashed on the server".to_string()),
        "phx_close" => Inbound::Closed("channel closed by the server".to_string()),
        _ => Inbound::Ignored,
    }
}
