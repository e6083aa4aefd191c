use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound WebSocket events from client to server
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum WsInboundEvent {
    #[serde(rename = "chat:join")]
    JoinChat { chat_id: String },

    #[serde(rename = "chat:leave")]
    LeaveChat { chat_id: String },

    #[serde(rename = "typing:start")]
    TypingStart { chat_id: String },

    #[serde(rename = "typing:stop")]
    TypingStop { chat_id: String },
}

/// Outbound WebSocket events from server to client
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum WsOutboundEvent {
    #[serde(rename = "typing:start")]
    TypingStart { chat_id: String, user_id: Uuid },

    #[serde(rename = "typing:stop")]
    TypingStop { chat_id: String, user_id: Uuid },

    /// Broadcast whenever a user transitions online or offline. Delivery
    /// scoping (e.g. contacts only) is a policy of the surrounding system;
    /// clients filter.
    #[serde(rename = "user:online_status")]
    OnlineStatus {
        user_id: Uuid,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

impl WsOutboundEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"type\":\"error\"}".to_string())
    }
}

/// Room name for a chat, mirroring the wire-level event names.
pub fn chat_room(chat_id: &str) -> String {
    format!("chat:{}", chat_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_event_parses_tagged_json() {
        let evt: WsInboundEvent =
            serde_json::from_str(r#"{"type":"chat:join","chatId":"42"}"#).expect("parse");
        assert!(matches!(evt, WsInboundEvent::JoinChat { chat_id } if chat_id == "42"));
    }

    #[test]
    fn test_online_status_round_trips() {
        let payload = WsOutboundEvent::OnlineStatus {
            user_id: Uuid::new_v4(),
            is_online: false,
            last_seen: Some(Utc::now()),
        }
        .to_json();
        assert!(payload.contains("user:online_status"));
        assert!(payload.contains("\"isOnline\":false"));
    }
}
