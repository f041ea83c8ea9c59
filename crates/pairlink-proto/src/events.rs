//! Event envelope and payload types.
//!
//! Field spellings follow the JSON the browser clients emit and expect
//! (`userId`, `firstName`, `callerName`, `roomID`, `first_name`), so the
//! serde renames here are part of the wire contract.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Events received from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Announce identity; creates the presence entry for this connection.
    Init(Init),
    /// Chat message, relayed verbatim to every connection.
    Message(serde_json::Value),
    /// Typing indicator, relayed to every connection but the sender.
    Typing(Typing),
    /// Direct call invite, relayed to the invited user only.
    VideoCallInvite(CallInvite),
    /// Direct call rejection, relayed to the original caller only.
    VideoCallReject(CallReject),
    /// Join the anonymous-call matchmaking queue.
    RandomCallWaiting(RandomCallWaiting),
    /// Leave the current anonymous call room.
    LeaveRandomCall,
}

/// Events sent to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Full presence list, broadcast after every change.
    #[serde(rename = "onlineUsers")]
    OnlineUsers(Vec<OnlineUser>),
    /// Chat message broadcast.
    Message(serde_json::Value),
    /// Typing indicator.
    Typing(Typing),
    /// Relayed call invite.
    VideoCallInvite(CallInvite),
    /// Relayed call rejection.
    VideoCallReject(CallReject),
    /// Anonymous pairing result, unicast to each matched connection.
    RandomCallMatch(RandomCallMatch),
}

/// `init` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Init {
    /// Client-supplied user identifier. Not verified by the relay.
    pub user_id: String,
    /// Display name; absent means "use the user id".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
}

/// `typing` payload, relayed with exactly these two fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Typing {
    /// User id of the typist.
    pub from: String,
    /// User id of the conversation partner.
    pub to: String,
}

/// `video-call-invite` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInvite {
    /// User id of the invitee.
    pub to: String,
    /// User id of the caller.
    pub from: String,
    /// Media room the callee should join.
    #[serde(rename = "roomID")]
    pub room_id: String,
    /// Caller display name, shown in the ring dialog.
    pub caller_name: String,
}

/// `video-call-reject` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReject {
    /// User id of the original caller, who receives this event.
    pub to: String,
    /// User id of the rejecting callee.
    pub from: String,
    /// Media room of the declined call.
    #[serde(rename = "roomID")]
    pub room_id: String,
}

/// `random-call-waiting` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomCallWaiting {
    /// Client-supplied user identifier.
    pub user_id: String,
    /// Display name of the waiting user.
    pub name: String,
}

/// `random-call-match` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomCallMatch {
    /// Room both matched peers join on the media transport.
    #[serde(rename = "roomID")]
    pub room_id: String,
}

/// One entry of the `onlineUsers` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    /// User identifier.
    pub id: String,
    /// Display name.
    pub first_name: String,
}

impl ClientEvent {
    /// Decode a client event from the text of one WebSocket frame.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    /// Encode this event as envelope JSON (used by test clients).
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

impl ServerEvent {
    /// Encode this event as envelope JSON for one WebSocket text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decode a server event (used by test clients).
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decode_init_with_first_name() {
        let event = ClientEvent::from_json(
            r#"{"event":"init","data":{"userId":"u-1","firstName":"Alice"}}"#,
        )
        .unwrap();

        assert_eq!(
            event,
            ClientEvent::Init(Init {
                user_id: "u-1".to_string(),
                first_name: Some("Alice".to_string()),
            })
        );
    }

    #[test]
    fn decode_init_without_first_name() {
        let event =
            ClientEvent::from_json(r#"{"event":"init","data":{"userId":"u-1"}}"#).unwrap();

        assert_eq!(
            event,
            ClientEvent::Init(Init { user_id: "u-1".to_string(), first_name: None })
        );
    }

    #[test]
    fn decode_init_missing_user_id_fails() {
        let result = ClientEvent::from_json(r#"{"event":"init","data":{"firstName":"Alice"}}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn decode_unknown_event_fails() {
        let result = ClientEvent::from_json(r#"{"event":"teleport","data":{}}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn decode_non_json_fails() {
        assert!(ClientEvent::from_json("not json").is_err());
    }

    #[test]
    fn message_payload_is_opaque() {
        let event = ClientEvent::from_json(
            r#"{"event":"message","data":{"text":"hi","sender":"u-1","extra":[1,2]}}"#,
        )
        .unwrap();

        let ClientEvent::Message(payload) = event else {
            panic!("expected message event");
        };
        assert_eq!(payload, json!({"text": "hi", "sender": "u-1", "extra": [1, 2]}));
    }

    #[test]
    fn decode_leave_random_call_without_data() {
        let event = ClientEvent::from_json(r#"{"event":"leave-random-call"}"#).unwrap();
        assert_eq!(event, ClientEvent::LeaveRandomCall);
    }

    #[test]
    fn call_invite_round_trip_preserves_field_spelling() {
        let invite = CallInvite {
            to: "callee".to_string(),
            from: "caller".to_string(),
            room_id: "room-7".to_string(),
            caller_name: "Caller".to_string(),
        };

        let text = ClientEvent::VideoCallInvite(invite.clone()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "video-call-invite");
        assert_eq!(value["data"]["roomID"], "room-7");
        assert_eq!(value["data"]["callerName"], "Caller");

        assert_eq!(ClientEvent::from_json(&text).unwrap(), ClientEvent::VideoCallInvite(invite));
    }

    #[test]
    fn online_users_envelope_spelling() {
        let event = ServerEvent::OnlineUsers(vec![OnlineUser {
            id: "u-1".to_string(),
            first_name: "Alice".to_string(),
        }]);

        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["event"], "onlineUsers");
        assert_eq!(value["data"][0]["id"], "u-1");
        assert_eq!(value["data"][0]["first_name"], "Alice");
    }

    #[test]
    fn random_call_match_round_trip() {
        let event =
            ServerEvent::RandomCallMatch(RandomCallMatch { room_id: "call-abc123".to_string() });

        let text = event.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "random-call-match");
        assert_eq!(value["data"]["roomID"], "call-abc123");

        assert_eq!(ServerEvent::from_json(&text).unwrap(), event);
    }

    #[test]
    fn typing_round_trip() {
        let typing = Typing { from: "u-1".to_string(), to: "u-2".to_string() };
        let text = ClientEvent::Typing(typing.clone()).to_json().unwrap();
        assert_eq!(ClientEvent::from_json(&text).unwrap(), ClientEvent::Typing(typing));
    }
}
