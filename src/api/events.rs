use serde::{Deserialize, Serialize};

use crate::api::models::{ClientField, Message};

/// Wire envelope of every socket frame, in both directions.
#[derive(Debug, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTeammate {
    pub email: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeammatePresence {
    pub email: String,
    pub is_online: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub client_id: String,
    pub message: Message,
    #[serde(default)]
    pub avatar_name: String,
    #[serde(default)]
    pub avatar_color: String,
}

/// Server-pushed events the client reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    SetActiveTeammateStatus(ActiveTeammate),
    UpdateTeammateOnlineStatus(TeammatePresence),
    AddIncomingMessage(IncomingMessage),
    MsgToClient(serde_json::Value),
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown event {0}")]
    Unknown(String),
}

impl LiveEvent {
    pub fn parse(text: &str) -> Result<Self, EventError> {
        let envelope: IncomingEvent = serde_json::from_str(text)?;
        let data = envelope.data;
        let event = match envelope.event_type.as_str() {
            "setActiveTeammateStatus" => LiveEvent::SetActiveTeammateStatus(serde_json::from_value(data)?),
            "updateTeammateOnlineStatus" => LiveEvent::UpdateTeammateOnlineStatus(serde_json::from_value(data)?),
            "addIncomingMessage" => LiveEvent::AddIncomingMessage(serde_json::from_value(data)?),
            "msgToClient" => LiveEvent::MsgToClient(data),
            other => return Err(EventError::Unknown(other.to_string())),
        };
        Ok(event)
    }
}

/// Field edit mirrored to other operators after it was confirmed remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEdit {
    pub client_id: String,
    pub field: ClientField,
    pub value: String,
}

impl FieldEdit {
    /// `{"clientId": .., "<field>": value}`, with `isBlocked` sent as a boolean.
    pub fn to_value(&self) -> serde_json::Value {
        let value = match self.field {
            ClientField::IsBlocked => serde_json::Value::Bool(self.value == "true"),
            _ => serde_json::Value::String(self.value.clone()),
        };
        let mut map = serde_json::Map::new();
        map.insert("clientId".to_string(), serde_json::Value::String(self.client_id.clone()));
        map.insert(self.field.as_str().to_string(), value);
        serde_json::Value::Object(map)
    }
}

/// Events this client pushes to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingEvent {
    JoinRoom(String),
    UpdateIncomingMessage(FieldEdit),
    UpdateSelectedClient(FieldEdit),
}

impl OutgoingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutgoingEvent::JoinRoom(_) => "joinRoom",
            OutgoingEvent::UpdateIncomingMessage(_) => "updateIncomingMessage",
            OutgoingEvent::UpdateSelectedClient(_) => "updateSelectedClient",
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        let data = match self {
            OutgoingEvent::JoinRoom(project_id) => serde_json::Value::String(project_id.clone()),
            OutgoingEvent::UpdateIncomingMessage(edit) | OutgoingEvent::UpdateSelectedClient(edit) => edit.to_value(),
        };
        serde_json::to_string(&IncomingEvent {
            event_type: self.name().to_string(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_presence_event() {
        let frame = r#"{"event_type":"updateTeammateOnlineStatus","data":{"email":"a@x.com","isOnline":true}}"#;
        assert_eq!(
            LiveEvent::parse(frame).unwrap(),
            LiveEvent::UpdateTeammateOnlineStatus(TeammatePresence { email: "a@x.com".into(), is_online: true })
        );
    }

    #[test]
    fn parses_incoming_message() {
        let frame = r#"{"event_type":"addIncomingMessage","data":{
            "clientId":"c9","avatarName":"Owl","avatarColor":"Blue",
            "message":{"username":"client","message":"help","timestamp":5}}}"#;
        let LiveEvent::AddIncomingMessage(incoming) = LiveEvent::parse(frame).unwrap() else {
            panic!("expected incoming message");
        };
        assert_eq!(incoming.client_id, "c9");
        assert_eq!(incoming.message.body, "help");
    }

    #[test]
    fn rejects_unknown_and_malformed_frames() {
        assert!(matches!(
            LiveEvent::parse(r#"{"event_type":"typing","data":{}}"#),
            Err(EventError::Unknown(name)) if name == "typing"
        ));
        assert!(matches!(LiveEvent::parse("not json"), Err(EventError::Malformed(_))));
    }

    #[test]
    fn join_room_frame() {
        let frame = OutgoingEvent::JoinRoom("p1".into()).to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, serde_json::json!({ "event_type": "joinRoom", "data": "p1" }));
    }

    #[test]
    fn field_edit_uses_field_name_as_key() {
        let edit = FieldEdit { client_id: "c1".into(), field: ClientField::IsBlocked, value: "true".into() };
        assert_eq!(edit.to_value(), serde_json::json!({ "clientId": "c1", "isBlocked": true }));
    }
}
