use serde::{Deserialize, Serialize};

/// Author tag the service puts on messages written by the client.
pub const CLIENT_AUTHOR: &str = "client";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Teammate {
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub is_online: bool,
}

/// Partial teammate update keyed by the email the record currently has.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TeammatePatch {
    pub old_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessagesStatus {
    #[default]
    Unread,
    Opened,
    Closed,
}

impl MessagesStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagesStatus::Unread => "unread",
            MessagesStatus::Opened => "opened",
            MessagesStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "username")]
    pub author: String,
    #[serde(rename = "message", default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Message {
    pub fn is_from_client(&self) -> bool {
        self.author == CLIENT_AUTHOR
    }
}

fn default_channel() -> String {
    "chat".to_string()
}

/// A client's support thread as it appears in the inbox list.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub client_id: String,
    /// Teammate email, empty when unassigned.
    #[serde(default)]
    pub assigned_to: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub messages_history: Vec<Message>,
    #[serde(default)]
    pub avatar_name: String,
    #[serde(default)]
    pub avatar_color: String,
    #[serde(default)]
    pub messages_status: MessagesStatus,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default = "default_channel")]
    pub channel: String,
}

impl Conversation {
    /// A fresh unassigned, unread conversation seeded with its first message.
    pub fn incoming(client_id: &str, message: Message, avatar_name: &str, avatar_color: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            assigned_to: String::new(),
            phone: String::new(),
            email: String::new(),
            messages_history: vec![message],
            avatar_name: avatar_name.to_string(),
            avatar_color: avatar_color.to_string(),
            messages_status: MessagesStatus::Unread,
            is_blocked: false,
            channel: default_channel(),
        }
    }

    pub fn is_assigned(&self) -> bool {
        !self.assigned_to.is_empty()
    }
}

/// Partial conversation update. `assigned_to: Some("")` unassigns.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages_status: Option<MessagesStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_blocked: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(rename = "changeInFieldValue")]
    pub changed_field: String,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// The conversation open in the detail view.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelectedClient {
    #[serde(flatten)]
    pub conversation: Conversation,
    #[serde(default)]
    pub changes_history: Vec<ChangeRecord>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl From<Conversation> for SelectedClient {
    fn from(conversation: Conversation) -> Self {
        Self {
            conversation,
            changes_history: Vec::new(),
            notes: Vec::new(),
        }
    }
}

/// Partial update of the focused client. `changes_history` and `notes`
/// replace their collections wholesale.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SelectedClientPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages_status: Option<MessagesStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_blocked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes_history: Option<Vec<ChangeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<Note>>,
}

/// Detail payload returned when a conversation is opened.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientDetail {
    #[serde(default)]
    pub changes_history: Vec<ChangeRecord>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchTag {
    #[default]
    Text,
    Username,
    Email,
    Phone,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct SearchBy {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub tag: SearchTag,
}

pub const ALL: &str = "all";

fn all() -> String {
    ALL.to_string()
}

/// Inbox search criteria. `"all"` disables a criterion.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    #[serde(default = "all")]
    pub status: String,
    #[serde(default = "all")]
    pub channel: String,
    #[serde(default = "all")]
    pub assigned: String,
    #[serde(default)]
    pub search_by: SearchBy,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            status: all(),
            channel: all(),
            assigned: all(),
            search_by: SearchBy::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub client_id: String,
    pub project_id: String,
    pub messages_status: MessagesStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

/// An operator edit of one client field.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientUpdate {
    pub client_id: String,
    pub project_id: String,
    pub updated_by: String,
    #[serde(rename = "changeInFieldValue")]
    pub field: ClientField,
    pub value: String,
}

/// Client fields an operator can edit; edits are logged to the change history.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ClientField {
    Phone,
    Email,
    AvatarName,
    IsBlocked,
}

impl ClientField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientField::Phone => "phone",
            ClientField::Email => "email",
            ClientField::AvatarName => "avatarName",
            ClientField::IsBlocked => "isBlocked",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InboxEntry {
    pub client_id: String,
    pub project_id: String,
    pub message: Message,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NoteRequest {
    pub client_id: String,
    pub project_id: String,
    pub note: Note,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NoteRef {
    pub client_id: String,
    pub project_id: String,
    pub note_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRef {
    pub client_id: String,
    pub project_id: String,
}

/// Moves every conversation assigned to `from_email` onto `to_email`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemapRequest {
    pub project_id: String,
    pub from_email: String,
    pub to_email: String,
}
