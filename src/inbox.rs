//! The top-level context: owns the store, the coordinator and the live
//! connection, and runs the operator flows that combine them.
//!
//! Requests issued here are tied to the inbox's lifetime token; selecting a
//! different client also cancels the previous client's detail fetch, so a
//! slow reply for a client the operator already left is never applied.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::api::client::RemoteApi;
use crate::api::events::{FieldEdit, OutgoingEvent};
use crate::api::models::{
    ClientField, ClientUpdate, Conversation, ConversationPatch, ConversationRef, Filters, InboxEntry, Message,
    MessagesStatus, Note, NoteRef, NoteRequest, RemapRequest, SelectedClient, SelectedClientPatch, StatusChange,
};
use crate::app::AppState;
use crate::effects::{Coordinator, Outcome, Request};
use crate::error::InboxError;
use crate::live::LiveHandle;
use crate::storage::Cache;
use crate::store::{Command, InboxState, Store};
use crate::utils::now_millis;

pub struct Inbox {
    store: Store,
    coordinator: Coordinator,
    live: Option<LiveHandle>,
    project_id: String,
    operator_email: String,
    lifetime: CancellationToken,
    selection: Mutex<CancellationToken>,
}

impl Inbox {
    pub fn new(api: Arc<dyn RemoteApi>, config: &AppState) -> Self {
        let store = Store::new(InboxState::with_policy(config.closed_conversation_policy));
        let lifetime = CancellationToken::new();
        Self {
            coordinator: Coordinator::new(api, store.clone()),
            store,
            live: None,
            project_id: config.project_id.clone(),
            operator_email: config.operator_email.clone(),
            selection: Mutex::new(lifetime.child_token()),
            lifetime,
        }
    }

    pub fn attach_live(&mut self, live: LiveHandle) {
        self.live = Some(live);
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn snapshot(&self) -> Arc<InboxState> {
        self.store.snapshot()
    }

    async fn run(&self, request: Request) -> Result<Outcome, InboxError> {
        self.coordinator
            .dispatch_with(request, self.lifetime.child_token())
            .wait()
            .await
    }

    fn emit(&self, event: OutgoingEvent) {
        if let Some(live) = &self.live {
            if !live.emit(event) {
                log::warn!("socket bridge is down, dropped outgoing event");
            }
        }
    }

    /// Seeds the conversation list from the local cache. Returns how many were loaded.
    pub fn hydrate_from_cache(&self, cache: &Cache) -> Result<usize, InboxError> {
        let cached = cache.conversations(Some(200))?;
        let count = cached.len();
        if count > 0 {
            self.store.dispatch(Command::SetConversations(cached));
        }
        Ok(count)
    }

    pub async fn fetch_conversations(&self, filters: Filters) -> Result<Vec<Conversation>, InboxError> {
        self.store.dispatch(Command::SetFilters(filters.clone()));
        let request = Request::FetchConversations { project_id: self.project_id.clone(), filters };
        self.run(request).await?.into_conversations()
    }

    /// Focuses a conversation from the list and hydrates its history and notes.
    pub async fn select_client(&self, client_id: &str) -> Result<(), InboxError> {
        let state = self.store.snapshot();
        if state.selected_client_id() == Some(client_id) {
            return Ok(());
        }
        let conversation = state.conversation(client_id).cloned().ok_or(InboxError::NotSelected)?;
        let token = {
            let mut current = self.selection.lock().unwrap_or_else(|e| e.into_inner());
            current.cancel();
            *current = self.lifetime.child_token();
            current.clone()
        };
        self.store.dispatch(Command::SelectClient(SelectedClient::from(conversation)));

        let request = Request::FetchClientDetail {
            project_id: self.project_id.clone(),
            client_id: client_id.to_string(),
        };
        let detail = self.coordinator.dispatch_with(request, token).wait().await?.into_client_detail()?;
        self.store.dispatch(Command::UpdateSelectedClient {
            client_id: client_id.to_string(),
            patch: SelectedClientPatch {
                changes_history: Some(detail.changes_history),
                notes: Some(detail.notes),
                ..SelectedClientPatch::default()
            },
            at: now_millis(),
        });
        Ok(())
    }

    fn focused_id(&self) -> Result<String, InboxError> {
        self.store
            .snapshot()
            .selected_client_id()
            .map(str::to_string)
            .ok_or(InboxError::NotSelected)
    }

    pub async fn change_status(
        &self,
        client_id: &str,
        messages_status: MessagesStatus,
        assigned_to: Option<String>,
    ) -> Result<(), InboxError> {
        let change = StatusChange {
            client_id: client_id.to_string(),
            project_id: self.project_id.clone(),
            messages_status,
            assigned_to,
        };
        self.run(Request::ChangeStatus(change)).await.map(drop)
    }

    /// Closes the focused conversation. Refused while it has no assignee.
    pub async fn close_dialog(&self) -> Result<(), InboxError> {
        let client_id = self.focused_id()?;
        if crate::selectors::is_close_disabled(&self.store.snapshot()) {
            return Err(InboxError::Unassigned(client_id));
        }
        self.change_status(&client_id, MessagesStatus::Closed, None).await
    }

    /// Assigns the focused conversation; an empty email unassigns it.
    pub async fn assign(&self, email: &str) -> Result<(), InboxError> {
        let client_id = self.focused_id()?;
        self.change_status(&client_id, MessagesStatus::Opened, Some(email.to_string()))
            .await
    }

    /// Saves an operator edit of the focused client, then applies it locally
    /// and mirrors it to other operators. Unchanged values are not sent.
    pub async fn edit_client_field(&self, field: ClientField, value: &str) -> Result<(), InboxError> {
        let state = self.store.snapshot();
        let selected = state.selected_client.as_ref().ok_or(InboxError::NotSelected)?;
        let conv = &selected.conversation;
        let current = match field {
            ClientField::Phone => conv.phone.clone(),
            ClientField::Email => conv.email.clone(),
            ClientField::AvatarName => conv.avatar_name.clone(),
            ClientField::IsBlocked => conv.is_blocked.to_string(),
        };
        if current == value {
            return Ok(());
        }
        let client_id = conv.client_id.clone();
        let update = ClientUpdate {
            client_id: client_id.clone(),
            project_id: self.project_id.clone(),
            updated_by: "operator".to_string(),
            field,
            value: value.to_string(),
        };
        self.run(Request::UpdateClient(update)).await?;

        let mut list_patch = ConversationPatch::default();
        let mut focus_patch = SelectedClientPatch::default();
        match field {
            ClientField::Phone => {
                list_patch.phone = Some(value.to_string());
                focus_patch.phone = Some(value.to_string());
            }
            ClientField::Email => {
                list_patch.email = Some(value.to_string());
                focus_patch.email = Some(value.to_string());
            }
            ClientField::AvatarName => {
                list_patch.avatar_name = Some(value.to_string());
                focus_patch.avatar_name = Some(value.to_string());
            }
            ClientField::IsBlocked => {
                let blocked = value == "true";
                list_patch.is_blocked = Some(blocked);
                focus_patch.is_blocked = Some(blocked);
            }
        }
        self.store.dispatch_all([
            Command::UpdateConversation { client_id: client_id.clone(), patch: list_patch },
            Command::UpdateSelectedClient { client_id: client_id.clone(), patch: focus_patch, at: now_millis() },
        ]);
        let edit = FieldEdit { client_id, field, value: value.to_string() };
        self.emit(OutgoingEvent::UpdateIncomingMessage(edit.clone()));
        self.emit(OutgoingEvent::UpdateSelectedClient(edit));
        Ok(())
    }

    pub async fn add_to_inbox(&self, client_id: &str, message: Message) -> Result<(), InboxError> {
        let entry = InboxEntry {
            client_id: client_id.to_string(),
            project_id: self.project_id.clone(),
            message,
        };
        self.run(Request::AddToInbox(entry)).await.map(drop)
    }

    pub async fn add_note(&self, text: &str) -> Result<Note, InboxError> {
        let client_id = self.focused_id()?;
        let now = now_millis();
        let note = Note {
            id: format!("{client_id}-{now}"),
            text: text.to_string(),
            author: Some(self.operator_email.clone()).filter(|e| !e.is_empty()),
            timestamp: Some(now),
        };
        let request = NoteRequest {
            client_id: client_id.clone(),
            project_id: self.project_id.clone(),
            note: note.clone(),
        };
        self.run(Request::AddNote(request)).await?;
        self.store.dispatch(Command::AddNote { client_id, note: note.clone() });
        Ok(note)
    }

    pub async fn delete_note(&self, note_id: &str) -> Result<(), InboxError> {
        let client_id = self.focused_id()?;
        let note = NoteRef {
            client_id: client_id.clone(),
            project_id: self.project_id.clone(),
            note_id: note_id.to_string(),
        };
        self.run(Request::DeleteNote(note)).await?;
        self.store.dispatch(Command::RemoveNote { client_id, note_id: note_id.to_string() });
        Ok(())
    }

    pub async fn delete_conversation(&self, client_id: &str) -> Result<(), InboxError> {
        let conversation = ConversationRef {
            client_id: client_id.to_string(),
            project_id: self.project_id.clone(),
        };
        self.run(Request::DeleteConversation(conversation)).await?;
        let mut commands = vec![Command::RemoveConversation { client_id: client_id.to_string() }];
        if self.store.snapshot().selected_client_id() == Some(client_id) {
            commands.push(Command::ClearSelectedClient);
        }
        self.store.dispatch_all(commands);
        Ok(())
    }

    /// Moves every dialog of `from_email` to `to_email`. Refetch to see the result.
    pub async fn remap_dialogs(&self, from_email: &str, to_email: &str) -> Result<(), InboxError> {
        let request = RemapRequest {
            project_id: self.project_id.clone(),
            from_email: from_email.to_string(),
            to_email: to_email.to_string(),
        };
        self.run(Request::RemapDialogs(request)).await.map(drop)
    }

    /// Cancels in-flight requests and tears down the live connection.
    pub async fn shutdown(&self) {
        self.lifetime.cancel();
        if let Some(live) = &self.live {
            live.shutdown().await;
        }
    }
}
