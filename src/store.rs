//! Normalized inbox state and the pure transition function over it.
//!
//! All mutation goes through [`apply`]. The [`Store`] container owns the
//! current state and hands out immutable snapshots, so nothing outside this
//! module can change state except by dispatching a [`Command`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::api::models::{
    ChangeRecord, ClientField, Conversation, ConversationPatch, Filters, Message, MessagesStatus, Note,
    SelectedClient, SelectedClientPatch, Teammate, TeammatePatch,
};
use crate::error::Failure;

/// What happens to a closed conversation when a new message arrives for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosedConversationPolicy {
    /// Append the message and leave the status alone.
    #[default]
    KeepStatus,
    /// Append the message and move the conversation back to unread.
    Reopen,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InboxState {
    pub teammates: Vec<Teammate>,
    pub conversations: Vec<Conversation>,
    pub selected_client: Option<SelectedClient>,
    pub filters: Filters,
    /// True while at least one conversation-list fetch is in flight.
    pub is_fetching_incoming_messages: bool,
    /// True while at least one client-detail fetch is in flight.
    pub is_fetching_selected_client_info: bool,
    #[serde(default)]
    pub incoming_fetches_in_flight: u32,
    #[serde(default)]
    pub detail_fetches_in_flight: u32,
    pub last_failure: Option<Failure>,
    pub closed_conversation_policy: ClosedConversationPolicy,
    /// Bumped once for every command that changed something.
    pub version: u64,
}

impl InboxState {
    pub fn with_policy(policy: ClosedConversationPolicy) -> Self {
        Self {
            closed_conversation_policy: policy,
            ..Self::default()
        }
    }

    pub fn teammate(&self, email: &str) -> Option<&Teammate> {
        self.teammates.iter().find(|t| t.email == email)
    }

    pub fn conversation(&self, client_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.client_id == client_id)
    }

    pub fn selected_client_id(&self) -> Option<&str> {
        self.selected_client.as_ref().map(|s| s.conversation.client_id.as_str())
    }

    pub fn apply(self, command: Command) -> Self {
        apply(self, command)
    }
}

/// A store-update command: its only effect is a pure state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    AddTeammate(Teammate),
    SetTeammates(Vec<Teammate>),
    RemoveTeammate { email: String },
    UpdateTeammate(TeammatePatch),
    SetConversations(Vec<Conversation>),
    AddIncomingConversation(Conversation),
    UpdateConversation { client_id: String, patch: ConversationPatch },
    RemoveConversation { client_id: String },
    SelectClient(SelectedClient),
    ClearSelectedClient,
    UpdateSelectedClient { client_id: String, patch: SelectedClientPatch, at: i64 },
    AppendSelectedClientMessage { client_id: String, message: Message },
    AddNote { client_id: String, note: Note },
    RemoveNote { client_id: String, note_id: String },
    SetFilters(Filters),
    /// `true` opens a fetch and `false` closes one; the flag stays set while
    /// any fetch of that kind is still open.
    SetFetchingIncomingMessages(bool),
    SetFetchingSelectedClientInfo(bool),
    RecordFailure(Failure),
    ClearFailure,
}

/// Applies one command. Never panics; a command aimed at a record that does
/// not exist leaves the state as it was.
pub fn apply(mut state: InboxState, command: Command) -> InboxState {
    let changed = match command {
        Command::AddTeammate(teammate) => add_teammate(&mut state.teammates, teammate),
        Command::SetTeammates(teammates) => {
            let next = dedupe_teammates(teammates);
            replace(&mut state.teammates, next)
        }
        Command::RemoveTeammate { email } => {
            let before = state.teammates.len();
            state.teammates.retain(|t| t.email != email);
            state.teammates.len() != before
        }
        Command::UpdateTeammate(patch) => update_teammate(&mut state.teammates, patch),
        Command::SetConversations(conversations) => replace(&mut state.conversations, conversations),
        Command::AddIncomingConversation(conversation) => {
            let policy = state.closed_conversation_policy;
            add_incoming_conversation(&mut state.conversations, conversation, policy)
        }
        Command::UpdateConversation { client_id, patch } => state
            .conversations
            .iter_mut()
            .find(|c| c.client_id == client_id)
            .is_some_and(|c| merge_conversation(c, &patch)),
        Command::RemoveConversation { client_id } => {
            let before = state.conversations.len();
            state.conversations.retain(|c| c.client_id != client_id);
            state.conversations.len() != before
        }
        Command::SelectClient(selected) => replace(&mut state.selected_client, Some(selected)),
        Command::ClearSelectedClient => state.selected_client.take().is_some(),
        Command::UpdateSelectedClient { client_id, patch, at } => {
            focused(&mut state.selected_client, &client_id).is_some_and(|s| merge_selected(s, patch, at))
        }
        Command::AppendSelectedClientMessage { client_id, message } => {
            match focused(&mut state.selected_client, &client_id) {
                Some(selected) => {
                    selected.conversation.messages_history.push(message);
                    true
                }
                None => false,
            }
        }
        Command::AddNote { client_id, note } => match focused(&mut state.selected_client, &client_id) {
            Some(selected) if !selected.notes.iter().any(|n| n.id == note.id) => {
                selected.notes.push(note);
                true
            }
            _ => false,
        },
        Command::RemoveNote { client_id, note_id } => match focused(&mut state.selected_client, &client_id) {
            Some(selected) => {
                let before = selected.notes.len();
                selected.notes.retain(|n| n.id != note_id);
                selected.notes.len() != before
            }
            None => false,
        },
        Command::SetFilters(filters) => replace(&mut state.filters, filters),
        Command::SetFetchingIncomingMessages(begin) => track_fetch(
            &mut state.incoming_fetches_in_flight,
            &mut state.is_fetching_incoming_messages,
            begin,
        ),
        Command::SetFetchingSelectedClientInfo(begin) => track_fetch(
            &mut state.detail_fetches_in_flight,
            &mut state.is_fetching_selected_client_info,
            begin,
        ),
        Command::RecordFailure(failure) => replace(&mut state.last_failure, Some(failure)),
        Command::ClearFailure => state.last_failure.take().is_some(),
    };
    if changed {
        state.version += 1;
    }
    state
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn track_fetch(in_flight: &mut u32, flag: &mut bool, begin: bool) -> bool {
    let before = *in_flight;
    *in_flight = if begin { before.saturating_add(1) } else { before.saturating_sub(1) };
    let flipped = replace(flag, *in_flight > 0);
    *in_flight != before || flipped
}

fn focused<'a>(selected: &'a mut Option<SelectedClient>, client_id: &str) -> Option<&'a mut SelectedClient> {
    selected.as_mut().filter(|s| s.conversation.client_id == client_id)
}

fn add_teammate(teammates: &mut Vec<Teammate>, teammate: Teammate) -> bool {
    match teammates.iter_mut().find(|t| t.email == teammate.email) {
        Some(existing) => replace(existing, teammate),
        None => {
            teammates.push(teammate);
            true
        }
    }
}

fn dedupe_teammates(teammates: Vec<Teammate>) -> Vec<Teammate> {
    let mut out: Vec<Teammate> = Vec::with_capacity(teammates.len());
    for teammate in teammates {
        match out.iter_mut().find(|t| t.email == teammate.email) {
            Some(existing) => *existing = teammate,
            None => out.push(teammate),
        }
    }
    out
}

fn update_teammate(teammates: &mut [Teammate], patch: TeammatePatch) -> bool {
    let rename_taken = patch
        .email
        .as_deref()
        .is_some_and(|new| new != patch.old_email && teammates.iter().any(|t| t.email == new));
    let Some(teammate) = teammates.iter_mut().find(|t| t.email == patch.old_email) else {
        return false;
    };
    let before = teammate.clone();
    if let Some(username) = patch.username.filter(|u| !u.is_empty()) {
        teammate.username = username;
    }
    if let Some(status) = patch.status.filter(|s| !s.is_empty()) {
        teammate.status = status;
    }
    if let Some(is_online) = patch.is_online {
        teammate.is_online = is_online;
    }
    if let Some(email) = patch.email.filter(|e| !e.is_empty()) {
        if rename_taken {
            log::warn!("ignoring rename of {} to {}: email already in use", patch.old_email, email);
        } else {
            teammate.email = email;
        }
    }
    *teammate != before
}

fn add_incoming_conversation(
    conversations: &mut Vec<Conversation>,
    incoming: Conversation,
    policy: ClosedConversationPolicy,
) -> bool {
    let Some(existing) = conversations.iter_mut().find(|c| c.client_id == incoming.client_id) else {
        conversations.insert(0, incoming);
        return true;
    };
    let appended = !incoming.messages_history.is_empty();
    existing.messages_history.extend(incoming.messages_history);
    let reopened = appended
        && policy == ClosedConversationPolicy::Reopen
        && existing.messages_status == MessagesStatus::Closed;
    if reopened {
        existing.messages_status = MessagesStatus::Unread;
    }
    appended
}

fn merge_conversation(conversation: &mut Conversation, patch: &ConversationPatch) -> bool {
    let before = conversation.clone();
    if let Some(status) = patch.messages_status {
        conversation.messages_status = status;
    }
    if let Some(assigned_to) = &patch.assigned_to {
        conversation.assigned_to = assigned_to.clone();
    }
    if let Some(phone) = &patch.phone {
        conversation.phone = phone.clone();
    }
    if let Some(email) = &patch.email {
        conversation.email = email.clone();
    }
    if let Some(avatar_name) = &patch.avatar_name {
        conversation.avatar_name = avatar_name.clone();
    }
    if let Some(is_blocked) = patch.is_blocked {
        conversation.is_blocked = is_blocked;
    }
    *conversation != before
}

fn track(history: &mut Vec<ChangeRecord>, field: ClientField, slot: &mut String, value: String, at: i64) {
    if *slot == value {
        return;
    }
    history.push(ChangeRecord {
        before: Some(std::mem::replace(slot, value.clone())),
        after: Some(value),
        changed_field: field.as_str().to_string(),
        timestamp: at,
    });
}

fn merge_selected(selected: &mut SelectedClient, patch: SelectedClientPatch, at: i64) -> bool {
    let before = selected.clone();
    if let Some(history) = patch.changes_history {
        selected.changes_history = history;
    }
    if let Some(notes) = patch.notes {
        selected.notes = notes;
    }
    let conv = &mut selected.conversation;
    if let Some(assigned_to) = patch.assigned_to {
        conv.assigned_to = assigned_to;
    }
    if let Some(status) = patch.messages_status {
        conv.messages_status = status;
    }
    let history = &mut selected.changes_history;
    if let Some(phone) = patch.phone {
        track(history, ClientField::Phone, &mut conv.phone, phone, at);
    }
    if let Some(email) = patch.email {
        track(history, ClientField::Email, &mut conv.email, email, at);
    }
    if let Some(avatar_name) = patch.avatar_name {
        track(history, ClientField::AvatarName, &mut conv.avatar_name, avatar_name, at);
    }
    if let Some(is_blocked) = patch.is_blocked {
        if conv.is_blocked != is_blocked {
            history.push(ChangeRecord {
                before: Some(conv.is_blocked.to_string()),
                after: Some(is_blocked.to_string()),
                changed_field: ClientField::IsBlocked.as_str().to_string(),
                timestamp: at,
            });
            conv.is_blocked = is_blocked;
        }
    }
    *selected != before
}

/// Process-wide owner of the inbox state.
///
/// Cloning is cheap and every clone shares the same state. Readers get
/// `Arc` snapshots that never change under them.
#[derive(Clone)]
pub struct Store {
    tx: Arc<watch::Sender<Arc<InboxState>>>,
}

impl Store {
    pub fn new(initial: InboxState) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> Arc<InboxState> {
        self.tx.borrow().clone()
    }

    /// Receiver notified after every dispatch.
    pub fn subscribe(&self) -> watch::Receiver<Arc<InboxState>> {
        self.tx.subscribe()
    }

    pub fn dispatch(&self, command: Command) {
        self.dispatch_all([command]);
    }

    /// Applies a batch in order; no snapshot ever observes part of a batch.
    pub fn dispatch_all(&self, commands: impl IntoIterator<Item = Command>) {
        self.tx.send_modify(|current| {
            let mut next = InboxState::clone(current);
            for command in commands {
                log::trace!("apply {command:?}");
                next = apply(next, command);
            }
            *current = Arc::new(next);
        });
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(InboxState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    fn teammate(email: &str, username: &str, is_online: bool) -> Teammate {
        Teammate {
            email: email.into(),
            username: username.into(),
            status: "active".into(),
            is_online,
        }
    }

    fn msg(author: &str, body: &str, ts: i64) -> Message {
        Message { author: author.into(), body: body.into(), timestamp: Some(ts) }
    }

    fn conversation(client_id: &str) -> Conversation {
        Conversation::incoming(client_id, msg("client", "hello", 1), "Fox", "Red")
    }

    fn with_teammates(teammates: Vec<Teammate>) -> InboxState {
        apply(InboxState::default(), Command::SetTeammates(teammates))
    }

    #[test]
    fn presence_update_keeps_username() {
        let state = with_teammates(vec![teammate("a@x.com", "Alex", false)]);
        let state = state.apply(Command::UpdateTeammate(TeammatePatch {
            old_email: "a@x.com".into(),
            is_online: Some(true),
            ..TeammatePatch::default()
        }));
        assert_eq!(state.teammates, vec![teammate("a@x.com", "Alex", true)]);
    }

    #[test]
    fn partial_updates_preserve_unspecified_fields() {
        let mut state = with_teammates(vec![teammate("a@x.com", "Alex", false), teammate("b@x.com", "Bo", true)]);
        let patches = [
            TeammatePatch { old_email: "a@x.com".into(), status: Some("away".into()), ..Default::default() },
            TeammatePatch { old_email: "a@x.com".into(), is_online: Some(true), ..Default::default() },
            TeammatePatch { old_email: "a@x.com".into(), username: Some(String::new()), ..Default::default() },
            TeammatePatch { old_email: "a@x.com".into(), is_online: Some(true), ..Default::default() },
        ];
        for patch in patches {
            state = state.apply(Command::UpdateTeammate(patch));
        }
        let alex = state.teammate("a@x.com").unwrap();
        assert_eq!(alex.username, "Alex");
        assert_eq!(alex.status, "away");
        assert!(alex.is_online);
        assert_eq!(state.teammate("b@x.com").unwrap(), &teammate("b@x.com", "Bo", true));
    }

    #[test]
    fn rename_moves_identity_unless_taken() {
        let state = with_teammates(vec![teammate("a@x.com", "Alex", false), teammate("b@x.com", "Bo", false)]);
        let renamed = state.clone().apply(Command::UpdateTeammate(TeammatePatch {
            old_email: "a@x.com".into(),
            email: Some("alex@x.com".into()),
            ..Default::default()
        }));
        assert!(renamed.teammate("a@x.com").is_none());
        assert_eq!(renamed.teammate("alex@x.com").unwrap().username, "Alex");

        let clash = state.apply(Command::UpdateTeammate(TeammatePatch {
            old_email: "a@x.com".into(),
            email: Some("b@x.com".into()),
            username: Some("Alexandra".into()),
            ..Default::default()
        }));
        assert_eq!(clash.teammates.iter().filter(|t| t.email == "b@x.com").count(), 1);
        assert_eq!(clash.teammate("a@x.com").unwrap().username, "Alexandra");
    }

    #[test]
    fn remove_teammate_removes_exactly_one() {
        let state = with_teammates(vec![
            teammate("a@x.com", "Alex", false),
            teammate("b@x.com", "Bo", false),
            teammate("c@x.com", "Cy", true),
        ]);
        let state = state.apply(Command::RemoveTeammate { email: "b@x.com".into() });
        let emails: Vec<_> = state.teammates.iter().map(|t| t.email.as_str()).collect();
        assert_eq!(emails, ["a@x.com", "c@x.com"]);
    }

    #[test]
    fn teammate_emails_stay_unique() {
        let state = with_teammates(vec![teammate("a@x.com", "Alex", false), teammate("a@x.com", "Alexa", true)]);
        assert_eq!(state.teammates, vec![teammate("a@x.com", "Alexa", true)]);
        let state = state.apply(Command::AddTeammate(teammate("a@x.com", "Al", false)));
        assert_eq!(state.teammates.len(), 1);
        assert_eq!(state.teammates[0].username, "Al");
    }

    #[test]
    fn unknown_targets_leave_state_untouched() {
        let state = with_teammates(vec![teammate("a@x.com", "Alex", false)]);
        let version = state.version;
        let state = state
            .apply(Command::RemoveTeammate { email: "nobody@x.com".into() })
            .apply(Command::UpdateConversation { client_id: "ghost".into(), patch: ConversationPatch::default() })
            .apply(Command::AppendSelectedClientMessage { client_id: "ghost".into(), message: msg("client", "x", 2) });
        assert_eq!(state.version, version);
    }

    #[test]
    fn incoming_conversation_is_prepended_once() {
        let state = apply(InboxState::default(), Command::SetConversations(vec![conversation("c1")]));
        let state = state.apply(Command::AddIncomingConversation(conversation("c2")));
        assert_eq!(state.conversations[0].client_id, "c2");

        let mut again = conversation("c2");
        again.messages_history = vec![msg("client", "second", 2)];
        let state = state.apply(Command::AddIncomingConversation(again));
        assert_eq!(state.conversations.len(), 2);
        let bodies: Vec<_> = state.conversation("c2").unwrap().messages_history.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["hello", "second"]);
    }

    #[test]
    fn closed_conversation_reopens_only_under_reopen_policy() {
        let mut closed = conversation("c1");
        closed.messages_status = MessagesStatus::Closed;
        for (policy, expected) in [
            (ClosedConversationPolicy::KeepStatus, MessagesStatus::Closed),
            (ClosedConversationPolicy::Reopen, MessagesStatus::Unread),
        ] {
            let state = InboxState::with_policy(policy)
                .apply(Command::SetConversations(vec![closed.clone()]))
                .apply(Command::AddIncomingConversation(conversation("c1")));
            assert_eq!(state.conversation("c1").unwrap().messages_status, expected);
        }
    }

    #[test]
    fn selected_client_edits_are_logged() {
        let state = InboxState::default().apply(Command::SelectClient(conversation("c1").into()));
        let patch = SelectedClientPatch {
            phone: Some("+100".into()),
            avatar_name: Some("Fox".into()),
            assigned_to: Some("a@x.com".into()),
            ..Default::default()
        };
        let state = state.apply(Command::UpdateSelectedClient { client_id: "c1".into(), patch, at: 42 });
        let selected = state.selected_client.as_ref().unwrap();
        assert_eq!(selected.conversation.phone, "+100");
        assert_eq!(selected.conversation.assigned_to, "a@x.com");
        assert_eq!(
            selected.changes_history,
            vec![ChangeRecord {
                before: Some(String::new()),
                after: Some("+100".into()),
                changed_field: "phone".into(),
                timestamp: 42,
            }]
        );
    }

    #[test]
    fn selected_client_update_for_other_client_is_ignored() {
        let state = InboxState::default().apply(Command::SelectClient(conversation("c1").into()));
        let before = state.clone();
        let patch = SelectedClientPatch { assigned_to: Some("a@x.com".into()), ..Default::default() };
        let state = state.apply(Command::UpdateSelectedClient { client_id: "c2".into(), patch, at: 1 });
        assert_eq!(state, before);
    }

    #[test]
    fn notes_are_added_and_removed() {
        let note = Note { id: "n1".into(), text: "vip".into(), author: None, timestamp: None };
        let state = InboxState::default()
            .apply(Command::SelectClient(conversation("c1").into()))
            .apply(Command::AddNote { client_id: "c1".into(), note: note.clone() })
            .apply(Command::AddNote { client_id: "c1".into(), note });
        assert_eq!(state.selected_client.as_ref().unwrap().notes.len(), 1);
        let state = state.apply(Command::RemoveNote { client_id: "c1".into(), note_id: "n1".into() });
        assert!(state.selected_client.as_ref().unwrap().notes.is_empty());
    }

    #[test]
    fn replaying_serialized_commands_is_deterministic() {
        let commands = vec![
            Command::SetTeammates(vec![teammate("a@x.com", "Alex", false)]),
            Command::SetConversations(vec![conversation("c1")]),
            Command::AddIncomingConversation(conversation("c2")),
            Command::SelectClient(conversation("c2").into()),
            Command::AppendSelectedClientMessage { client_id: "c2".into(), message: msg("operator", "hi", 3) },
            Command::UpdateConversation {
                client_id: "c1".into(),
                patch: ConversationPatch { messages_status: Some(MessagesStatus::Closed), ..Default::default() },
            },
            Command::RecordFailure(Failure::new(FailureKind::FetchFailed, "HTTP 500")),
        ];
        let wire = serde_json::to_string(&commands).unwrap();
        let replay = |json: &str| {
            let decoded: Vec<Command> = serde_json::from_str(json).unwrap();
            decoded.into_iter().fold(InboxState::default(), apply)
        };
        let first = replay(&wire);
        let second = replay(&wire);
        assert_eq!(first, second);
        assert_eq!(first, commands.into_iter().fold(InboxState::default(), apply));
    }

    #[test]
    fn fetch_flag_stays_set_until_last_fetch_ends() {
        let state = InboxState::default()
            .apply(Command::SetFetchingSelectedClientInfo(true))
            .apply(Command::SetFetchingSelectedClientInfo(true))
            .apply(Command::SetFetchingSelectedClientInfo(false));
        assert!(state.is_fetching_selected_client_info);
        assert_eq!(state.detail_fetches_in_flight, 1);

        let state = state.apply(Command::SetFetchingSelectedClientInfo(false));
        assert!(!state.is_fetching_selected_client_info);
        let version = state.version;
        let state = state.apply(Command::SetFetchingSelectedClientInfo(false));
        assert_eq!(state.detail_fetches_in_flight, 0);
        assert_eq!(state.version, version);
        assert!(!state.is_fetching_incoming_messages);
    }

    #[tokio::test]
    async fn store_batches_are_atomic_for_subscribers() {
        let store = Store::default();
        let mut rx = store.subscribe();
        store.dispatch_all([
            Command::SetConversations(vec![conversation("c1")]),
            Command::SelectClient(conversation("c1").into()),
        ]);
        rx.changed().await.unwrap();
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.conversations.len(), 1);
        assert_eq!(seen.selected_client_id(), Some("c1"));
        assert_eq!(seen.version, 2);
        assert!(Arc::ptr_eq(&seen, &store.snapshot()));
    }
}
