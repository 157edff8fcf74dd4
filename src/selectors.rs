//! Derived views over [`InboxState`] snapshots. Everything here is a pure
//! function of its arguments.

use std::fmt::Display;

use chrono::{DateTime, Locale, TimeZone};

use crate::api::models::{ALL, Conversation, Filters, SearchTag, Teammate};
use crate::store::InboxState;
use crate::utils::strip_markup;

pub fn client_name(conversation: &Conversation) -> String {
    format!("{} {}", conversation.avatar_color, conversation.avatar_name)
        .trim()
        .to_string()
}

/// Client messages at the end of the history that no operator answered yet.
pub fn unread_count(conversation: &Conversation) -> usize {
    conversation
        .messages_history
        .iter()
        .rev()
        .take_while(|m| m.is_from_client())
        .count()
}

/// Last message with markup removed, prefixed by who wrote it.
pub fn last_message_preview(conversation: &Conversation, operator_label: &str) -> Option<String> {
    let last = conversation.messages_history.last()?;
    let label = if last.is_from_client() { client_name(conversation) } else { operator_label.to_string() };
    Some(format!("{}: {}", label, strip_markup(&last.body)))
}

/// Day and abbreviated month of the last message, e.g. `05 Mar`.
pub fn last_message_date<Tz>(conversation: &Conversation, tz: &Tz, locale: Locale) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let ts = conversation.messages_history.last()?.timestamp?;
    let date = DateTime::from_timestamp_millis(ts)?.with_timezone(tz);
    Some(date.format_localized("%d %b", locale).to_string())
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

pub fn matches_filters(conversation: &Conversation, filters: &Filters) -> bool {
    let status_ok = filters.status == ALL || filters.status == conversation.messages_status.as_str();
    let channel_ok = filters.channel == ALL || filters.channel == conversation.channel;
    let assigned_ok = filters.assigned == ALL || filters.assigned == conversation.assigned_to;
    let needle = filters.search_by.value.trim();
    let search_ok = needle.is_empty()
        || match filters.search_by.tag {
            SearchTag::Text => conversation
                .messages_history
                .iter()
                .any(|m| contains_ci(&strip_markup(&m.body), needle)),
            SearchTag::Username => contains_ci(&client_name(conversation), needle),
            SearchTag::Email => contains_ci(&conversation.email, needle),
            SearchTag::Phone => contains_ci(&conversation.phone, needle),
        };
    status_ok && channel_ok && assigned_ok && search_ok
}

pub fn filter_conversations<'a>(state: &'a InboxState, filters: &Filters) -> Vec<&'a Conversation> {
    state
        .conversations
        .iter()
        .filter(|c| matches_filters(c, filters))
        .collect()
}

/// The assigned teammate, or `None` when unassigned or the teammate is gone.
pub fn assignee<'a>(conversation: &Conversation, teammates: &'a [Teammate]) -> Option<&'a Teammate> {
    if !conversation.is_assigned() {
        return None;
    }
    teammates.iter().find(|t| t.email == conversation.assigned_to)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeammateOption {
    pub id: String,
    pub label: String,
}

/// Assignee picker entries: `all` first, the current operator labelled `me_label`.
pub fn teammate_options(teammates: &[Teammate], current_email: &str, me_label: &str, all_label: &str) -> Vec<TeammateOption> {
    let mut options = vec![TeammateOption { id: ALL.to_string(), label: all_label.to_string() }];
    options.extend(teammates.iter().map(|t| TeammateOption {
        id: t.email.clone(),
        label: if t.email == current_email { me_label.to_string() } else { t.username.clone() },
    }));
    options
}

/// Closing is only allowed once the focused conversation has an assignee.
pub fn is_close_disabled(state: &InboxState) -> bool {
    state
        .selected_client_id()
        .and_then(|id| state.conversation(id))
        .is_none_or(|c| !c.is_assigned())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::api::models::{Message, MessagesStatus, SearchBy};
    use crate::store::Command;

    fn msg(author: &str, body: &str, ts: i64) -> Message {
        Message { author: author.into(), body: body.into(), timestamp: Some(ts) }
    }

    fn conversation() -> Conversation {
        let mut conv = Conversation::incoming("c1", msg("client", "hello", 1), "Fox", "Red");
        conv.messages_history.push(msg("a@x.com", "hi, how can I help?", 2));
        conv.messages_history.push(msg("client", "<p>my <b>order</b></p>", 3));
        conv.messages_history.push(msg("client", "is late", 1_709_640_000_000));
        conv.email = "fox@client.io".into();
        conv.phone = "+3581234".into();
        conv
    }

    #[test]
    fn unread_counts_trailing_client_messages() {
        assert_eq!(unread_count(&conversation()), 2);
        let mut answered = conversation();
        answered.messages_history.push(msg("a@x.com", "on it", 5));
        assert_eq!(unread_count(&answered), 0);
    }

    #[test]
    fn preview_strips_markup_and_labels_author() {
        let mut conv = conversation();
        conv.messages_history.pop();
        assert_eq!(last_message_preview(&conv, "You").unwrap(), "Red Fox: my order");
        conv.messages_history.push(msg("a@x.com", "<i>sent</i>", 4));
        assert_eq!(last_message_preview(&conv, "You").unwrap(), "You: sent");
    }

    #[test]
    fn last_message_date_is_day_and_month() {
        assert_eq!(last_message_date(&conversation(), &Utc, Locale::en_US).unwrap(), "05 Mar");
        let mut untimed = conversation();
        untimed.messages_history.push(Message { author: "client".into(), body: "x".into(), timestamp: None });
        assert_eq!(last_message_date(&untimed, &Utc, Locale::en_US), None);
    }

    #[test]
    fn filters_combine_with_and() {
        let conv = conversation();
        let mut filters = Filters::default();
        assert!(matches_filters(&conv, &filters));

        filters.search_by = SearchBy { value: "ORDER".into(), tag: SearchTag::Text };
        assert!(matches_filters(&conv, &filters));
        filters.status = MessagesStatus::Closed.as_str().into();
        assert!(!matches_filters(&conv, &filters));
        filters.status = ALL.into();

        filters.search_by = SearchBy { value: "1234".into(), tag: SearchTag::Phone };
        assert!(matches_filters(&conv, &filters));
        filters.search_by.tag = SearchTag::Email;
        assert!(!matches_filters(&conv, &filters));

        filters.search_by = SearchBy { value: "red fox".into(), tag: SearchTag::Username };
        filters.channel = "telegram".into();
        assert!(!matches_filters(&conv, &filters));
    }

    #[test]
    fn dangling_assignee_reads_as_unassigned() {
        let teammates = vec![Teammate {
            email: "a@x.com".into(),
            username: "Alex".into(),
            status: "active".into(),
            is_online: true,
        }];
        let mut conv = conversation();
        assert!(assignee(&conv, &teammates).is_none());
        conv.assigned_to = "a@x.com".into();
        assert_eq!(assignee(&conv, &teammates).unwrap().username, "Alex");
        conv.assigned_to = "gone@x.com".into();
        assert!(assignee(&conv, &teammates).is_none());
    }

    #[test]
    fn teammate_options_put_all_first_and_label_me() {
        let teammates = vec![
            Teammate { email: "a@x.com".into(), username: "Alex".into(), status: String::new(), is_online: true },
            Teammate { email: "b@x.com".into(), username: "Bo".into(), status: String::new(), is_online: false },
        ];
        let labels: Vec<_> = teammate_options(&teammates, "b@x.com", "Me", "All")
            .into_iter()
            .map(|o| o.label)
            .collect();
        assert_eq!(labels, ["All", "Alex", "Me"]);
    }

    #[test]
    fn close_requires_assignment() {
        let state = InboxState::default()
            .apply(Command::SetConversations(vec![conversation()]))
            .apply(Command::SelectClient(conversation().into()));
        assert!(is_close_disabled(&state));
        let state = state.apply(Command::UpdateConversation {
            client_id: "c1".into(),
            patch: crate::api::models::ConversationPatch {
                assigned_to: Some("a@x.com".into()),
                ..Default::default()
            },
        });
        assert!(!is_close_disabled(&state));
    }

    #[test]
    fn projections_are_stable_for_equal_inputs() {
        let conv = conversation();
        assert_eq!(last_message_preview(&conv, "You"), last_message_preview(&conv.clone(), "You"));
        assert_eq!(unread_count(&conv), unread_count(&conv.clone()));
    }
}
