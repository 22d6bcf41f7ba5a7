//! Partition a chronological message list into contiguous session runs.

use shared_types::Message;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionGroup<'a> {
    pub session_id: &'a str,
    pub messages: Vec<&'a Message>,
}

/// Start a new group whenever the session id changes. Never re-sorts.
pub fn group_by_session(messages: &[Message]) -> Vec<SessionGroup<'_>> {
    let mut groups: Vec<SessionGroup<'_>> = Vec::new();
    for message in messages {
        match groups.last_mut() {
            Some(last) if last.session_id == message.session_id => last.messages.push(message),
            _ => groups.push(SessionGroup {
                session_id: &message.session_id,
                messages: vec![message],
            }),
        }
    }
    groups
}

/// A reset happened but nothing has been said in the new session yet.
pub fn has_trailing_reset(groups: &[SessionGroup<'_>], active_session: &str) -> bool {
    groups
        .last()
        .is_some_and(|last| last.session_id != active_session)
}

/// Render-ready transcript: messages with reset boundaries between sessions.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptItem<'a> {
    Message(&'a Message),
    ResetBoundary,
}

pub fn layout<'a>(messages: &'a [Message], active_session: &str) -> Vec<TranscriptItem<'a>> {
    let groups = group_by_session(messages);
    let trailing = has_trailing_reset(&groups, active_session);

    let mut items = Vec::with_capacity(messages.len() + groups.len());
    for (idx, group) in groups.into_iter().enumerate() {
        if idx > 0 {
            items.push(TranscriptItem::ResetBoundary);
        }
        items.extend(group.messages.into_iter().map(TranscriptItem::Message));
    }
    if trailing {
        items.push(TranscriptItem::ResetBoundary);
    }
    items
}
