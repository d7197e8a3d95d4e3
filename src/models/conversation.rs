use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    /// Stored sorted and de-duplicated; order carries no meaning.
    pub participant_ids: Vec<Uuid>,
    pub title: Option<String>,
    pub pinned: bool,
    pub archived: bool,
    pub muted: bool,
    /// Per-participant count of messages not yet read by them.
    pub unread_counts: HashMap<Uuid, u32>,
    pub last_message_id: Option<Uuid>,
    /// Preview of the last message for list rendering.
    pub snippet: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Non-decreasing across mutations; the store enforces this.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(participant_ids: Vec<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            participant_ids,
            title: None,
            pinned: false,
            archived: false,
            muted: false,
            unread_counts: HashMap::new(),
            last_message_id: None,
            snippet: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participant_ids.contains(&user_id)
    }

    /// Everyone except the given user, i.e. the recipient set of a message
    /// they send.
    pub fn recipients_of(&self, sender_id: Uuid) -> Vec<Uuid> {
        self.participant_ids
            .iter()
            .copied()
            .filter(|id| *id != sender_id)
            .collect()
    }
}

/// Canonical participant list: sorted, de-duplicated.
pub fn normalize_participants(participant_ids: &[Uuid]) -> Vec<Uuid> {
    let mut ids = participant_ids.to_vec();
    ids.sort();
    ids.dedup();
    ids
}
