//! Per-user chat dialogues.
//!
//! Each user has at most one active dialogue. The store only holds state;
//! the step logic lives in [`steps`] and is a pure function of the current
//! draft and the incoming text, so the chat handler decides when to
//! persist, advance, or end.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::db::UserId;

pub mod steps;

pub use steps::{Completed, Dialogue, DialogueKind, Prompt, Step};

/// Active dialogue for one user
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    pub owner: UserId,
    pub dialogue: Dialogue,
}

impl ConversationState {
    /// Tag naming the dialogue, e.g. `TODO_ADD`
    pub fn name(&self) -> &'static str {
        self.dialogue.kind().tag()
    }
}

/// Shared map of active dialogues keyed by user
///
/// Lookups take the read lock and may run concurrently; every mutation
/// takes the write lock.
#[derive(Debug, Default)]
pub struct DialogueStore {
    states: RwLock<HashMap<UserId, ConversationState>>,
}

impl DialogueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a dialogue with an empty draft, discarding any previous one
    pub async fn begin(&self, owner: UserId, kind: DialogueKind) -> ConversationState {
        let state = ConversationState {
            owner,
            dialogue: Dialogue::empty(kind),
        };
        let previous = self.states.write().await.insert(owner, state.clone());

        debug!(
            user_id = owner,
            dialogue = kind.tag(),
            replaced = ?previous.as_ref().map(ConversationState::name),
            "Dialogue started"
        );
        state
    }

    /// Snapshot of the user's active dialogue
    pub async fn current(&self, owner: UserId) -> Option<ConversationState> {
        self.states.read().await.get(&owner).cloned()
    }

    /// Replace the stored draft wholesale
    pub async fn advance(&self, owner: UserId, dialogue: Dialogue) {
        debug!(user_id = owner, dialogue = dialogue.kind().tag(), "Dialogue advanced");
        self.states
            .write()
            .await
            .insert(owner, ConversationState { owner, dialogue });
    }

    /// Drop the user's dialogue. Returns whether one was active.
    pub async fn end(&self, owner: UserId) -> bool {
        let removed = self.states.write().await.remove(&owner).is_some();
        if removed {
            debug!(user_id = owner, "Dialogue ended");
        }
        removed
    }

    /// Number of users mid-dialogue
    pub async fn active_count(&self) -> usize {
        self.states.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::steps::FinanceDraft;
    use super::*;
    use crate::db::EntryKind;

    #[tokio::test]
    async fn test_begin_advance_end() {
        let store = DialogueStore::new();

        let state = store.begin(7, DialogueKind::FinanceAdd).await;
        assert_eq!(state.name(), "FIN_ADD");
        assert_eq!(
            store.current(7).await.unwrap().dialogue,
            Dialogue::FinanceAdd(FinanceDraft::default())
        );

        let mut draft = FinanceDraft {
            kind: Some(EntryKind::Income),
            ..Default::default()
        };
        store.advance(7, Dialogue::FinanceAdd(draft.clone())).await;

        draft.amount = Some(Decimal::from_str("150.5").unwrap());
        store.advance(7, Dialogue::FinanceAdd(draft.clone())).await;

        draft.category = Some("salary".to_string());
        store.advance(7, Dialogue::FinanceAdd(draft.clone())).await;

        let current = store.current(7).await.unwrap();
        assert_eq!(current.owner, 7);
        assert_eq!(
            current.dialogue,
            Dialogue::FinanceAdd(FinanceDraft {
                kind: Some(EntryKind::Income),
                amount: Some(Decimal::from_str("150.5").unwrap()),
                category: Some("salary".to_string()),
                note: None,
            })
        );

        assert!(store.end(7).await);
        assert!(store.current(7).await.is_none());
        assert!(!store.end(7).await);
    }

    #[tokio::test]
    async fn test_begin_overwrites_previous_dialogue() {
        let store = DialogueStore::new();

        store.begin(1, DialogueKind::CreditAdd).await;
        store.begin(1, DialogueKind::TodoAdd).await;
        store.begin(2, DialogueKind::RecurringAdd).await;

        assert_eq!(store.current(1).await.unwrap().name(), "TODO_ADD");
        assert_eq!(store.current(2).await.unwrap().name(), "RECURRING_ADD");
        assert_eq!(store.active_count().await, 2);
    }
}
