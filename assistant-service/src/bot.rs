//! Chat bot front end.
//!
//! The bot is written against three small seams so the dialogue and
//! command logic never touch the wire: a [`ChatSink`] that delivers text
//! with a reply keyboard, an [`UpdateSource`] that yields inbound messages
//! on a channel, and an [`UpdateHandler`] the ingestion loop drives.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};

use crate::db::UserId;
use crate::dialogue::DialogueStore;
use crate::error::{ServiceResult, TransportError};
use crate::i18n::I18n;
use crate::service::AssistantService;

mod commands;
pub mod ingestion;
pub mod telegram;

pub use ingestion::run_updates;

/// Text message received from a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender_id: UserId,
    pub chat_id: i64,
    pub text: String,
}

/// Rows of suggested replies shown under a message
pub type Keyboard = Vec<Vec<String>>;

/// Outbound half of a chat transport
pub trait ChatSink: Send + Sync + 'static {
    fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Inbound half of a chat transport
pub trait UpdateSource: Send + 'static {
    /// Start receiving. The channel closes when the transport reports a
    /// conflict with another consumer.
    fn open(&mut self) -> mpsc::Receiver<InboundMessage>;

    /// Clear the cause of a conflict before the channel is reopened
    fn resolve_conflict(&mut self) -> impl Future<Output = ()> + Send;
}

/// Processes one inbound message
pub trait UpdateHandler: Send + Sync + 'static {
    fn handle(&self, message: InboundMessage) -> impl Future<Output = ServiceResult<()>> + Send;
}

/// Dialogue and command router for chat users
pub struct ChatBot<S> {
    sink: Arc<S>,
    service: Arc<AssistantService>,
    dialogues: Arc<DialogueStore>,
    i18n: Arc<I18n>,
    locale: String,
    /// One lock per user with a message in flight
    turns: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl<S: ChatSink> ChatBot<S> {
    pub fn new(
        sink: Arc<S>,
        service: Arc<AssistantService>,
        dialogues: Arc<DialogueStore>,
        i18n: Arc<I18n>,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            service,
            dialogues,
            i18n,
            locale: locale.into(),
            turns: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for the user's previous message to finish processing
    async fn begin_turn(&self, owner: UserId) -> OwnedMutexGuard<()> {
        let lock = self.turns.lock().await.entry(owner).or_default().clone();
        lock.lock_owned().await
    }

    async fn end_turn(&self, owner: UserId, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut turns = self.turns.lock().await;
        // Nobody else is queued behind this user
        if turns.get(&owner).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            turns.remove(&owner);
        }
    }
}

impl<S: ChatSink> UpdateHandler for ChatBot<S> {
    async fn handle(&self, message: InboundMessage) -> ServiceResult<()> {
        let result = self.handle_message(message).await;
        metrics::gauge!("bot_active_dialogues").set(self.dialogues.active_count().await as f64);
        result
    }
}
