//! Telegram Bot API transport: long-polling for updates and `sendMessage`.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChatSink, InboundMessage, Keyboard, UpdateSource};
use crate::config::TelegramConfig;
use crate::error::{ServiceError, ServiceResult, TransportError, format_error_chain};

const CONFLICT: u16 = 409;
const RETRY_DELAY: Duration = Duration::from_secs(3);
const UPDATE_BUFFER: usize = 100;

/// Bot API client
pub struct TelegramClient {
    client: Client,
    base_url: String,
    poll_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    from: Option<Sender>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Sender {
    id: i64,
}

impl Update {
    /// Text messages only; everything else is acknowledged and dropped
    fn into_inbound(self) -> Option<InboundMessage> {
        let message = self.message?;
        let text = message.text?;
        let chat_id = message.chat.id;
        Some(InboundMessage {
            sender_id: message.from.map_or(chat_id, |from| from.id),
            chat_id,
            text,
        })
    }
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig, bot_token: &str) -> ServiceResult<Self> {
        let poll_timeout = Duration::from_secs(config.poll_timeout_secs);
        // Long polls hold the request open for the whole poll timeout
        let client = Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::Transport(TransportError::Request(e)))?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", config.api_base_url.trim_end_matches('/'), bot_token),
            poll_timeout,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, TransportError> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(TransportError::Request)?;

        let status = response.status().as_u16();
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(TransportError::InvalidResponse)?;

        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                description,
                error_code,
                ..
            } => Err(TransportError::Api {
                status: error_code.unwrap_or(status),
                description: description.unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TransportError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": self.poll_timeout.as_secs(),
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    /// Drop any registered webhook; a webhook makes `getUpdates` fail with 409
    pub async fn delete_webhook(&self) -> Result<(), TransportError> {
        self.call::<bool>("deleteWebhook", &json!({ "drop_pending_updates": false }))
            .await
            .map(|_| ())
    }
}

fn reply_markup(keyboard: &Keyboard) -> Option<serde_json::Value> {
    if keyboard.is_empty() {
        return None;
    }
    let rows: Vec<Vec<serde_json::Value>> = keyboard
        .iter()
        .map(|row| row.iter().map(|label| json!({ "text": label })).collect())
        .collect();
    Some(json!({ "keyboard": rows, "resize_keyboard": true }))
}

impl ChatSink for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), TransportError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = reply_markup(keyboard) {
            body["reply_markup"] = markup;
        }
        self.call::<IgnoredAny>("sendMessage", &body).await?;
        Ok(())
    }
}

/// Long-polling update source
pub struct TelegramUpdates {
    client: Arc<TelegramClient>,
    offset: Arc<AtomicI64>,
    shutdown: CancellationToken,
}

impl TelegramUpdates {
    pub fn new(client: Arc<TelegramClient>, shutdown: CancellationToken) -> Self {
        Self {
            client,
            offset: Arc::new(AtomicI64::new(0)),
            shutdown,
        }
    }
}

impl UpdateSource for TelegramUpdates {
    fn open(&mut self) -> mpsc::Receiver<InboundMessage> {
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        tokio::spawn(poll_updates(
            self.client.clone(),
            self.offset.clone(),
            tx,
            self.shutdown.clone(),
        ));
        rx
    }

    async fn resolve_conflict(&mut self) {
        match self.client.delete_webhook().await {
            Ok(()) => info!("Cleared Telegram webhook"),
            Err(e) => warn!(error = %format_error_chain(&e), "Failed to clear Telegram webhook"),
        }
    }
}

/// Poll until shutdown, the receiver goes away, or Telegram reports a
/// conflict. Returning drops `tx`, which closes the channel.
async fn poll_updates(
    client: Arc<TelegramClient>,
    offset: Arc<AtomicI64>,
    tx: mpsc::Sender<InboundMessage>,
    shutdown: CancellationToken,
) {
    loop {
        let updates = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = client.get_updates(offset.load(Ordering::SeqCst)) => result,
        };

        match updates {
            Ok(updates) => {
                for update in updates {
                    offset.fetch_max(update.update_id + 1, Ordering::SeqCst);
                    let Some(message) = update.into_inbound() else {
                        continue;
                    };
                    if tx.send(message).await.is_err() {
                        return;
                    }
                }
            }
            Err(TransportError::Api { status: CONFLICT, description }) => {
                warn!(%description, "Telegram reported a polling conflict");
                return;
            }
            Err(e) => {
                warn!(error = %format_error_chain(&e), "Failed to fetch Telegram updates");
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }
        debug!(offset = offset.load(Ordering::SeqCst), "Telegram poll finished");
    }
}
