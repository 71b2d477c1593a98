//! Telegram Bot API transport
//!
//! Long-polls `getUpdates` and answers each text message through
//! `sendMessage`. Runs until its cancellation token fires.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{respond, Reply, GET_PRODUCT_BUTTON};
use crate::sync::Synchronizer;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Server-side wait for new updates
const LONG_POLL_SECS: u64 = 25;

/// Pause after a failed poll before trying again
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Telegram API error: {0}")]
    Api(String),
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, BotError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(BotError::Api(
                self.description
                    .unwrap_or_else(|| "request rejected without description".to_string()),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Chat {
    id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyKeyboard>,
}

#[derive(Debug, Serialize)]
struct ReplyKeyboard {
    keyboard: Vec<Vec<KeyboardButton>>,
    resize_keyboard: bool,
}

#[derive(Debug, Serialize)]
struct KeyboardButton {
    text: String,
}

impl ReplyKeyboard {
    fn get_product() -> Self {
        Self {
            keyboard: vec![vec![KeyboardButton {
                text: GET_PRODUCT_BUTTON.to_string(),
            }]],
            resize_keyboard: true,
        }
    }
}

/// Telegram long-polling bot
pub struct TelegramBot {
    http_client: Client,
    api_base: String,
    sync: Synchronizer,
}

impl TelegramBot {
    pub fn new(token: &str, sync: Synchronizer) -> Result<Self, BotError> {
        Self::with_api_url(TELEGRAM_API_URL, token, sync)
    }

    /// Bot talking to a non-default Bot API server
    pub fn with_api_url(api_url: &str, token: &str, sync: Synchronizer) -> Result<Self, BotError> {
        let http_client = Client::builder()
            // Must outlast the long-poll wait
            .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
            .build()?;

        Ok(Self {
            http_client,
            api_base: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            sync,
        })
    }

    /// Spawn the polling loop; stops when `shutdown` is cancelled
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: CancellationToken) {
        info!("Telegram bot polling started");
        let mut offset: i64 = 0;

        loop {
            let updates = tokio::select! {
                _ = shutdown.cancelled() => break,
                updates = self.get_updates(offset) => updates,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(update).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Telegram getUpdates failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!("Telegram bot stopped");
    }

    async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let Some(text) = message.text else {
            return;
        };

        debug!(chat_id = message.chat.id, "Bot message received");

        for reply in respond(&text, &self.sync).await {
            if let Err(e) = self.send_message(message.chat.id, &reply).await {
                warn!(chat_id = message.chat.id, error = %e, "Telegram sendMessage failed");
            }
        }
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, BotError> {
        let response: ApiResponse<Vec<Update>> = self
            .http_client
            .get(format!("{}/getUpdates", self.api_base))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", LONG_POLL_SECS.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .send()
            .await?
            .json()
            .await?;

        response.into_result()
    }

    async fn send_message(&self, chat_id: i64, reply: &Reply) -> Result<(), BotError> {
        let body = build_send_message(chat_id, reply);

        let response: ApiResponse<serde_json::Value> = self
            .http_client
            .post(format!("{}/sendMessage", self.api_base))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        response.into_result().map(|_| ())
    }
}

fn build_send_message(chat_id: i64, reply: &Reply) -> SendMessage<'_> {
    SendMessage {
        chat_id,
        text: &reply.text,
        reply_markup: reply.show_keyboard.then(ReplyKeyboard::get_product),
    }
}
