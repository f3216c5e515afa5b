// messaging gateway - thin wrapper over the telegram bot api sendMessage call

use crate::error::SendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// how the endpoint should interpret the message text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    /// telegram's legacy markdown (`*bold*`, `_italic_`)
    Markdown,
    #[serde(rename = "HTML")]
    Html,
}

/// anything that can deliver a text message to a recipient. no retries at this layer
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(
        &self,
        recipient: &str,
        text: &str,
        parse_mode: ParseMode,
    ) -> Result<(), SendError>;
}

// telegram api structures
#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: ParseMode,
}

#[derive(Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// bot api client. one http client is built at startup and reused for every send
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(
        &self,
        recipient: &str,
        text: &str,
        parse_mode: ParseMode,
    ) -> Result<(), SendError> {
        let request = SendMessageRequest {
            chat_id: recipient,
            text,
            parse_mode,
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&request)
            .send()
            .await
            // the url carries the bot token, keep it out of logs
            .map_err(|e| SendError::Network(e.without_url()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SendError::Network(e.without_url()))?;
        debug!("telegram sendMessage returned {status}");
        interpret_response(status, &body)
    }
}

/// map a bot api reply onto success or a typed transport error
fn interpret_response(status: u16, body: &str) -> Result<(), SendError> {
    let parsed = serde_json::from_str::<TelegramResponse>(body).ok();

    if (200..300).contains(&status) && parsed.as_ref().map_or(true, |r| r.ok) {
        return Ok(());
    }

    let description = parsed
        .as_ref()
        .and_then(|r| r.description.clone())
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        401 | 403 => Err(SendError::Unauthorized { status }),
        429 => Err(SendError::RateLimited {
            retry_after: parsed
                .and_then(|r| r.parameters)
                .and_then(|p| p.retry_after)
                .unwrap_or(0),
        }),
        _ => Err(SendError::Api {
            status,
            description,
        }),
    }
}
