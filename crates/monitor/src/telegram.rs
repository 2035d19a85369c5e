//! Client for the Telegram Bot HTTP API: outbound messages plus the
//! long-polling update stream the command surface consumes.

use serde::{
    Deserialize,
    Serialize,
};
use std::time::Duration;
use url::Url;

/// Timeout for plain message sends.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra slack on top of the server-side long-poll timeout.
const POLL_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Telegram API error: {0}")]
    Api(String),
}

/// An incoming update from `getUpdates`.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Serialize)]
struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

/// Telegram Bot API client bound to one bot token and one chat.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: Url,
    chat_id: String,
}

impl TelegramClient {
    pub fn new(token: &str, chat_id: String) -> Result<Self, TelegramError> {
        let base_url = Url::parse(&format!("https://api.telegram.org/bot{token}/"))?;
        Self::with_base_url(base_url, chat_id)
    }

    /// Point the client at an alternate API host. Used in tests.
    pub fn with_base_url(mut base_url: Url, chat_id: String) -> Result<Self, TelegramError> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder().use_rustls_tls().build()?;

        Ok(Self {
            client,
            base_url,
            chat_id,
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Deliver one Markdown-formatted message to the configured chat.
    pub async fn send_message(&self, text: &str) -> Result<(), TelegramError> {
        let url = self.base_url.join("sendMessage")?;
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
        };
        let response = self
            .client
            .post(url)
            .timeout(SEND_TIMEOUT)
            .json(&request)
            .send()
            .await?;
        let body: ApiResponse<serde_json::Value> = response.json().await?;
        if !body.ok {
            return Err(TelegramError::Api(
                body.description
                    .unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(())
    }

    /// Long-poll for new updates, blocking server-side for up to
    /// `timeout_secs`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let url = self.base_url.join("getUpdates")?;
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message"],
        };
        let response = self
            .client
            .post(url)
            .timeout(Duration::from_secs(timeout_secs) + POLL_TIMEOUT_SLACK)
            .json(&request)
            .send()
            .await?;
        let body: ApiResponse<Vec<Update>> = response.json().await?;
        if !body.ok {
            return Err(TelegramError::Api(
                body.description
                    .unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(body.result.unwrap_or_default())
    }
}
