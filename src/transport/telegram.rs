//! Telegram Bot API transport

use super::{Transport, Update};
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::types::{ChatId, UploadStrategy, UploadUnit};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Slack added on top of the long-poll timeout for the HTTP request itself
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Deadline for small JSON calls (sendMessage, getFile)
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for fetching a file the user sent
const FILE_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Envelope every Bot API method answers with
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    #[serde(default)]
    file_path: Option<String>,
}

/// [`Transport`] over the Telegram Bot API
///
/// Requests go to `<api_base>/bot<token>/<method>`; user files are fetched
/// from `<api_base>/file/bot<token>/<file_path>`. The token never appears in
/// logs.
#[derive(Clone)]
pub struct TelegramTransport {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl std::fmt::Debug for TelegramTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramTransport")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl TelegramTransport {
    /// Build a transport from configuration
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("relay-dl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }

    /// Turn a Bot API response into its `result`, or a typed error
    async fn parse<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Option<T>, TransportError> {
        let status = response.status();
        let body = response.text().await?;
        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(TransportError::Malformed(e.to_string()));
            }
            Err(_) => {
                return Err(TransportError::Rejected {
                    status: status.as_u16(),
                    description: body.trim().to_string(),
                });
            }
        };

        if !envelope.ok || !status.is_success() {
            return Err(TransportError::Rejected {
                status: envelope.error_code.unwrap_or_else(|| status.as_u16()),
                description: envelope
                    .description
                    .unwrap_or_else(|| status.to_string()),
            });
        }
        Ok(envelope.result)
    }

    async fn document_part(unit: &UploadUnit) -> Result<Part, TransportError> {
        let name = unit.artifact.file_name();
        let part = match unit.strategy {
            UploadStrategy::Direct => {
                let bytes = tokio::fs::read(&unit.artifact.path).await?;
                Part::bytes(bytes)
            }
            UploadStrategy::Streamed => {
                let file = tokio::fs::File::open(&unit.artifact.path).await?;
                let len = file.metadata().await?.len();
                Part::stream_with_length(reqwest::Body::from(file), len)
            }
        };
        Ok(part.file_name(name))
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_document(
        &self,
        chat: ChatId,
        unit: &UploadUnit,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let form = Form::new()
            .text("chat_id", chat.to_string())
            .text("caption", unit.caption.clone())
            .part("document", Self::document_part(unit).await?);

        debug!(
            %chat,
            file = %unit.artifact.file_name(),
            size = unit.artifact.size,
            strategy = ?unit.strategy,
            "sending document"
        );

        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .timeout(timeout)
            .send()
            .await?;
        Self::parse::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn send_message(&self, chat: ChatId, text: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&serde_json::json!({ "chat_id": chat.0, "text": text }))
            .timeout(CALL_TIMEOUT)
            .send()
            .await?;
        Self::parse::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<u64, TransportError> {
        let response = self
            .client
            .post(self.method_url("getFile"))
            .json(&serde_json::json!({ "file_id": file_id }))
            .timeout(CALL_TIMEOUT)
            .send()
            .await?;
        let info: FileInfo = Self::parse(response)
            .await?
            .ok_or_else(|| TransportError::Malformed("getFile returned no result".to_string()))?;
        let file_path = info
            .file_path
            .ok_or_else(|| TransportError::Malformed("getFile returned no file_path".to_string()))?;

        let mut response = self
            .client
            .get(self.file_url(&file_path))
            .timeout(FILE_DOWNLOAD_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TransportError::Rejected {
                status: response.status().as_u16(),
                description: format!("file download failed for {file_path}"),
            });
        }

        let mut out = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;
        debug!(?dest, bytes = written, "user file downloaded");
        Ok(written)
    }

    async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, TransportError> {
        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&serde_json::json!({
                "offset": offset,
                "timeout": timeout.as_secs(),
                "allowed_updates": ["message"],
            }))
            .timeout(timeout + POLL_GRACE)
            .send()
            .await?;
        let updates: Option<Vec<Update>> = Self::parse(response).await?;
        let updates = updates.unwrap_or_default();
        if !updates.is_empty() {
            debug!(count = updates.len(), offset, "received updates");
        }
        Ok(updates)
    }
}

impl TelegramTransport {
    /// Confirm the token works; returns the bot's username
    pub async fn get_me(&self) -> Result<Option<String>, TransportError> {
        #[derive(Deserialize)]
        struct Me {
            #[serde(default)]
            username: Option<String>,
        }

        let response = self
            .client
            .post(self.method_url("getMe"))
            .timeout(CALL_TIMEOUT)
            .send()
            .await?;
        match Self::parse::<Me>(response).await {
            Ok(me) => Ok(me.and_then(|m| m.username)),
            Err(e) => {
                warn!(error = %e, "getMe failed");
                Err(e)
            }
        }
    }
}
