//! # Notifications
//!
//! Best-effort summary of each submission to the site owner's chat.
//!
//! ## Delivery
//!
//! - No bot token or chat id configured: `Suppressed`, nothing is sent
//! - One attempt per submission, no retry
//! - Transport errors and non-2xx answers become `Failed`, logged and otherwise ignored
//! - The outcome is stored on the submission record, it never fails the request
//!
//! ## Bot API
//!
//! `POST {api_base}/bot{token}/sendMessage` with `chat_id`, `text` and previews disabled.
//! Messages are cut to 4000 characters, under the API's 4096 limit.
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{config::NotifierConfig, validate::ContactSubmission};

pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent { at: DateTime<Utc> },
    Suppressed,
    Failed { reason: String },
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent { .. })
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Delivery::Sent { at } => Some(*at),
            Delivery::Suppressed | Delivery::Failed { .. } => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Channel answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<(), NotifyError>;
}

pub struct NotificationSink {
    transport: Option<Box<dyn ChatTransport>>,
}

impl NotificationSink {
    pub fn new(transport: Box<dyn ChatTransport>) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    pub fn disabled() -> Self {
        Self { transport: None }
    }

    pub fn from_config(config: Option<&NotifierConfig>, client: Client) -> Self {
        match config {
            Some(config) => Self::new(Box::new(BotApiTransport::new(config, client))),
            None => Self::disabled(),
        }
    }

    pub async fn send(&self, message: &str) -> Delivery {
        let Some(transport) = &self.transport else {
            debug!("Notification channel not configured, skipping");
            return Delivery::Suppressed;
        };

        match transport.deliver(truncate(message)).await {
            Ok(()) => Delivery::Sent { at: Utc::now() },
            Err(e) => {
                warn!("Notification failed: {e}");
                Delivery::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

pub struct BotApiTransport {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl BotApiTransport {
    pub fn new(config: &NotifierConfig, client: Client) -> Self {
        Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", config.api_base, config.bot_token),
            chat_id: config.chat_id.clone(),
        }
    }
}

#[async_trait]
impl ChatTransport for BotApiTransport {
    async fn deliver(&self, text: &str) -> Result<(), NotifyError> {
        let res = self
            .client
            .post(&self.endpoint)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
                disable_web_page_preview: true,
            })
            .send()
            .await
            // the token is part of the url
            .map_err(|e| e.without_url())?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Keeps the first `MAX_MESSAGE_CHARS` characters, never splitting a code point.
pub fn truncate(message: &str) -> &str {
    match message.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((end, _)) => &message[..end],
        None => message,
    }
}

pub fn format_summary(submission: &ContactSubmission) -> String {
    let mut lines = vec![
        "New contact form submission".to_string(),
        String::new(),
        format!("Name: {}", submission.name),
        format!("Email: {}", submission.email),
        format!("Phone: {}", submission.phone),
        format!("Comments: {}", submission.message),
    ];

    let extras = [
        ("Address", &submission.address),
        ("City", &submission.city),
        ("State", &submission.state),
        ("Page", &submission.source_url),
    ];
    for (label, value) in extras {
        if let Some(value) = value {
            lines.push(format!("{label}: {value}"));
        }
    }

    lines.join("\n")
}

/// Records every message it is handed; fails on demand.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let transport = Self::default();
        transport.fail.store(true, Ordering::SeqCst);
        transport
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn deliver(&self, text: &str) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected {
                status: 502,
                body: "channel unreachable".to_string(),
            });
        }

        self.sent.lock().push(text.to_string());
        Ok(())
    }
}

#[async_trait]
impl<T: ChatTransport> ChatTransport for std::sync::Arc<T> {
    async fn deliver(&self, text: &str) -> Result<(), NotifyError> {
        (**self).deliver(text).await
    }
}
