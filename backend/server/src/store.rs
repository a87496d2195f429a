//! # Submission Store
//!
//! Durable home of every accepted submission.
//!
//! ## Backends
//!
//! - REST: PostgREST-style `POST /rest/v1/{table}`, the inserted row comes back with its id
//! - Redis: `INCR` for the id, the record as a JSON string, ids appended to a list
//!
//! ## Guarantees
//!
//! - One write attempt per submission, errors are returned to the caller untouched
//! - No deduplication: a resubmitted form is a new record with a new id
//! - No rollback of the notification when the write fails
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use redis::{
    AsyncCommands, Client as RedisClient,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    config::StoreConfig, notify::Delivery, utils::RequestMeta, validate::ContactSubmission,
};

pub const SOURCE: &str = "contact_form";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Store answered {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Store returned no id")]
    MissingId,

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionRecord {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub source: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub telegram_sent: bool,
    pub telegram_sent_at: Option<DateTime<Utc>>,
    pub verified: bool,
}

impl SubmissionRecord {
    pub fn new(submission: ContactSubmission, meta: RequestMeta, delivery: &Delivery) -> Self {
        Self {
            name: submission.name,
            email: submission.email,
            phone: submission.phone,
            message: submission.message,
            address: submission.address,
            city: submission.city,
            state: submission.state,
            source: SOURCE.to_string(),
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
            source_url: submission.source_url.or(meta.referer),
            created_at: Utc::now(),
            telegram_sent: delivery.is_sent(),
            telegram_sent_at: delivery.sent_at(),
            verified: false,
        }
    }
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Writes the record once and returns the id the store assigned.
    async fn write(&self, record: &SubmissionRecord) -> Result<String, StoreError>;
}

pub async fn connect(
    config: &StoreConfig,
    client: Client,
) -> Result<Box<dyn SubmissionStore>, StoreError> {
    let store: Box<dyn SubmissionStore> = match config {
        StoreConfig::Rest { url, key, table } => {
            Box::new(RestStore::new(client, url, key.clone(), table))
        }
        StoreConfig::Redis { url, prefix } => {
            Box::new(RedisStore::connect(url, prefix.clone()).await?)
        }
    };

    Ok(store)
}

pub struct RestStore {
    client: Client,
    endpoint: String,
    key: String,
}

impl RestStore {
    pub fn new(client: Client, base_url: &str, key: String, table: &str) -> Self {
        Self {
            client,
            endpoint: format!("{base_url}/rest/v1/{table}"),
            key,
        }
    }
}

#[async_trait]
impl SubmissionStore for RestStore {
    async fn write(&self, record: &SubmissionRecord) -> Result<String, StoreError> {
        let res = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Prefer", "return=representation")
            .json(&[record])
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<Value> = res.json().await?;
        rows.first()
            .and_then(|row| row.get("id"))
            .and_then(id_string)
            .ok_or(StoreError::MissingId)
    }
}

fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct RedisStore {
    connection: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, prefix: String) -> Result<Self, StoreError> {
        // single attempt per write, the manager should not retry behind our back
        let config = ConnectionManagerConfig::new().set_number_of_retries(1);

        let client = RedisClient::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;

        Ok(Self { connection, prefix })
    }
}

#[async_trait]
impl SubmissionStore for RedisStore {
    async fn write(&self, record: &SubmissionRecord) -> Result<String, StoreError> {
        let json = serde_json::to_string(record)?;
        let mut connection = self.connection.clone();

        let id: u64 = connection.incr(format!("{}:next_id", self.prefix), 1).await?;
        let () = connection.set(format!("{}:{id}", self.prefix), json).await?;
        let () = connection.rpush(format!("{}:ids", self.prefix), id).await?;

        Ok(id.to_string())
    }
}

/// Keeps records in memory, hands out sequential ids and fails on demand.
#[derive(Default)]
pub struct MockStore {
    records: Mutex<Vec<SubmissionRecord>>,
    fail: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let store = Self::default();
        store.fail.store(true, Ordering::SeqCst);
        store
    }

    pub fn records(&self) -> Vec<SubmissionRecord> {
        self.records.lock().clone()
    }

    pub fn writes(&self) -> usize {
        self.records.lock().len()
    }
}

#[async_trait]
impl SubmissionStore for MockStore {
    async fn write(&self, record: &SubmissionRecord) -> Result<String, StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected {
                status: 503,
                body: "store unreachable".to_string(),
            });
        }

        let mut records = self.records.lock();
        records.push(record.clone());

        Ok(records.len().to_string())
    }
}

#[async_trait]
impl<T: SubmissionStore> SubmissionStore for std::sync::Arc<T> {
    async fn write(&self, record: &SubmissionRecord) -> Result<String, StoreError> {
        (**self).write(record).await
    }
}
