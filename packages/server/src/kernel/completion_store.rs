//! The `completion:<job_id>` key/value store, TTL-bounded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::common::AppError;

/// The terminal record a generator writes for a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRecord {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub worker: String,
    pub generation_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl CompletionRecord {
    pub fn success(response: String, worker: String, generation_time_ms: u64) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
            worker,
            generation_time_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(error: String, worker: String, generation_time_ms: u64) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error),
            worker,
            generation_time_ms,
            timestamp: Utc::now(),
        }
    }
}

fn completion_key(job_id: &uuid::Uuid) -> String {
    format!("completion:{job_id}")
}

/// Trait for the completion-record store.
#[async_trait]
pub trait CompletionStore: Send + Sync {
    async fn put(
        &self,
        job_id: &uuid::Uuid,
        record: &CompletionRecord,
        ttl: Duration,
    ) -> Result<(), AppError>;

    async fn get(&self, job_id: &uuid::Uuid) -> Result<Option<CompletionRecord>, AppError>;
}

/// Redis-backed store using `SETEX`/`GET`.
pub struct RedisCompletionStore {
    client: redis::Client,
}

impl RedisCompletionStore {
    pub fn new(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, AppError> {
        self.client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))
    }
}

#[async_trait]
impl CompletionStore for RedisCompletionStore {
    async fn put(
        &self,
        job_id: &uuid::Uuid,
        record: &CompletionRecord,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let payload = serde_json::to_string(record)
            .map_err(|e| AppError::BadInput(format!("completion did not serialize: {e}")))?;
        let mut conn = self.connection().await?;
        redis::cmd("SETEX")
            .arg(completion_key(job_id))
            .arg(ttl.as_secs().max(1))
            .arg(payload)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| AppError::BackendFailure(e.to_string()))
    }

    async fn get(&self, job_id: &uuid::Uuid) -> Result<Option<CompletionRecord>, AppError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(completion_key(job_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::BackendFailure(e.to_string()))?;

        match raw {
            None => Ok(None),
            Some(payload) => {
                let record = serde_json::from_str(&payload)
                    .map_err(|e| AppError::BadInput(format!("malformed completion: {e}")))?;
                Ok(Some(record))
            }
        }
    }
}

struct Entry {
    record: CompletionRecord,
    expires_at: Instant,
}

/// In-memory store with manual TTL expiry, used by tests.
#[derive(Default)]
pub struct InMemoryCompletionStore {
    entries: Mutex<HashMap<uuid::Uuid, Entry>>,
}

impl InMemoryCompletionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CompletionStore for InMemoryCompletionStore {
    async fn put(
        &self,
        job_id: &uuid::Uuid,
        record: &CompletionRecord,
        ttl: Duration,
    ) -> Result<(), AppError> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).insert(
            *job_id,
            Entry {
                record: record.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, job_id: &uuid::Uuid) -> Result<Option<CompletionRecord>, AppError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(job_id) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.record.clone())),
            Some(_) => {
                entries.remove(job_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
