//! Per-replica load counters: `load:<replica_id>`.
//!
//! This is the one piece of global mutable state every other component is
//! allowed to read — and only through this trait (see SPEC_FULL.md §9's
//! "Global mutable state" resolution).

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::common::AppError;

fn load_key(replica: usize) -> String {
    format!("load:{replica}")
}

#[async_trait]
pub trait LoadAccount: Send + Sync {
    /// Increment the counter for `replica` and return the new value.
    async fn incr(&self, replica: usize) -> Result<i64, AppError>;

    /// Decrement the counter for `replica`, then clamp it to zero if it went
    /// negative, and return the post-clamp value. The clamp is a best-effort
    /// correction and may race harmlessly with concurrent updates.
    async fn decr(&self, replica: usize) -> Result<i64, AppError>;

    /// Read the current value for `replica` without mutating it.
    async fn get(&self, replica: usize) -> Result<i64, AppError>;
}

/// Redis-backed counter using `INCR`/`DECR`.
pub struct RedisLoadAccount {
    client: redis::Client,
}

impl RedisLoadAccount {
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
impl LoadAccount for RedisLoadAccount {
    async fn incr(&self, replica: usize) -> Result<i64, AppError> {
        let mut conn = self.connection().await?;
        redis::cmd("INCR")
            .arg(load_key(replica))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::BackendFailure(e.to_string()))
    }

    async fn decr(&self, replica: usize) -> Result<i64, AppError> {
        let mut conn = self.connection().await?;
        let value: i64 = redis::cmd("DECR")
            .arg(load_key(replica))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::BackendFailure(e.to_string()))?;

        if value < 0 {
            redis::cmd("SET")
                .arg(load_key(replica))
                .arg(0)
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| AppError::BackendFailure(e.to_string()))?;
            return Ok(0);
        }
        Ok(value)
    }

    async fn get(&self, replica: usize) -> Result<i64, AppError> {
        let mut conn = self.connection().await?;
        let value: Option<i64> = redis::cmd("GET")
            .arg(load_key(replica))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::BackendFailure(e.to_string()))?;
        Ok(value.unwrap_or(0))
    }
}

/// In-memory counter for tests and single-process demos, grounded in
/// `dashmap`/`arc-swap` (the concurrent-data-structure pair the broader
/// example corpus reaches for, e.g. `rcommerce`).
#[derive(Default)]
pub struct InMemoryLoadAccount {
    counters: DashMap<usize, AtomicI64>,
}

impl InMemoryLoadAccount {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoadAccount for InMemoryLoadAccount {
    async fn incr(&self, replica: usize) -> Result<i64, AppError> {
        let counter = self.counters.entry(replica).or_insert_with(|| AtomicI64::new(0));
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn decr(&self, replica: usize) -> Result<i64, AppError> {
        let counter = self.counters.entry(replica).or_insert_with(|| AtomicI64::new(0));
        let value = counter.fetch_sub(1, Ordering::SeqCst) - 1;
        if value < 0 {
            counter.store(0, Ordering::SeqCst);
            return Ok(0);
        }
        Ok(value)
    }

    async fn get(&self, replica: usize) -> Result<i64, AppError> {
        Ok(self
            .counters
            .get(&replica)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_then_decr_returns_to_zero() {
        let account = InMemoryLoadAccount::new();
        assert_eq!(account.incr(0).await.unwrap(), 1);
        assert_eq!(account.decr(0).await.unwrap(), 0);
        assert_eq!(account.get(0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn decr_below_zero_clamps_to_zero() {
        let account = InMemoryLoadAccount::new();
        assert_eq!(account.decr(0).await.unwrap(), 0);
        assert_eq!(account.get(0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn counters_are_independent_per_replica() {
        let account = InMemoryLoadAccount::new();
        account.incr(0).await.unwrap();
        account.incr(0).await.unwrap();
        account.incr(1).await.unwrap();
        assert_eq!(account.get(0).await.unwrap(), 2);
        assert_eq!(account.get(1).await.unwrap(), 1);
    }
}
