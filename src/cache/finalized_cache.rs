use redis::AsyncCommands;

use crate::config::CacheSettings;
use crate::error::{AppError, Result};
use crate::models::FinalizedOrder;
use crate::observability::get_metrics;

/// Redis read-through cache of finalized orders.
///
/// Only orders already in `SUCCESS` with a complete ticket set are stored, so
/// a hit can be served without touching the database. The cache is never
/// consulted for claims. Redis failures degrade to a miss.
pub struct FinalizedOrderCache {
    client: redis::Client,
    settings: CacheSettings,
}

impl FinalizedOrderCache {
    pub fn new(client: redis::Client, settings: CacheSettings) -> Self {
        Self { client, settings }
    }

    fn cache_key(&self, reference: &str) -> String {
        format!("{}:order:{}", self.settings.key_prefix, reference)
    }

    pub async fn get(&self, reference: &str) -> Option<FinalizedOrder> {
        if !self.settings.enabled {
            return None;
        }

        let key = self.cache_key(reference);
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Redis connection error in cache get: {}", e);
                return None;
            }
        };

        let cached: Option<String> = match conn.get(&key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Redis get error: {}", e);
                return None;
            }
        };

        let order = cached.and_then(|json| match serde_json::from_str::<FinalizedOrder>(&json) {
            Ok(order) => Some(order),
            Err(e) => {
                tracing::warn!(reference = %reference, "Discarding undecodable cached order: {}", e);
                None
            }
        });

        get_metrics().record_cache_lookup(order.is_some());
        order
    }

    /// Caches a finalized order. Incomplete or non-success orders are skipped.
    pub async fn put(&self, finalized: &FinalizedOrder) -> Result<()> {
        if !self.settings.enabled
            || !finalized.order.status.is_final()
            || !finalized.is_complete()
        {
            return Ok(());
        }

        let json = serde_json::to_string(finalized)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize order: {}", e)))?;

        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Redis connection error in cache set: {}", e);
                return Ok(());
            }
        };

        let key = self.cache_key(&finalized.order.reference);
        if let Err(e) = conn
            .set_ex::<_, _, ()>(&key, json, self.settings.ttl_seconds)
            .await
        {
            tracing::warn!("Redis set error: {}", e);
        } else {
            tracing::debug!(
                reference = %finalized.order.reference,
                ttl_secs = self.settings.ttl_seconds,
                "Cached finalized order"
            );
        }

        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    /// Drops a cached order, e.g. after the auditor changed its ticket set.
    pub async fn invalidate(&self, reference: &str) {
        if !self.settings.enabled {
            return;
        }

        match self.client.get_multiplexed_async_connection().await {
            Ok(mut conn) => {
                if let Err(e) = conn.del::<_, ()>(self.cache_key(reference)).await {
                    tracing::warn!("Redis del error: {}", e);
                }
            }
            Err(e) => tracing::warn!("Redis connection error in cache invalidate: {}", e),
        }
    }
}
