use crate::config::KafkaSettings;
use crate::error::{AppError, Result};
use crate::observability::get_metrics;
use anyhow::anyhow;
use chrono::Utc;
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder};
use rskafka::record::Record;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::types::{DomainEvent, EventEnvelope};

/// Header carrying the envelope's event type, so consumers can route without
/// decoding the payload.
pub const EVENT_TYPE_HEADER: &str = "event_type";

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub brokers: Vec<String>,
    pub topic_prefix: String,
    /// Extra attempts after the first produce call fails.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further attempt.
    pub base_backoff: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic_prefix: "ticketing".to_string(),
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
        }
    }
}

impl From<&KafkaSettings> for ProducerConfig {
    fn from(settings: &KafkaSettings) -> Self {
        Self {
            brokers: settings
                .brokers
                .split(',')
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect(),
            topic_prefix: settings.topic_prefix.clone(),
            ..Self::default()
        }
    }
}

impl ProducerConfig {
    fn backoff(&self, retry: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

/// Publishes finalization events to Kafka, one partition per topic.
pub struct EventProducer {
    config: ProducerConfig,
    client: Option<Client>,
    partitions: RwLock<HashMap<String, Arc<PartitionClient>>>,
}

impl EventProducer {
    pub fn new(config: ProducerConfig) -> Self {
        Self {
            config,
            client: None,
            partitions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        info!(brokers = ?self.config.brokers, "Connecting event producer");

        let client = ClientBuilder::new(self.config.brokers.clone())
            .build()
            .await
            .map_err(|e| AppError::Internal(anyhow!("Kafka bootstrap failed: {}", e)))?;

        self.client = Some(client);
        info!("Event producer connected");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub fn topic_name(&self, topic: &str) -> String {
        match self.config.topic_prefix.as_str() {
            "" => topic.to_string(),
            prefix => format!("{}.{}", prefix, topic),
        }
    }

    async fn partition(&self, topic: &str) -> Result<Arc<PartitionClient>> {
        if let Some(partition) = self.partitions.read().await.get(topic) {
            return Ok(partition.clone());
        }

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow!("event producer is not connected")))?;

        let partition = Arc::new(
            client
                .partition_client(topic.to_string(), 0, UnknownTopicHandling::Retry)
                .await?,
        );

        // A concurrent publisher may have won; keep whichever landed first.
        let mut partitions = self.partitions.write().await;
        Ok(partitions
            .entry(topic.to_string())
            .or_insert(partition)
            .clone())
    }

    /// Wraps the event in an envelope and publishes it keyed by its
    /// reference. Returns the partition offset.
    pub async fn publish<T: DomainEvent>(&self, event: T) -> Result<i64> {
        let topic = self.topic_name(T::topic());
        let record = Self::encode(event)?;

        let result = self.produce(&topic, record).await;
        get_metrics().record_kafka_message(&topic, result.is_ok());
        result
    }

    fn encode<T: DomainEvent>(event: T) -> Result<Record> {
        let key = event.key().as_bytes().to_vec();
        let envelope = EventEnvelope::new(event);
        let value = serde_json::to_vec(&envelope)
            .map_err(|e| AppError::Internal(anyhow!("event encoding failed: {}", e)))?;

        let mut headers = BTreeMap::new();
        headers.insert(
            EVENT_TYPE_HEADER.to_string(),
            envelope.event_type.as_str().as_bytes().to_vec(),
        );

        Ok(Record {
            key: Some(key),
            value: Some(value),
            headers,
            timestamp: Utc::now(),
        })
    }

    async fn produce(&self, topic: &str, record: Record) -> Result<i64> {
        let partition = self.partition(topic).await?;

        let mut retry = 0;
        loop {
            match partition
                .produce(vec![record.clone()], Compression::NoCompression)
                .await
            {
                Ok(offsets) => {
                    let offset = offsets.first().copied().unwrap_or_default();
                    debug!(topic = %topic, offset, "Event published");
                    return Ok(offset);
                }
                Err(e) if retry < self.config.max_retries => {
                    retry += 1;
                    let delay = self.config.backoff(retry);
                    warn!(topic = %topic, retry, ?delay, "Event publish failed, retrying: {}", e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Publishes through an optional producer; failures are logged, never raised.
/// Events describe state that is already durable in the order store.
pub async fn publish_best_effort<T: DomainEvent>(producer: Option<&EventProducer>, event: T) {
    let Some(producer) = producer else {
        return;
    };

    if let Err(e) = producer.publish(event).await {
        warn!(topic = T::topic(), "Event publish failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TicketsRepairedEvent;
    use tokio_test::assert_err;

    fn repaired() -> TicketsRepairedEvent {
        TicketsRepairedEvent {
            order_id: uuid::Uuid::new_v4(),
            reference: "TIX_ABC".to_string(),
            inserted_indices: vec![1],
            ticket_count: 1,
            repaired_at: Utc::now(),
        }
    }

    #[test]
    fn test_config_from_settings() {
        let config = ProducerConfig::from(&KafkaSettings {
            enabled: true,
            brokers: "kafka-1:9092, kafka-2:9092,".to_string(),
            topic_prefix: "tix".to_string(),
        });

        assert_eq!(config.brokers, vec!["kafka-1:9092", "kafka-2:9092"]);
        assert_eq!(config.topic_prefix, "tix");
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_backoff_doubles() {
        let config = ProducerConfig::default();
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_topic_name() {
        let producer = EventProducer::new(ProducerConfig::default());
        assert_eq!(producer.topic_name("orders.finalized"), "ticketing.orders.finalized");
        assert!(!producer.is_connected());

        let bare = EventProducer::new(ProducerConfig {
            topic_prefix: String::new(),
            ..ProducerConfig::default()
        });
        assert_eq!(bare.topic_name("orders.finalized"), "orders.finalized");
    }

    #[test]
    fn test_record_is_keyed_by_reference() {
        let record = EventProducer::encode(repaired()).unwrap();
        assert_eq!(record.key.as_deref(), Some(b"TIX_ABC".as_slice()));
        assert_eq!(
            record.headers.get(EVENT_TYPE_HEADER).map(Vec::as_slice),
            Some(b"TICKETS_REPAIRED".as_slice())
        );

        let envelope: serde_json::Value = serde_json::from_slice(&record.value.unwrap()).unwrap();
        assert_eq!(envelope["event_type"], "TICKETS_REPAIRED");
        assert_eq!(envelope["payload"]["reference"], "TIX_ABC");
    }

    #[tokio::test]
    async fn test_publish_without_connection_fails() {
        let producer = EventProducer::new(ProducerConfig::default());
        assert_err!(producer.publish(repaired()).await);
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let producer = EventProducer::new(ProducerConfig::default());
        publish_best_effort(Some(&producer), repaired()).await;
        publish_best_effort::<TicketsRepairedEvent>(None, repaired()).await;
    }
}
