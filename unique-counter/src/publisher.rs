use std::time::Duration;

use async_trait::async_trait;
use metrics::gauge;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::KafkaConfig;
use crate::prometheus::KAFKA_PRODUCER_QUEUE_DEPTH;

/// One window's unique count, keyed by the second the window was rotated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedMessage {
    pub window_end: i64,
    pub unique_count: u64,
    pub window: Duration,
}

impl AggregatedMessage {
    pub fn key(&self) -> String {
        self.window_end.to_string()
    }

    pub fn payload(&self) -> String {
        if self.window == Duration::from_secs(60) {
            format!("Unique requests in last minute: {}", self.unique_count)
        } else {
            format!(
                "Unique requests in last {}s: {}",
                self.window.as_secs(),
                self.unique_count
            )
        }
    }
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to produce aggregated count: {0}")]
    Kafka(#[from] KafkaError),
    #[error("delivery of aggregated count was cancelled")]
    Cancelled,
}

#[async_trait]
pub trait Publisher {
    /// Submit the message once. Failures are returned for logging, never retried.
    async fn publish(&self, message: AggregatedMessage) -> Result<(), PublishError>;
}

pub struct PrintPublisher {}

#[async_trait]
impl Publisher for PrintPublisher {
    async fn publish(&self, message: AggregatedMessage) -> Result<(), PublishError> {
        info!(key = %message.key(), "aggregated message: {}", message.payload());
        Ok(())
    }
}

struct KafkaContext;

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        gauge!(KAFKA_PRODUCER_QUEUE_DEPTH).set(stats.msg_cnt as f64);
    }
}

#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer<KafkaContext>,
    topic: String,
}

impl KafkaPublisher {
    pub fn new(config: KafkaConfig) -> anyhow::Result<KafkaPublisher> {
        info!("connecting to Kafka brokers at {}...", config.kafka_hosts);

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("linger.ms", config.kafka_producer_linger_ms.to_string())
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            )
            // a single delivery attempt per aggregated count
            .set("message.send.max.retries", "0")
            .set("compression.codec", &config.kafka_compression_codec);

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer<KafkaContext> =
            client_config.create_with_context(KafkaContext)?;

        // Brokers being down must not stop ingestion, so only warn here
        match producer.client().fetch_metadata(
            Some(config.kafka_topic.as_str()),
            Timeout::After(Duration::new(10, 0)),
        ) {
            Ok(_) => info!("connected to Kafka brokers"),
            Err(err) => warn!("could not reach Kafka brokers yet: {}", err),
        }

        Ok(KafkaPublisher {
            producer,
            topic: config.kafka_topic,
        })
    }

    pub fn flush(&self) -> Result<(), KafkaError> {
        self.producer.flush(Duration::new(30, 0))
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, message: AggregatedMessage) -> Result<(), PublishError> {
        let key = message.key();
        let payload = message.payload();

        let delivery = self
            .producer
            .send_result(FutureRecord::to(&self.topic).key(&key).payload(&payload))
            .map_err(|(err, _)| PublishError::Kafka(err))?;

        match delivery.await {
            Err(_) => Err(PublishError::Cancelled),
            Ok(Err((err, _))) => Err(PublishError::Kafka(err)),
            Ok(Ok(_)) => {
                info!("sent unique request count to Kafka: {}", message.unique_count);
                Ok(())
            }
        }
    }
}
