use std::net::SocketAddr;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use tracing::Level;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "0.0.0.0:8080")]
    pub address: SocketAddr,

    #[envconfig(default = "redis://localhost:6379/")]
    pub redis_url: String,

    #[envconfig(default = "unique_ids")]
    pub redis_key: String,

    #[envconfig(default = "100")]
    pub redis_timeout_ms: EnvMsDuration,

    #[envconfig(default = "60000")]
    pub window_interval_ms: NonZeroMsDuration,

    #[envconfig(default = "5000")]
    pub notify_timeout_ms: EnvMsDuration,

    #[envconfig(default = "false")]
    pub print_sink: bool,

    // Used for integration tests
    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    pub otel_url: Option<String>,

    #[envconfig(default = "1.0")]
    pub otel_sampling_rate: f64,

    #[envconfig(default = "unique-counter")]
    pub otel_service_name: String,

    #[envconfig(from = "OTEL_LOG_LEVEL", default = "info")]
    pub log_level: Level,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,
}

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic
    #[envconfig(default = "10000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message: 10 seconds
    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,
    #[envconfig(default = "unique-requests")]
    pub kafka_topic: String,
    #[envconfig(default = "false")]
    pub kafka_tls: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

/// A millisecond duration that must be strictly positive, for intervals fed to
/// a ticker.
#[derive(Debug, Clone, Copy)]
pub struct NonZeroMsDuration(pub time::Duration);

impl FromStr for NonZeroMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let EnvMsDuration(duration) = s.parse()?;
        if duration.is_zero() {
            return Err(ParseEnvMsDurationError);
        }

        Ok(NonZeroMsDuration(duration))
    }
}
