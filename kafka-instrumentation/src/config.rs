use std::str::FromStr;

use envconfig::Envconfig;
use rdkafka::ClientConfig;
use thiserror::Error;

use crate::instrumentation::InstrumentationConfig;
use crate::kafka::Compression;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported compression codec: {0}")]
    UnsupportedCodec(String),
    #[error("no consumer topics configured")]
    NoTopics,
    #[error("invalid offset reset policy: {0}")]
    InvalidOffsetReset(String),
}

#[derive(Envconfig, Clone, Debug)]
pub struct KafkaConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    // Prefix of every topic, "{namespace}-{topic}"; empty for none
    #[envconfig(default = "")]
    pub kafka_namespace: String,

    #[envconfig(default = "")]
    pub kafka_client_id: String,

    // Broker round trip latencies are derived from client statistics, 0 disables them
    #[envconfig(default = "10000")]
    pub kafka_statistics_interval_ms: u32,
}

impl KafkaConfig {
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.kafka_hosts)
            .set(
                "statistics.interval.ms",
                self.kafka_statistics_interval_ms.to_string(),
            );

        if !self.kafka_client_id.is_empty() {
            client_config.set("client.id", &self.kafka_client_id);
        }

        if self.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        client_config
    }

    /// Instrumentation settings sharing this client's topic namespace.
    pub fn instrumentation_config(&self) -> InstrumentationConfig {
        InstrumentationConfig::new(self.kafka_namespace.clone())
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct ProducerConfig {
    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic

    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message: 20 seconds

    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd

    #[envconfig(default = "400")]
    pub kafka_producer_queue_mib: u32, // Size of the in-memory producer queue in mebibytes

    // Wait for every delivery report before produce returns
    #[envconfig(default = "true")]
    pub kafka_producer_sync: bool,

    // How long an unknown topic may take to show up in metadata before records fail with
    // an unknown topic error. Capped below the message timeout.
    #[envconfig(default = "5000")]
    pub kafka_topic_metadata_propagation_max_ms: u32,
}

impl ProducerConfig {
    pub fn compression(&self) -> Result<Compression, ConfigError> {
        Compression::from_str(&self.kafka_compression_codec)
    }

    /// Metadata propagation wait actually applied. It stays below the message timeout so
    /// a record for a missing topic fails as unknown topic rather than timing out locally.
    pub fn topic_metadata_propagation_ms(&self) -> u32 {
        self.kafka_topic_metadata_propagation_max_ms
            .min(self.kafka_message_timeout_ms / 2)
    }

    pub fn client_config(&self, common: &KafkaConfig) -> Result<ClientConfig, ConfigError> {
        let compression = self.compression()?;
        let mut client_config = common.client_config();
        client_config
            .set("linger.ms", self.kafka_producer_linger_ms.to_string())
            .set(
                "message.timeout.ms",
                self.kafka_message_timeout_ms.to_string(),
            )
            .set("compression.codec", compression.as_str())
            .set(
                "queue.buffering.max.kbytes",
                (self.kafka_producer_queue_mib * 1024).to_string(),
            )
            .set(
                "topic.metadata.propagation.max.ms",
                self.topic_metadata_propagation_ms().to_string(),
            );
        Ok(client_config)
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct ConsumerConfig {
    pub kafka_consumer_group: String,

    // Comma separated, without the namespace prefix
    pub kafka_consumer_topics: String,

    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String, // earliest, latest

    // Maximum number of records read from the stream before metrics are recorded
    #[envconfig(default = "100")]
    pub kafka_consumer_max_batch: usize,
}

impl ConsumerConfig {
    pub fn topics(&self) -> Result<Vec<String>, ConfigError> {
        let topics: Vec<String> = self
            .kafka_consumer_topics
            .split(',')
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
            .map(str::to_string)
            .collect();
        if topics.is_empty() {
            return Err(ConfigError::NoTopics);
        }
        Ok(topics)
    }

    pub fn client_config(&self, common: &KafkaConfig) -> Result<ClientConfig, ConfigError> {
        match self.kafka_consumer_offset_reset.as_str() {
            "earliest" | "latest" => {}
            other => return Err(ConfigError::InvalidOffsetReset(other.to_string())),
        }

        let mut client_config = common.client_config();
        client_config
            .set("group.id", &self.kafka_consumer_group)
            .set("auto.offset.reset", &self.kafka_consumer_offset_reset)
            .set("enable.partition.eof", "false");
        Ok(client_config)
    }
}
