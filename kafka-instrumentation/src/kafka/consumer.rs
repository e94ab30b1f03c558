use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use futures::StreamExt;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::message::{Headers, Message};
use rdkafka::ClientConfig;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::context::InstrumentedContext;
use super::{is_trace_header, Record, RecordHeader};
use crate::config::{ConfigError, ConsumerConfig, KafkaConfig};
use crate::consumer::{ConsumerMetrics, FetchedBatch};
use crate::instrumentation::Instrumentation;
use crate::registry::ClientKind;

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("invalid consumer configuration: {0}")]
    Config(#[from] ConfigError),
}

/// A fetched record, with its topic stripped of the namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedRecord {
    pub record: Record,
    pub offset: i64,
}

#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, records: Vec<ConsumedRecord>) -> anyhow::Result<()>;
}

// A message copied out of the client buffers, topic still on the wire name.
#[derive(Debug)]
struct Fetched {
    topic: String,
    partition: i32,
    offset: i64,
    timestamp: Option<i64>,
    key: Option<Vec<u8>>,
    value: Option<Vec<u8>>,
    headers: Vec<RecordHeader>,
}

impl Fetched {
    fn from_message<M: Message>(message: &M) -> Self {
        let headers = message
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .filter(|header| !is_trace_header(header.key))
                    .map(|header| {
                        RecordHeader::new(header.key, header.value.map(<[u8]>::to_vec))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            timestamp: message.timestamp().to_millis(),
            key: message.key().map(<[u8]>::to_vec),
            value: message.payload().map(<[u8]>::to_vec),
            headers,
        }
    }
}

/// The time a record was produced, from its embedded millisecond timestamp.
fn produce_time(millis: Option<i64>) -> Option<SystemTime> {
    let millis = u64::try_from(millis?).ok()?;
    SystemTime::UNIX_EPOCH.checked_add(Duration::from_millis(millis))
}

/// Groups fetched messages per topic partition, keeping fetch order inside each group.
fn batches(fetched: &[Fetched]) -> Vec<FetchedBatch<'_>> {
    let mut grouped: BTreeMap<(&str, i32), Vec<Option<SystemTime>>> = BTreeMap::new();
    for message in fetched {
        grouped
            .entry((message.topic.as_str(), message.partition))
            .or_default()
            .push(produce_time(message.timestamp));
    }
    grouped
        .into_iter()
        .map(|((topic, partition), timestamps)| FetchedBatch {
            topic,
            partition,
            timestamps,
        })
        .collect()
}

/// A `StreamConsumer` recording fetch metrics for every chunk it hands to a [`Processor`].
pub struct InstrumentedConsumer {
    consumer: StreamConsumer<InstrumentedContext>,
    metrics: ConsumerMetrics,
    processor: Arc<dyn Processor>,
    max_batch: usize,
}

impl InstrumentedConsumer {
    pub fn new(
        common: &KafkaConfig,
        config: &ConsumerConfig,
        instrumentation: &Instrumentation,
        processor: Arc<dyn Processor>,
    ) -> Result<Self, ConsumerError> {
        let client_config = config.client_config(common)?;
        Self::from_client_config(
            &client_config,
            &config.topics()?,
            config.kafka_consumer_max_batch,
            instrumentation,
            processor,
        )
    }

    /// Subscribes to `topics`, given without the namespace prefix.
    pub fn from_client_config(
        client_config: &ClientConfig,
        topics: &[String],
        max_batch: usize,
        instrumentation: &Instrumentation,
        processor: Arc<dyn Processor>,
    ) -> Result<Self, ConsumerError> {
        debug!("rdkafka configuration: {:?}", client_config);
        let context = InstrumentedContext::new(instrumentation.rpc_tap(ClientKind::Consumer));
        let consumer: StreamConsumer<InstrumentedContext> =
            client_config.create_with_context(context)?;

        let metrics = instrumentation.consumer();
        let full_topics: Vec<String> = topics
            .iter()
            .map(|topic| metrics.attributes().full_topic(topic))
            .collect();
        let subscription: Vec<&str> = full_topics.iter().map(String::as_str).collect();
        consumer.subscribe(&subscription)?;
        info!(topics = ?full_topics, "subscribed kafka consumer");

        Ok(Self {
            consumer,
            metrics,
            processor,
            max_batch: max_batch.max(1),
        })
    }

    pub fn inner(&self) -> &StreamConsumer<InstrumentedContext> {
        &self.consumer
    }

    /// Consumes until `shutdown` fires or the client reports a fatal error.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ConsumerError> {
        info!("starting instrumented kafka consumption...");
        let mut stream = self.consumer.stream().ready_chunks(self.max_batch);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown signal received, stopping consumption");
                    break;
                }
                chunk = stream.next() => {
                    let Some(chunk) = chunk else {
                        warn!("kafka message stream ended");
                        break;
                    };
                    self.handle_chunk(chunk).await?;
                }
            }
        }

        Ok(())
    }

    async fn handle_chunk<M: Message>(
        &self,
        chunk: Vec<KafkaResult<M>>,
    ) -> Result<(), ConsumerError> {
        let mut fetched = Vec::with_capacity(chunk.len());
        for result in chunk {
            match result {
                Ok(message) => fetched.push(Fetched::from_message(&message)),
                Err(err @ KafkaError::MessageConsumptionFatal(_)) => {
                    error!("fatal kafka consumer error: {}", err);
                    return Err(err.into());
                }
                Err(err) => warn!("kafka consumer error: {}", err),
            }
        }
        if fetched.is_empty() {
            return Ok(());
        }

        for batch in batches(&fetched) {
            self.metrics.record_fetch(&batch);
        }

        let records = fetched
            .into_iter()
            .map(|message| self.consumed(message))
            .collect();
        if let Err(err) = self.processor.process(records).await {
            error!("error processing fetched records: {err:#}");
        }
        Ok(())
    }

    fn consumed(&self, message: Fetched) -> ConsumedRecord {
        let topic = self.metrics.attributes().logical_topic(&message.topic).to_string();
        ConsumedRecord {
            record: Record {
                topic,
                partition: Some(message.partition),
                key: message.key,
                value: message.value,
                headers: message.headers,
                timestamp: message.timestamp,
            },
            offset: message.offset,
        }
    }
}
