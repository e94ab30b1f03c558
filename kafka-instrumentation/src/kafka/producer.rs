use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rdkafka::error::KafkaError;
use rdkafka::message::{Header, Message, OwnedHeaders};
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::context::InstrumentedContext;
use super::record_size::record_len;
use super::{Compression, Record, RecordHeader};
use crate::config::{ConfigError, KafkaConfig, ProducerConfig};
use crate::instrumentation::Instrumentation;
use crate::outcome::OperationContext;
use crate::producer::{ProducerMetrics, RecordCompletion};
use crate::protocol::{BrokerError, KafkaErrorCode};
use crate::registry::ClientKind;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const PARTITION_LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Error, Debug, Clone)]
pub enum ProduceError {
    #[error("failed to produce to kafka: {0}")]
    Kafka(#[from] KafkaError),
    #[error("delivery report dropped before acknowledgement")]
    DeliveryCanceled,
    #[error("operation context done before delivery")]
    ContextDone,
    #[error("producer is closed")]
    Closed,
    #[error("invalid producer configuration: {0}")]
    Config(#[from] ConfigError),
}

impl BrokerError for ProduceError {
    fn protocol_code(&self) -> Option<KafkaErrorCode> {
        match self {
            ProduceError::Kafka(err) => err.protocol_code(),
            _ => None,
        }
    }
}

struct InFlight {
    topic: String,
    partition: Option<i32>,
    size: u64,
    delivery: Result<DeliveryFuture, ProduceError>,
}

/// A `FutureProducer` reporting every record outcome exactly once.
///
/// In sync mode `produce` returns once every record settled. In async mode it returns
/// after enqueueing and the deliveries are recorded in the background; `close` waits for
/// them either way, including calls that were admitted before the producer closed.
pub struct InstrumentedProducer {
    producer: FutureProducer<InstrumentedContext>,
    metrics: ProducerMetrics,
    compression: Compression,
    sync: bool,
    closed: AtomicBool,
    tracker: TaskTracker,
    // Partition counts per wire topic, for records that never reach librdkafka
    partition_counts: Mutex<HashMap<String, usize>>,
}

impl InstrumentedProducer {
    pub fn new(
        common: &KafkaConfig,
        config: &ProducerConfig,
        instrumentation: &Instrumentation,
    ) -> Result<Self, ProduceError> {
        info!("connecting to Kafka brokers at {}...", common.kafka_hosts);

        let client_config = config.client_config(common)?;
        let producer = Self::from_client_config(
            &client_config,
            config.compression()?,
            config.kafka_producer_sync,
            instrumentation,
        )?;

        // Ping the cluster to make sure we can reach brokers
        drop(producer.producer.client().fetch_metadata(
            Some("__consumer_offsets"),
            Timeout::After(METADATA_TIMEOUT),
        )?);
        info!("connected to Kafka brokers");

        Ok(producer)
    }

    pub fn from_client_config(
        client_config: &ClientConfig,
        compression: Compression,
        sync: bool,
        instrumentation: &Instrumentation,
    ) -> Result<Self, ProduceError> {
        debug!("rdkafka configuration: {:?}", client_config);
        let context = InstrumentedContext::new(instrumentation.rpc_tap(ClientKind::Producer));
        let producer: FutureProducer<InstrumentedContext> =
            client_config.create_with_context(context)?;

        Ok(Self {
            producer,
            metrics: instrumentation.producer(),
            compression,
            sync,
            closed: AtomicBool::new(false),
            tracker: TaskTracker::new(),
            partition_counts: Mutex::new(HashMap::new()),
        })
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn produce_one(
        &self,
        ctx: &OperationContext,
        record: Record,
    ) -> Result<(), ProduceError> {
        self.produce(ctx, vec![record]).await.pop().unwrap_or(Ok(()))
    }

    /// Enqueues every record and returns one result per record, in order. In async mode
    /// only enqueue failures are reported here.
    ///
    /// Context metadata is forwarded as record headers and counted in the record size.
    pub async fn produce(
        &self,
        ctx: &OperationContext,
        records: Vec<Record>,
    ) -> Vec<Result<(), ProduceError>> {
        // Taken before the closed check and held until the settle future is tracked, so
        // a concurrent close waits for this call.
        let admission = self.tracker.token();

        let mut in_flight: Vec<InFlight> = records
            .into_iter()
            .map(|record| self.enqueue(ctx, record))
            .collect();
        self.resolve_partitions(&mut in_flight).await;

        let codec = self.compression.as_str();
        if self.sync {
            let settled = settle(self.metrics.clone(), ctx.clone(), in_flight, codec);
            let results = self.tracker.track_future(settled).await;
            drop(admission);
            return results;
        }

        let enqueued = in_flight
            .iter()
            .map(|record| match &record.delivery {
                Ok(_) => Ok(()),
                Err(err) => Err(err.clone()),
            })
            .collect();
        self.tracker.spawn(settle(self.metrics.clone(), ctx.clone(), in_flight, codec));
        drop(admission);
        enqueued
    }

    /// Refuses new records, flushes the client queue and waits until every delivery has
    /// been recorded.
    pub async fn close(&self) -> Result<(), ProduceError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            self.tracker.wait().await;
            return Ok(());
        }
        self.tracker.close();

        let flushed = self.producer.flush(FLUSH_TIMEOUT);
        if let Err(err) = &flushed {
            error!("failed to flush kafka producer: {}", err);
        }

        self.tracker.wait().await;
        info!("kafka producer closed");
        flushed.map_err(ProduceError::from)
    }

    fn enqueue(&self, ctx: &OperationContext, record: Record) -> InFlight {
        let record = with_context_headers(record, ctx);
        let topic = self.metrics.attributes().full_topic(&record.topic);
        let size = u64::try_from(record_len(&record)).unwrap_or(u64::MAX);
        let partition = record.partition;

        let delivery = if self.is_closed() {
            Err(ProduceError::Closed)
        } else if ctx.done_reason().is_some() {
            Err(ProduceError::ContextDone)
        } else {
            self.send(&topic, &record)
        };

        InFlight {
            topic,
            partition,
            size,
            delivery,
        }
    }

    // Records refused before librdkafka assigned a partition report partition 0 when the
    // topic has a single partition, and none otherwise.
    async fn resolve_partitions(&self, in_flight: &mut [InFlight]) {
        for record in in_flight
            .iter_mut()
            .filter(|record| record.delivery.is_err() && record.partition.is_none())
        {
            record.partition = self.single_partition(&record.topic).await;
        }
    }

    async fn single_partition(&self, topic: &str) -> Option<i32> {
        let cached = match self.partition_counts.lock() {
            Ok(counts) => counts.get(topic).copied(),
            Err(_) => None,
        };
        let count = match cached {
            Some(count) => count,
            None => {
                let count = self.fetch_partition_count(topic).await?;
                if let Ok(mut counts) = self.partition_counts.lock() {
                    counts.insert(topic.to_string(), count);
                }
                count
            }
        };
        (count == 1).then_some(0)
    }

    async fn fetch_partition_count(&self, topic: &str) -> Option<usize> {
        let producer = self.producer.clone();
        let name = topic.to_string();
        let fetched = tokio::task::spawn_blocking(move || {
            let metadata = producer
                .client()
                .fetch_metadata(Some(&name), Timeout::After(PARTITION_LOOKUP_TIMEOUT))?;
            Ok::<_, KafkaError>(
                metadata
                    .topics()
                    .iter()
                    .find(|found| found.name() == name.as_str() && found.error().is_none())
                    .map(|found| found.partitions().len()),
            )
        })
        .await;

        match fetched {
            Ok(Ok(count)) => count,
            Ok(Err(err)) => {
                debug!("partition lookup for {} failed: {}", topic, err);
                None
            }
            Err(err) => {
                warn!("partition lookup for {} did not complete: {}", topic, err);
                None
            }
        }
    }

    fn send(&self, topic: &str, record: &Record) -> Result<DeliveryFuture, ProduceError> {
        let mut future_record: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(topic);
        if let Some(key) = &record.key {
            future_record = future_record.key(key.as_slice());
        }
        if let Some(value) = &record.value {
            future_record = future_record.payload(value.as_slice());
        }
        if let Some(partition) = record.partition {
            future_record = future_record.partition(partition);
        }
        if let Some(timestamp) = record.timestamp {
            future_record = future_record.timestamp(timestamp);
        }
        if !record.headers.is_empty() {
            let headers = record.headers.iter().fold(
                OwnedHeaders::new_with_capacity(record.headers.len()),
                |headers, header| {
                    headers.insert(Header {
                        key: header.key.as_str(),
                        value: header.value.as_deref(),
                    })
                },
            );
            future_record = future_record.headers(headers);
        }

        match self.producer.send_result(future_record) {
            Ok(delivery) => Ok(delivery),
            Err((err, _)) => {
                warn!("failed to enqueue record for {}: {}", topic, err);
                Err(ProduceError::Kafka(err))
            }
        }
    }
}

/// Appends the context metadata as headers. Headers the record already sets win.
fn with_context_headers(mut record: Record, ctx: &OperationContext) -> Record {
    for (key, value) in ctx.metadata() {
        if record.header(key).is_none() {
            record.headers.push(RecordHeader::new(
                key.clone(),
                Some(value.clone().into_bytes()),
            ));
        }
    }
    record
}

struct Settled {
    topic: String,
    partition: Option<i32>,
    size: u64,
    result: Result<(), ProduceError>,
}

/// Waits for every delivery, then records the whole batch at once.
async fn settle(
    metrics: ProducerMetrics,
    ctx: OperationContext,
    in_flight: Vec<InFlight>,
    codec: &'static str,
) -> Vec<Result<(), ProduceError>> {
    let mut settled = Vec::with_capacity(in_flight.len());
    for record in in_flight {
        let (result, partition) = match record.delivery {
            Ok(delivery) => await_delivery(&ctx, delivery).await,
            Err(err) => (Err(err), None),
        };
        settled.push(Settled {
            topic: record.topic,
            partition: partition.or(record.partition),
            size: record.size,
            result,
        });
    }

    // librdkafka compresses whole message sets and never reports a per record
    // compressed size, so the encoded size stands in for the wire size.
    metrics.record_batch(
        &ctx,
        settled.iter().map(|record| RecordCompletion {
            topic: record.topic.as_str(),
            partition: record.partition,
            wire_bytes: record.size,
            uncompressed_bytes: record.size,
            codec,
            result: record.result.as_ref().map(|_| ()),
        }),
    );

    settled.into_iter().map(|record| record.result).collect()
}

async fn await_delivery(
    ctx: &OperationContext,
    delivery: DeliveryFuture,
) -> (Result<(), ProduceError>, Option<i32>) {
    tokio::select! {
        biased;
        delivered = delivery => match delivered {
            Ok(Ok((partition, _offset))) => (Ok(()), Some(partition)),
            Ok(Err((err, message))) => {
                debug!("kafka delivery failed: {}", err);
                let partition = Some(message.partition()).filter(|partition| *partition >= 0);
                (Err(ProduceError::Kafka(err)), partition)
            }
            // Cancelled due to timeout while retrying
            Err(_) => (Err(ProduceError::DeliveryCanceled), None),
        },
        _ = ctx.done() => (Err(ProduceError::ContextDone), None),
    }
}
