use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kafka_instrumentation::config::{ConsumerConfig, KafkaConfig, ProducerConfig};
use kafka_instrumentation::kafka::consumer::{ConsumedRecord, InstrumentedConsumer, Processor};
use kafka_instrumentation::kafka::producer::InstrumentedProducer;
use kafka_instrumentation::kafka::Record;
use kafka_instrumentation::metrics_consts::{CONSUMER_MESSAGES_DELAY, CONSUMER_MESSAGES_FETCHED};
use kafka_instrumentation::test_utils::TestRecorder;
use kafka_instrumentation::OperationContext;
use rdkafka::mocking::MockCluster;
use tokio_util::sync::CancellationToken;

mod common;

use common::{constant_attribute, instrumentation, NAMESPACE};

const RECORDS: usize = 10;

struct Collector {
    records: Mutex<Vec<ConsumedRecord>>,
    done: CancellationToken,
}

#[async_trait]
impl Processor for Collector {
    async fn process(&self, records: Vec<ConsumedRecord>) -> anyhow::Result<()> {
        let mut collected = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("collector poisoned"))?;
        collected.extend(records);
        if collected.len() >= RECORDS {
            self.done.cancel();
        }
        Ok(())
    }
}

#[tokio::test]
async fn fetched_records_are_counted_and_delayed_without_trace_headers() -> anyhow::Result<()> {
    let cluster = MockCluster::new(1)?;
    cluster.create_topic("name_space-fetched-topic", 1, 1)?;
    let common = KafkaConfig {
        kafka_hosts: cluster.bootstrap_servers(),
        kafka_tls: false,
        kafka_namespace: NAMESPACE.to_string(),
        kafka_client_id: String::new(),
        kafka_statistics_interval_ms: 0,
    };

    let producer = InstrumentedProducer::new(
        &common,
        &ProducerConfig {
            kafka_producer_linger_ms: 0,
            kafka_message_timeout_ms: 5000,
            kafka_compression_codec: "none".to_string(),
            kafka_producer_queue_mib: 50,
            kafka_producer_sync: true,
            kafka_topic_metadata_propagation_max_ms: 1000,
        },
        &instrumentation(&TestRecorder::new(), None),
    )?;
    let records = (0..RECORDS)
        .map(|i| {
            Record::new("fetched-topic", i.to_string().into_bytes())
                .with_header("header", b"included".to_vec())
                .with_header("traceparent", b"excluded".to_vec())
        })
        .collect();
    let produced = producer
        .produce(
            &OperationContext::new().with_timeout(Duration::from_secs(30)),
            records,
        )
        .await;
    assert!(produced.iter().all(Result::is_ok), "{produced:?}");
    producer.close().await?;

    let recorder = TestRecorder::new();
    let done = CancellationToken::new();
    let collector = Arc::new(Collector {
        records: Mutex::new(Vec::new()),
        done: done.clone(),
    });
    let consumer = InstrumentedConsumer::new(
        &common,
        &ConsumerConfig {
            kafka_consumer_group: "fetched-group".to_string(),
            kafka_consumer_topics: "fetched-topic".to_string(),
            kafka_consumer_offset_reset: "earliest".to_string(),
            kafka_consumer_max_batch: 100,
        },
        &instrumentation(&recorder, Some(constant_attribute("header", "included"))),
        collector.clone(),
    )?;

    tokio::time::timeout(Duration::from_secs(60), consumer.run(done)).await??;

    let collected = collector
        .records
        .lock()
        .map_err(|_| anyhow::anyhow!("collector poisoned"))?;
    assert_eq!(collected.len(), RECORDS);
    for consumed in collected.iter() {
        assert_eq!(consumed.record.topic, "fetched-topic");
        assert!(consumed.record.header("header").is_some());
        assert!(consumed.record.header("traceparent").is_none());
    }

    let snapshot = recorder.snapshot();
    let fetched = snapshot.counters(CONSUMER_MESSAGES_FETCHED);
    assert_eq!(fetched.len(), 1, "{fetched:?}");
    let (labels, value) = &fetched[0];
    assert_eq!(*value, 10);
    assert_eq!(
        labels.get("topic").map(String::as_str),
        Some("name_space-fetched-topic")
    );
    assert_eq!(
        labels.get("messaging.source.name").map(String::as_str),
        Some("fetched-topic")
    );
    assert_eq!(
        labels
            .get("messaging.kafka.source.partition")
            .map(String::as_str),
        Some("0")
    );
    assert_eq!(labels.get("header").map(String::as_str), Some("included"));
    assert!(!labels.contains_key("outcome"));

    let observations: usize = snapshot
        .histograms(CONSUMER_MESSAGES_DELAY)
        .iter()
        .map(|(_, observations)| observations.len())
        .sum();
    assert_eq!(observations, RECORDS);

    Ok(())
}
