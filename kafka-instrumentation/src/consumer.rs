use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::warn;

use crate::attributes::AttributeBuilder;
use crate::registry::{InstrumentRegistry, MetricEvent};

/// Records fetched from one topic partition in a single poll.
#[derive(Debug, Clone)]
pub struct FetchedBatch<'a> {
    /// Topic name on the wire, namespace prefix included.
    pub topic: &'a str,
    pub partition: i32,
    /// Produce time embedded in each record, when the broker supplied one.
    pub timestamps: Vec<Option<SystemTime>>,
}

/// Turns fetch results into consumer metrics.
#[derive(Clone)]
pub struct ConsumerMetrics {
    registry: Arc<InstrumentRegistry>,
    attributes: Arc<AttributeBuilder>,
}

impl ConsumerMetrics {
    pub fn new(registry: Arc<InstrumentRegistry>, attributes: Arc<AttributeBuilder>) -> Self {
        Self {
            registry,
            attributes,
        }
    }

    pub fn attributes(&self) -> &AttributeBuilder {
        &self.attributes
    }

    pub fn record_fetch(&self, batch: &FetchedBatch<'_>) {
        self.record_fetch_at(batch, SystemTime::now());
    }

    /// Counts every record of the batch and observes one delay per record, so the
    /// observation count always equals the fetched count. Timestamps in the future and
    /// records without a produce timestamp observe zero delay; the latter are logged.
    pub fn record_fetch_at(&self, batch: &FetchedBatch<'_>, now: SystemTime) {
        if batch.timestamps.is_empty() {
            return;
        }

        let mut missing = 0;
        let delays: Vec<Duration> = batch
            .timestamps
            .iter()
            .map(|produced| match produced {
                Some(produced) => now.duration_since(*produced).unwrap_or(Duration::ZERO),
                None => {
                    missing += 1;
                    Duration::ZERO
                }
            })
            .collect();

        if missing > 0 {
            warn!(
                topic = batch.topic,
                partition = batch.partition,
                missing,
                "fetched records without produce timestamp, observing zero delay"
            );
        }

        let attributes = self
            .attributes
            .source(batch.topic, Some(batch.partition), None);

        self.registry.record(MetricEvent::ConsumeReceipt {
            fetched: batch.timestamps.len() as u64,
            delays,
            attributes,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttributeSet, TopicAttributeFn};
    use crate::metrics_consts::{CONSUMER_MESSAGES_DELAY, CONSUMER_MESSAGES_FETCHED};
    use crate::test_utils::TestRecorder;

    fn consumer_metrics(
        recorder: &TestRecorder,
        topic_attribute: Option<TopicAttributeFn>,
    ) -> ConsumerMetrics {
        ConsumerMetrics::new(
            Arc::new(InstrumentRegistry::new(recorder.meter())),
            Arc::new(AttributeBuilder::new("name_space", topic_attribute)),
        )
    }

    fn source_attributes() -> AttributeSet {
        AttributeSet::new()
            .with("messaging.system", "kafka")
            .with("namespace", "name_space")
            .with("topic", "name_space-orders")
            .with("messaging.source.name", "orders")
            .with("messaging.kafka.source.partition", 2)
    }

    #[test]
    fn delay_is_now_minus_produce_time() {
        let recorder = TestRecorder::new();
        let metrics = consumer_metrics(&recorder, None);
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);

        metrics.record_fetch_at(
            &FetchedBatch {
                topic: "name_space-orders",
                partition: 2,
                timestamps: vec![
                    Some(now - Duration::from_secs(3)),
                    Some(now - Duration::from_millis(500)),
                ],
            },
            now,
        );

        let snapshot = recorder.snapshot();
        assert_eq!(
            snapshot.counter(CONSUMER_MESSAGES_FETCHED, &source_attributes()),
            Some(2)
        );
        assert_eq!(
            snapshot.histogram(CONSUMER_MESSAGES_DELAY, &source_attributes()),
            Some(vec![0.5, 3.0])
        );
    }

    #[test]
    fn future_and_missing_timestamps_observe_zero_delay() {
        let recorder = TestRecorder::new();
        let metrics = consumer_metrics(&recorder, None);
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);

        metrics.record_fetch_at(
            &FetchedBatch {
                topic: "name_space-orders",
                partition: 2,
                timestamps: vec![Some(now + Duration::from_secs(5)), None],
            },
            now,
        );

        let snapshot = recorder.snapshot();
        assert_eq!(
            snapshot.counter(CONSUMER_MESSAGES_FETCHED, &source_attributes()),
            Some(2)
        );
        assert_eq!(
            snapshot.histogram(CONSUMER_MESSAGES_DELAY, &source_attributes()),
            Some(vec![0.0, 0.0])
        );
    }

    #[test]
    fn empty_batches_record_nothing() {
        let recorder = TestRecorder::new();
        let metrics = consumer_metrics(&recorder, None);

        metrics.record_fetch(&FetchedBatch {
            topic: "name_space-orders",
            partition: 2,
            timestamps: vec![],
        });

        assert!(recorder
            .snapshot()
            .counters(CONSUMER_MESSAGES_FETCHED)
            .is_empty());
    }
}
