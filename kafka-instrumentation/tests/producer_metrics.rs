use std::time::Duration;

use kafka_instrumentation::metrics_consts::{
    PRODUCER_MESSAGES_COUNT, PRODUCER_UNCOMPRESSED_BYTES, PRODUCER_WIRE_BYTES,
};
use kafka_instrumentation::test_utils::TestRecorder;
use kafka_instrumentation::{OperationContext, RecordCompletion};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use tokio_util::sync::CancellationToken;

mod common;

use common::{constant_attribute, destination, instrumentation, TOPIC};

fn completions(
    count: usize,
    codec: &'static str,
    result: Result<(), KafkaError>,
) -> Vec<RecordCompletion<'static, KafkaError>> {
    (0..count)
        .map(|_| RecordCompletion {
            topic: TOPIC,
            partition: Some(0),
            wire_bytes: 8,
            uncompressed_bytes: 8,
            codec,
            result: result.clone(),
        })
        .collect()
}

fn refused() -> Result<(), KafkaError> {
    Err(KafkaError::MessageProduction(
        RDKafkaErrorCode::BrokerTransportFailure,
    ))
}

#[test]
fn expired_context_records_one_timeout_data_point() {
    let recorder = TestRecorder::new();
    let producer = instrumentation(&recorder, None).producer();
    let ctx = OperationContext::new().with_timeout(Duration::ZERO);

    producer.record_batch(&ctx, completions(3, "none", refused()));

    let snapshot = recorder.snapshot();
    assert_eq!(snapshot.counters(PRODUCER_MESSAGES_COUNT).len(), 1);
    assert_eq!(
        snapshot.counter(
            PRODUCER_MESSAGES_COUNT,
            &destination(0)
                .with("outcome", "failure")
                .with("error_reason", "timeout")
        ),
        Some(3)
    );
    assert!(snapshot.counters(PRODUCER_WIRE_BYTES).is_empty());
}

#[test]
fn canceled_context_records_canceled() {
    let recorder = TestRecorder::new();
    let producer = instrumentation(&recorder, None).producer();
    let token = CancellationToken::new();
    token.cancel();
    let ctx = OperationContext::new()
        .with_timeout(Duration::from_secs(60))
        .with_cancellation(token);

    producer.record_batch(&ctx, completions(3, "none", refused()));

    assert_eq!(
        recorder.snapshot().counter(
            PRODUCER_MESSAGES_COUNT,
            &destination(0)
                .with("outcome", "failure")
                .with("error_reason", "canceled")
        ),
        Some(3)
    );
}

#[test]
fn unknown_topic_records_the_broker_message() {
    let recorder = TestRecorder::new();
    let producer = instrumentation(&recorder, None).producer();
    let unknown_topic = Err(KafkaError::MessageProduction(
        RDKafkaErrorCode::UnknownTopicOrPartition,
    ));

    producer.record_batch(
        &OperationContext::new(),
        completions(3, "none", unknown_topic),
    );

    assert_eq!(
        recorder.snapshot().counter(
            PRODUCER_MESSAGES_COUNT,
            &destination(0)
                .with("outcome", "failure")
                .with(
                    "error_reason",
                    "This server does not host this topic-partition."
                )
        ),
        Some(3)
    );
}

#[test]
fn uncompressed_success_counts_messages_and_bytes() {
    let recorder = TestRecorder::new();
    let producer = instrumentation(&recorder, None).producer();

    producer.record_batch(&OperationContext::new(), completions(3, "none", Ok(())));

    let success = destination(0)
        .with("outcome", "success")
        .with("compression.codec", "none");
    let snapshot = recorder.snapshot();
    assert_eq!(snapshot.counter(PRODUCER_MESSAGES_COUNT, &success), Some(3));
    assert_eq!(snapshot.counter(PRODUCER_WIRE_BYTES, &success), Some(24));
    assert_eq!(
        snapshot.counter(PRODUCER_UNCOMPRESSED_BYTES, &success),
        Some(24)
    );
}

#[test]
fn compressed_success_carries_codec_and_dynamic_attribute() {
    let recorder = TestRecorder::new();
    let producer = instrumentation(&recorder, Some(constant_attribute("k", "v"))).producer();

    producer.record_batch(
        &OperationContext::new(),
        (0..3).map(|_| RecordCompletion::<KafkaError> {
            topic: TOPIC,
            partition: Some(0),
            wire_bytes: 6,
            uncompressed_bytes: 8,
            codec: "zstd",
            result: Ok(()),
        }),
    );

    let success = destination(0)
        .with("outcome", "success")
        .with("compression.codec", "zstd")
        .with("k", "v");
    let snapshot = recorder.snapshot();
    assert_eq!(snapshot.counter(PRODUCER_MESSAGES_COUNT, &success), Some(3));
    assert_eq!(snapshot.counter(PRODUCER_WIRE_BYTES, &success), Some(18));
    assert_eq!(
        snapshot.counter(PRODUCER_UNCOMPRESSED_BYTES, &success),
        Some(24)
    );
}

#[test]
fn failures_never_carry_a_codec() {
    let recorder = TestRecorder::new();
    let producer = instrumentation(&recorder, Some(constant_attribute("k", "v"))).producer();

    producer.record_batch(&OperationContext::new(), completions(2, "lz4", refused()));

    let snapshot = recorder.snapshot();
    let series = snapshot.counters(PRODUCER_MESSAGES_COUNT);
    assert_eq!(series.len(), 1);
    let (labels, value) = &series[0];
    assert_eq!(*value, 2);
    assert!(!labels.contains_key("compression.codec"));
    assert_eq!(labels.get("error_reason").map(String::as_str), Some("unknown"));
    assert_eq!(labels.get("k").map(String::as_str), Some("v"));
}
