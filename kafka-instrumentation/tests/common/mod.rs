#![allow(dead_code)]

use std::sync::Arc;

use kafka_instrumentation::test_utils::TestRecorder;
use kafka_instrumentation::{
    Attribute, AttributeSet, Instrumentation, InstrumentationConfig, TopicAttributeFn,
};

pub const NAMESPACE: &str = "name_space";
pub const TOPIC: &str = "name_space-default-topic";

pub fn instrumentation(
    recorder: &TestRecorder,
    topic_attribute: Option<TopicAttributeFn>,
) -> Instrumentation {
    let mut config = InstrumentationConfig::new(NAMESPACE).with_meter(recorder.meter());
    if let Some(topic_attribute) = topic_attribute {
        config = config.with_topic_attribute(topic_attribute);
    }
    Instrumentation::new(config)
}

pub fn constant_attribute(key: &'static str, value: &'static str) -> TopicAttributeFn {
    Arc::new(move |_topic: &str| Some(Attribute::new(key, value)))
}

pub fn destination(partition: i32) -> AttributeSet {
    AttributeSet::new()
        .with("messaging.system", "kafka")
        .with("namespace", NAMESPACE)
        .with("topic", TOPIC)
        .with("messaging.destination.name", "default-topic")
        .with("messaging.kafka.destination.partition", partition)
}

pub fn source(partition: i32) -> AttributeSet {
    AttributeSet::new()
        .with("messaging.system", "kafka")
        .with("namespace", NAMESPACE)
        .with("topic", TOPIC)
        .with("messaging.source.name", "default-topic")
        .with("messaging.kafka.source.partition", partition)
}
