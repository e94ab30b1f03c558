//! Metrics instrumentation for Kafka producers and consumers.
//!
//! An [`Instrumentation`] owns one instrument registry and hands out [`ProducerMetrics`],
//! [`ConsumerMetrics`] and [`RpcLatencyTap`]s sharing it. The [`kafka`] module wires them
//! into rdkafka clients; anything else that can report record completions and fetches can
//! use them directly.

pub mod attributes;
pub mod config;
pub mod consumer;
pub mod instrumentation;
pub mod kafka;
pub mod metrics_consts;
pub mod outcome;
pub mod producer;
pub mod prometheus;
pub mod protocol;
pub mod registry;
pub mod rpc;
pub mod test_utils;

pub use attributes::{Attribute, AttributeBuilder, AttributeSet, AttributeValue, TopicAttributeFn};
pub use consumer::{ConsumerMetrics, FetchedBatch};
pub use instrumentation::{Instrumentation, InstrumentationConfig};
pub use outcome::{classify, FailureReason, OperationContext, Outcome};
pub use producer::{ProducerMetrics, RecordCompletion};
pub use protocol::{BrokerError, KafkaErrorCode};
pub use registry::{ClientKind, InstrumentRegistry, Meter, MetricEvent};
pub use rpc::RpcLatencyTap;
