use std::sync::Arc;

use crate::attributes::{AttributeBuilder, TopicAttributeFn};
use crate::consumer::ConsumerMetrics;
use crate::producer::ProducerMetrics;
use crate::registry::{ClientKind, InstrumentRegistry, Meter};
use crate::rpc::RpcLatencyTap;

#[derive(Clone, Default)]
pub struct InstrumentationConfig {
    /// Prefix of every topic on the wire, and the `namespace` attribute.
    pub namespace: String,
    /// Optional per-topic attribute, called with the topic without its namespace prefix.
    pub topic_attribute: Option<TopicAttributeFn>,
    pub meter: Meter,
}

impl InstrumentationConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_topic_attribute(mut self, topic_attribute: TopicAttributeFn) -> Self {
        self.topic_attribute = Some(topic_attribute);
        self
    }

    pub fn with_meter(mut self, meter: Meter) -> Self {
        self.meter = meter;
        self
    }
}

/// One instrumentation instance. Every producer, consumer and tap handed out shares the same
/// instrument registry; separate instances never share samples unless they share a meter.
#[derive(Clone)]
pub struct Instrumentation {
    registry: Arc<InstrumentRegistry>,
    attributes: Arc<AttributeBuilder>,
}

impl Instrumentation {
    pub fn new(config: InstrumentationConfig) -> Self {
        Self {
            registry: Arc::new(InstrumentRegistry::new(config.meter)),
            attributes: Arc::new(AttributeBuilder::new(
                config.namespace,
                config.topic_attribute,
            )),
        }
    }

    pub fn producer(&self) -> ProducerMetrics {
        ProducerMetrics::new(self.registry.clone(), self.attributes.clone())
    }

    pub fn consumer(&self) -> ConsumerMetrics {
        ConsumerMetrics::new(self.registry.clone(), self.attributes.clone())
    }

    pub fn rpc_tap(&self, client: ClientKind) -> RpcLatencyTap {
        RpcLatencyTap::new(client, self.registry.clone(), self.attributes.clone())
    }

    pub fn attributes(&self) -> &AttributeBuilder {
        &self.attributes
    }
}
