use std::sync::Arc;
use std::time::Duration;

use crate::attributes::AttributeBuilder;
use crate::outcome::{classify, OperationContext, Outcome};
use crate::protocol::BrokerError;
use crate::registry::{ClientKind, InstrumentRegistry, MetricEvent};

/// Observes broker round trips of one client into its latency histogram.
#[derive(Clone)]
pub struct RpcLatencyTap {
    client: ClientKind,
    registry: Arc<InstrumentRegistry>,
    attributes: Arc<AttributeBuilder>,
}

impl RpcLatencyTap {
    pub fn new(
        client: ClientKind,
        registry: Arc<InstrumentRegistry>,
        attributes: Arc<AttributeBuilder>,
    ) -> Self {
        Self {
            client,
            registry,
            attributes,
        }
    }

    pub fn client(&self) -> ClientKind {
        self.client
    }

    /// One observation of `elapsed`, labelled with the request name as the client reports it.
    pub fn observe(&self, operation: &str, outcome: &Outcome, elapsed: Duration) {
        let attributes = self.attributes.rpc(operation, outcome);
        self.registry.record(MetricEvent::RpcRoundTrip {
            client: self.client,
            elapsed,
            attributes,
        });
    }

    pub fn observe_result<E>(&self, operation: &str, result: Result<(), &E>, elapsed: Duration)
    where
        E: BrokerError + ?Sized,
    {
        let outcome = classify(result, &OperationContext::new());
        self.observe(operation, &outcome, elapsed);
    }
}
