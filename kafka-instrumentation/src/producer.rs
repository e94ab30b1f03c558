use std::collections::BTreeMap;
use std::sync::Arc;

use crate::attributes::{AttributeBuilder, AttributeSet};
use crate::outcome::{classify, OperationContext, Outcome};
use crate::protocol::BrokerError;
use crate::registry::{InstrumentRegistry, MetricEvent};

/// The terminal result of one produced record, as reported by the broker client. Retries
/// inside the client must already be collapsed into this single completion.
#[derive(Debug, Clone)]
pub struct RecordCompletion<'a, E> {
    /// Topic name on the wire, namespace prefix included.
    pub topic: &'a str,
    pub partition: Option<i32>,
    /// Serialized size after compression.
    pub wire_bytes: u64,
    /// Serialized size before compression.
    pub uncompressed_bytes: u64,
    /// Codec the client used for the batch carrying this record.
    pub codec: &'static str,
    pub result: Result<(), E>,
}

#[derive(Debug)]
struct Tally {
    outcome: Outcome,
    records: u64,
    wire_bytes: u64,
    uncompressed_bytes: u64,
}

/// Turns produce completions into producer metrics.
#[derive(Clone)]
pub struct ProducerMetrics {
    registry: Arc<InstrumentRegistry>,
    attributes: Arc<AttributeBuilder>,
}

impl ProducerMetrics {
    pub fn new(registry: Arc<InstrumentRegistry>, attributes: Arc<AttributeBuilder>) -> Self {
        Self {
            registry,
            attributes,
        }
    }

    pub fn attributes(&self) -> &AttributeBuilder {
        &self.attributes
    }

    pub fn record_completion<E: BrokerError>(
        &self,
        ctx: &OperationContext,
        completion: RecordCompletion<'_, E>,
    ) {
        self.record_batch(ctx, std::iter::once(completion));
    }

    /// Records every completion of a batch. Records that end up with the same attribute
    /// set are coalesced into one increment of N; records that differ in topic, partition
    /// or outcome are recorded separately.
    pub fn record_batch<'a, E, I>(&self, ctx: &OperationContext, completions: I)
    where
        E: BrokerError,
        I: IntoIterator<Item = RecordCompletion<'a, E>>,
    {
        let mut tallies: BTreeMap<AttributeSet, Tally> = BTreeMap::new();

        for completion in completions {
            let outcome = classify(completion.result.as_ref().map(|_| ()), ctx);
            let attributes = self.attributes.destination(
                completion.topic,
                completion.partition,
                &outcome,
                Some(completion.codec),
            );

            let tally = tallies.entry(attributes).or_insert(Tally {
                outcome,
                records: 0,
                wire_bytes: 0,
                uncompressed_bytes: 0,
            });
            tally.records += 1;
            if outcome.is_success() {
                tally.wire_bytes += completion.wire_bytes;
                tally.uncompressed_bytes += completion.uncompressed_bytes;
            }
        }

        for (attributes, tally) in tallies {
            self.registry.record(MetricEvent::ProduceCompletion {
                records: tally.records,
                wire_bytes: tally.wire_bytes,
                uncompressed_bytes: tally.uncompressed_bytes,
                outcome: tally.outcome,
                attributes,
            });
        }
    }
}
