use std::sync::Arc;
use std::time::Duration;

use metrics::{Key, Level, Metadata, Recorder, Unit};
use tracing::debug;

use crate::attributes::AttributeSet;
use crate::metrics_consts::{
    CONSUMER_MESSAGES_DELAY, CONSUMER_MESSAGES_DELAY_DESCRIPTION, CONSUMER_MESSAGES_FETCHED,
    CONSUMER_MESSAGES_FETCHED_DESCRIPTION, CONSUMER_RPC_LATENCY, CONSUMER_RPC_LATENCY_DESCRIPTION,
    PRODUCER_MESSAGES_COUNT, PRODUCER_MESSAGES_COUNT_DESCRIPTION, PRODUCER_RPC_LATENCY,
    PRODUCER_RPC_LATENCY_DESCRIPTION, PRODUCER_UNCOMPRESSED_BYTES,
    PRODUCER_UNCOMPRESSED_BYTES_DESCRIPTION, PRODUCER_WIRE_BYTES, PRODUCER_WIRE_BYTES_DESCRIPTION,
};
use crate::outcome::Outcome;

/// The metrics backend instruments are recorded into.
#[derive(Clone)]
pub enum Meter {
    /// Whatever recorder is installed for the current scope, or the global one.
    Global,
    /// An explicit recorder, owned by this instrumentation instance.
    Recorder(Arc<dyn Recorder + Send + Sync>),
}

impl Meter {
    pub fn from_recorder<R>(recorder: R) -> Self
    where
        R: Recorder + Send + Sync + 'static,
    {
        Meter::Recorder(Arc::new(recorder))
    }

    fn with<T>(&self, f: impl FnOnce(&dyn Recorder) -> T) -> T {
        match self {
            Meter::Global => metrics::with_recorder(f),
            Meter::Recorder(recorder) => f(recorder.as_ref()),
        }
    }
}

impl Default for Meter {
    fn default() -> Self {
        Meter::Global
    }
}

impl std::fmt::Debug for Meter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Meter::Global => f.write_str("Meter::Global"),
            Meter::Recorder(_) => f.write_str("Meter::Recorder"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    Counter,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct Instrument {
    pub name: &'static str,
    pub description: &'static str,
    pub unit: Unit,
    pub kind: InstrumentKind,
}

pub const PRODUCER_MESSAGES: Instrument = Instrument {
    name: PRODUCER_MESSAGES_COUNT,
    description: PRODUCER_MESSAGES_COUNT_DESCRIPTION,
    unit: Unit::Count,
    kind: InstrumentKind::Counter,
};

pub const PRODUCER_WIRE: Instrument = Instrument {
    name: PRODUCER_WIRE_BYTES,
    description: PRODUCER_WIRE_BYTES_DESCRIPTION,
    unit: Unit::Bytes,
    kind: InstrumentKind::Counter,
};

pub const PRODUCER_UNCOMPRESSED: Instrument = Instrument {
    name: PRODUCER_UNCOMPRESSED_BYTES,
    description: PRODUCER_UNCOMPRESSED_BYTES_DESCRIPTION,
    unit: Unit::Bytes,
    kind: InstrumentKind::Counter,
};

pub const PRODUCER_LATENCY: Instrument = Instrument {
    name: PRODUCER_RPC_LATENCY,
    description: PRODUCER_RPC_LATENCY_DESCRIPTION,
    unit: Unit::Seconds,
    kind: InstrumentKind::Histogram,
};

pub const CONSUMER_FETCHED: Instrument = Instrument {
    name: CONSUMER_MESSAGES_FETCHED,
    description: CONSUMER_MESSAGES_FETCHED_DESCRIPTION,
    unit: Unit::Count,
    kind: InstrumentKind::Counter,
};

pub const CONSUMER_DELAY: Instrument = Instrument {
    name: CONSUMER_MESSAGES_DELAY,
    description: CONSUMER_MESSAGES_DELAY_DESCRIPTION,
    unit: Unit::Seconds,
    kind: InstrumentKind::Histogram,
};

pub const CONSUMER_LATENCY: Instrument = Instrument {
    name: CONSUMER_RPC_LATENCY,
    description: CONSUMER_RPC_LATENCY_DESCRIPTION,
    unit: Unit::Seconds,
    kind: InstrumentKind::Histogram,
};

pub const INSTRUMENTS: &[Instrument] = &[
    PRODUCER_MESSAGES,
    PRODUCER_WIRE,
    PRODUCER_UNCOMPRESSED,
    PRODUCER_LATENCY,
    CONSUMER_FETCHED,
    CONSUMER_DELAY,
    CONSUMER_LATENCY,
];

/// Which side of the broker an RPC round trip was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Producer,
    Consumer,
}

impl ClientKind {
    fn latency_instrument(self) -> &'static Instrument {
        match self {
            ClientKind::Producer => &PRODUCER_LATENCY,
            ClientKind::Consumer => &CONSUMER_LATENCY,
        }
    }
}

/// One unit of work for the registry. Counts are already coalesced by attribute set.
#[derive(Debug, Clone)]
pub enum MetricEvent {
    ProduceCompletion {
        records: u64,
        wire_bytes: u64,
        uncompressed_bytes: u64,
        outcome: Outcome,
        attributes: AttributeSet,
    },
    ConsumeReceipt {
        fetched: u64,
        delays: Vec<Duration>,
        attributes: AttributeSet,
    },
    RpcRoundTrip {
        client: ClientKind,
        elapsed: Duration,
        attributes: AttributeSet,
    },
}

/// The instruments of one instrumentation instance.
///
/// Instruments are described against the meter once, on construction. Recording resolves
/// the handle for the event's attribute set through the meter and holds no lock of its
/// own; deduplication of handles is the recorder's job.
#[derive(Debug)]
pub struct InstrumentRegistry {
    meter: Meter,
}

impl InstrumentRegistry {
    pub fn new(meter: Meter) -> Self {
        let registry = Self { meter };
        registry.register();
        registry
    }

    pub fn register(&self) {
        self.meter.with(|recorder| {
            for instrument in INSTRUMENTS {
                let name = instrument.name.into();
                let unit = Some(instrument.unit);
                let description = instrument.description.into();
                match instrument.kind {
                    InstrumentKind::Counter => recorder.describe_counter(name, unit, description),
                    InstrumentKind::Histogram => {
                        recorder.describe_histogram(name, unit, description)
                    }
                }
            }
        });
        debug!(instruments = INSTRUMENTS.len(), "registered kafka instruments");
    }

    pub fn record(&self, event: MetricEvent) {
        match event {
            MetricEvent::ProduceCompletion {
                records,
                wire_bytes,
                uncompressed_bytes,
                outcome,
                attributes,
            } => {
                self.increment(&PRODUCER_MESSAGES, &attributes, records);
                if outcome.is_success() {
                    self.increment(&PRODUCER_WIRE, &attributes, wire_bytes);
                    self.increment(&PRODUCER_UNCOMPRESSED, &attributes, uncompressed_bytes);
                }
            }
            MetricEvent::ConsumeReceipt {
                fetched,
                delays,
                attributes,
            } => {
                self.increment(&CONSUMER_FETCHED, &attributes, fetched);
                for delay in delays {
                    self.observe(&CONSUMER_DELAY, &attributes, delay.as_secs_f64());
                }
            }
            MetricEvent::RpcRoundTrip {
                client,
                elapsed,
                attributes,
            } => {
                self.observe(
                    client.latency_instrument(),
                    &attributes,
                    elapsed.as_secs_f64(),
                );
            }
        }
    }

    fn increment(&self, instrument: &Instrument, attributes: &AttributeSet, value: u64) {
        let key = Key::from_parts(instrument.name, attributes.to_labels());
        self.meter.with(|recorder| {
            recorder
                .register_counter(&key, &metadata())
                .increment(value)
        });
    }

    fn observe(&self, instrument: &Instrument, attributes: &AttributeSet, value: f64) {
        let key = Key::from_parts(instrument.name, attributes.to_labels());
        self.meter.with(|recorder| {
            recorder
                .register_histogram(&key, &metadata())
                .record(value)
        });
    }
}

fn metadata() -> Metadata<'static> {
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
}
