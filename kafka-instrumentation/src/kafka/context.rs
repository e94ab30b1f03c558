use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use rdkafka::consumer::ConsumerContext;
use rdkafka::statistics::{Broker, Window};
use rdkafka::{ClientContext, Statistics};
use tracing::{debug, warn};

use crate::outcome::{FailureReason, Outcome};
use crate::rpc::RpcLatencyTap;

/// Operation name for failed requests. librdkafka counts timeouts and transmission errors
/// per broker, not per request type.
pub const UNATTRIBUTED_OPERATION: &str = "unknown";

/// Failure counters of one broker handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureCounts {
    pub timeouts: u64,
    pub transmit_errors: u64,
}

impl FailureCounts {
    fn of(broker: &Broker) -> Self {
        Self {
            timeouts: broker.req_timeouts,
            transmit_errors: broker.txerrs,
        }
    }
}

/// What a broker handle did between two statistics reports.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BrokerActivity {
    /// Requests sent, by librdkafka request name, sorted.
    pub requests: Vec<(String, u64)>,
    pub failures: FailureCounts,
}

#[derive(Debug, Default)]
struct BrokerCounters {
    requests: HashMap<String, i64>,
    failures: FailureCounts,
}

/// Cumulative per broker counters from the last statistics report.
#[derive(Debug, Default)]
pub struct RequestCounters {
    seen: HashMap<String, BrokerCounters>,
}

// A counter that went backwards belongs to a fresh broker handle and counts from zero.
fn delta(total: u64, previous: u64) -> u64 {
    if total >= previous {
        total - previous
    } else {
        total
    }
}

impl RequestCounters {
    /// Activity of `broker` since the previous report.
    pub fn advance(
        &mut self,
        broker: &str,
        requests: &HashMap<String, i64>,
        failures: FailureCounts,
    ) -> BrokerActivity {
        let seen = self.seen.entry(broker.to_string()).or_default();

        let mut advanced = Vec::new();
        for (name, &total) in requests {
            let previous = seen.requests.insert(name.clone(), total).unwrap_or(0);
            let total = u64::try_from(total).unwrap_or(0);
            let count = delta(total, u64::try_from(previous).unwrap_or(0));
            if count > 0 {
                advanced.push((name.clone(), count));
            }
        }
        advanced.sort();

        let previous = std::mem::replace(&mut seen.failures, failures);
        BrokerActivity {
            requests: advanced,
            failures: FailureCounts {
                timeouts: delta(failures.timeouts, previous.timeouts),
                transmit_errors: delta(failures.transmit_errors, previous.transmit_errors),
            },
        }
    }
}

/// Average round trip of a broker handle. Handles that only served bootstrap requests
/// have an empty rtt window and fall back to their output buffer latency, then zero.
pub fn round_trip(rtt: Option<&Window>, outbuf_latency: Option<&Window>) -> Duration {
    [rtt, outbuf_latency]
        .into_iter()
        .flatten()
        .find(|window| window.cnt > 0)
        .map(|window| Duration::from_micros(u64::try_from(window.avg).unwrap_or(0)))
        .unwrap_or(Duration::ZERO)
}

/// Client context feeding broker round trips into the RPC latency tap.
///
/// Every request issued since the previous statistics report becomes one success
/// observation at the broker's average round trip. Timed out requests and transmission
/// errors become failure observations under [`UNATTRIBUTED_OPERATION`].
pub struct InstrumentedContext {
    tap: RpcLatencyTap,
    counters: Mutex<RequestCounters>,
}

impl InstrumentedContext {
    pub fn new(tap: RpcLatencyTap) -> Self {
        Self {
            tap,
            counters: Mutex::new(RequestCounters::default()),
        }
    }

    fn observe(&self, statistics: &Statistics) {
        let mut observations = Vec::new();
        {
            let Ok(mut counters) = self.counters.lock() else {
                warn!("request counters poisoned, skipping statistics report");
                return;
            };
            for (name, broker) in &statistics.brokers {
                let elapsed = round_trip(broker.rtt.as_ref(), broker.outbuf_latency.as_ref());
                let activity = counters.advance(name, &broker.req, FailureCounts::of(broker));
                observations.push((activity, elapsed));
            }
        }

        for (activity, elapsed) in observations {
            for (operation, requests) in &activity.requests {
                for _ in 0..*requests {
                    self.tap.observe(operation, &Outcome::Success, elapsed);
                }
            }
            let failures = [
                (FailureReason::Timeout, activity.failures.timeouts),
                (FailureReason::Unknown, activity.failures.transmit_errors),
            ];
            for (reason, count) in failures {
                for _ in 0..count {
                    self.tap
                        .observe(UNATTRIBUTED_OPERATION, &Outcome::Failure(reason), elapsed);
                }
            }
        }
    }
}

impl ClientContext for InstrumentedContext {
    fn stats(&self, statistics: Statistics) {
        debug!(
            client = %statistics.client_id,
            brokers = statistics.brokers.len(),
            "kafka statistics report"
        );
        self.observe(&statistics);
    }
}

impl ConsumerContext for InstrumentedContext {}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::attributes::{AttributeBuilder, AttributeSet};
    use crate::metrics_consts::PRODUCER_RPC_LATENCY;
    use crate::registry::{ClientKind, InstrumentRegistry};
    use crate::test_utils::TestRecorder;

    fn requests(counts: &[(&str, i64)]) -> HashMap<String, i64> {
        counts
            .iter()
            .map(|(name, count)| (name.to_string(), *count))
            .collect()
    }

    fn window(avg: i64, cnt: i64) -> Window {
        Window {
            avg,
            cnt,
            ..Default::default()
        }
    }

    fn rpc(operation: &str, outcome: &str) -> AttributeSet {
        AttributeSet::new()
            .with("messaging.system", "kafka")
            .with("namespace", "name_space")
            .with("operation", operation.to_string())
            .with("outcome", outcome.to_string())
    }

    fn context(recorder: &TestRecorder) -> InstrumentedContext {
        InstrumentedContext::new(RpcLatencyTap::new(
            ClientKind::Producer,
            Arc::new(InstrumentRegistry::new(recorder.meter())),
            Arc::new(AttributeBuilder::new("name_space", None)),
        ))
    }

    #[test]
    fn first_report_counts_every_request() {
        let mut counters = RequestCounters::default();
        let activity = counters.advance(
            "localhost:9092/1",
            &requests(&[("Produce", 3), ("Metadata", 1), ("Fetch", 0)]),
            FailureCounts::default(),
        );
        assert_eq!(
            activity.requests,
            vec![("Metadata".to_string(), 1), ("Produce".to_string(), 3)]
        );
    }

    #[test]
    fn later_reports_count_the_difference() {
        let mut counters = RequestCounters::default();
        counters.advance(
            "b1",
            &requests(&[("Produce", 3), ("ApiVersion", 1)]),
            FailureCounts {
                timeouts: 1,
                transmit_errors: 0,
            },
        );
        let activity = counters.advance(
            "b1",
            &requests(&[("Produce", 5), ("ApiVersion", 1)]),
            FailureCounts {
                timeouts: 3,
                transmit_errors: 1,
            },
        );
        assert_eq!(
            activity,
            BrokerActivity {
                requests: vec![("Produce".to_string(), 2)],
                failures: FailureCounts {
                    timeouts: 2,
                    transmit_errors: 1,
                },
            }
        );
    }

    #[test]
    fn brokers_are_tracked_separately_and_resets_restart_from_zero() {
        let mut counters = RequestCounters::default();
        counters.advance("b1", &requests(&[("Produce", 10)]), FailureCounts::default());
        assert_eq!(
            counters
                .advance("b2", &requests(&[("Produce", 4)]), FailureCounts::default())
                .requests,
            vec![("Produce".to_string(), 4)]
        );
        assert_eq!(
            counters
                .advance("b1", &requests(&[("Produce", 2)]), FailureCounts::default())
                .requests,
            vec![("Produce".to_string(), 2)]
        );
    }

    #[test]
    fn round_trip_falls_back_when_the_rtt_window_is_empty() {
        assert_eq!(
            round_trip(Some(&window(2_000, 4)), Some(&window(9_000, 1))),
            Duration::from_millis(2)
        );
        assert_eq!(
            round_trip(Some(&window(0, 0)), Some(&window(500, 2))),
            Duration::from_micros(500)
        );
        assert_eq!(round_trip(None, None), Duration::ZERO);
    }

    #[test]
    fn statistics_reports_feed_the_latency_histogram() {
        let recorder = TestRecorder::new();
        let context = context(&recorder);

        // The bootstrap handle never fills its rtt window but still served metadata.
        let bootstrap = Broker {
            req: requests(&[("ApiVersion", 1), ("Metadata", 2)]),
            rtt: Some(window(0, 0)),
            ..Default::default()
        };
        let leader = Broker {
            req: requests(&[("ApiVersion", 1), ("InitProducerId", 1), ("Produce", 3)]),
            rtt: Some(window(4_000, 5)),
            req_timeouts: 1,
            ..Default::default()
        };
        let statistics = Statistics {
            brokers: HashMap::from([
                ("localhost:9092/bootstrap".to_string(), bootstrap),
                ("localhost:9092/1".to_string(), leader),
            ]),
            ..Default::default()
        };
        context.stats(statistics.clone());
        // An unchanged report adds nothing.
        context.stats(statistics);

        let snapshot = recorder.snapshot();
        let count = |operation: &str, outcome: &str| {
            snapshot
                .histogram(PRODUCER_RPC_LATENCY, &rpc(operation, outcome))
                .map(|observations| observations.len())
        };
        assert_eq!(count("ApiVersion", "success"), Some(2));
        assert_eq!(count("Metadata", "success"), Some(2));
        assert_eq!(count("InitProducerId", "success"), Some(1));
        assert_eq!(count("Produce", "success"), Some(3));
        assert_eq!(count(UNATTRIBUTED_OPERATION, "failure"), Some(1));
        assert_eq!(
            snapshot.histogram(PRODUCER_RPC_LATENCY, &rpc("Produce", "success")),
            Some(vec![0.004, 0.004, 0.004])
        );
    }
}
