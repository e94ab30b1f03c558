// prometheus exporter setup

use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};

use crate::metrics_consts::HISTOGRAM_BUCKETS;
use crate::registry::Meter;

/// A prometheus recorder whose delay and latency histograms use the shared bucket schema.
/// The recorder is not installed globally; wrap it in a [`Meter`] or install it yourself.
pub fn build_recorder() -> Result<(PrometheusRecorder, PrometheusHandle), BuildError> {
    let recorder = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("delay".to_string()), HISTOGRAM_BUCKETS)?
        .set_buckets_for_metric(Matcher::Suffix("latency".to_string()), HISTOGRAM_BUCKETS)?
        .build_recorder();
    let handle = recorder.handle();
    Ok((recorder, handle))
}

/// Shorthand for an instrumentation meter backed by a fresh prometheus recorder.
pub fn prometheus_meter() -> Result<(Meter, PrometheusHandle), BuildError> {
    let (recorder, handle) = build_recorder()?;
    Ok((Meter::from_recorder(recorder), handle))
}
