use std::net::SocketAddr;
use tracing::{info, warn};

pub const RECORDS_EXTRACTED: &str = "sermon_records_extracted_total";
pub const RECORDS_NORMALIZED: &str = "sermon_records_normalized_total";
pub const PREACHERS_INFERRED: &str = "sermon_preachers_inferred_total";
pub const TRANSCRIPTS_EMITTED: &str = "sermon_transcripts_emitted_total";
pub const RECORDS_REJECTED: &str = "sermon_records_rejected_total";
pub const FETCH_FAILURES: &str = "sermon_fetch_failures_total";
pub const VIOLATIONS: &str = "sermon_violations_total";
pub const PIPELINE_DURATION: &str = "sermon_pipeline_duration_seconds";

/// Installs the Prometheus exporter. Port comes from `SERMON_METRICS_PORT`, default 9898.
pub fn init_metrics() {
    let port: u16 = std::env::var("SERMON_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9898);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
    }
}
