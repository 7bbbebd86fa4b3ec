//! Prometheus metrics HTTP endpoint
//!
//! Exposes navigation metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server. Scrapes read `Metrics::snapshot()`, so
//! every series here is cumulative and the periodic log report is unaffected.

use crate::infra::metrics::{Metrics, MetricsSnapshot, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, site: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_core_metrics(&mut output, site_id, &summary);
    write_latency_metrics(&mut output, site_id, &summary);
    write_proximity_metrics(&mut output, site_id, &summary);
    write_route_metrics(&mut output, site_id, &summary);
    write_input_metrics(&mut output, site_id, &summary);

    output
}

fn write_core_metrics(output: &mut String, site: &str, summary: &MetricsSnapshot) {
    write_metric(
        output,
        "courier_events_total",
        "Total input events processed",
        MetricType::Counter,
        site,
        summary.events_total,
    );
}

fn write_latency_metrics(output: &mut String, site: &str, summary: &MetricsSnapshot) {
    write_histogram(
        output,
        "courier_event_latency_us",
        "Event processing latency in microseconds",
        site,
        &summary.lat_buckets,
        summary.lat_sum_us,
    );
    write_metric(
        output,
        "courier_event_latency_p50_us",
        "50th percentile event latency",
        MetricType::Gauge,
        site,
        summary.lat_p50_us,
    );
    write_metric(
        output,
        "courier_event_latency_p95_us",
        "95th percentile event latency",
        MetricType::Gauge,
        site,
        summary.lat_p95_us,
    );
    write_metric(
        output,
        "courier_event_latency_p99_us",
        "99th percentile event latency",
        MetricType::Gauge,
        site,
        summary.lat_p99_us,
    );
}

fn write_proximity_metrics(output: &mut String, site: &str, summary: &MetricsSnapshot) {
    write_metric(
        output,
        "courier_fixes_total",
        "Position fixes processed",
        MetricType::Counter,
        site,
        summary.fixes_total,
    );
    write_metric(
        output,
        "courier_alerts_total",
        "Proximity alerts raised",
        MetricType::Counter,
        site,
        summary.alerts_total,
    );
    write_metric(
        output,
        "courier_active_stops",
        "Stops with a coordinate that are still pending",
        MetricType::Gauge,
        site,
        summary.active_stops,
    );
    write_metric(
        output,
        "courier_alerted_stops",
        "Stops alerted in the current session",
        MetricType::Gauge,
        site,
        summary.alerted_stops,
    );
}

fn write_route_metrics(output: &mut String, site: &str, summary: &MetricsSnapshot) {
    write_metric(
        output,
        "courier_routes_planned_total",
        "Routes planned",
        MetricType::Counter,
        site,
        summary.routes_planned_total,
    );
    write_histogram(
        output,
        "courier_route_plan_latency_us",
        "Route planning latency in microseconds",
        site,
        &summary.plan_lat_buckets,
        summary.plan_lat_sum_us,
    );
    write_metric(
        output,
        "courier_route_plan_latency_p99_us",
        "99th percentile route planning latency",
        MetricType::Gauge,
        site,
        summary.plan_lat_p99_us,
    );
}

fn write_input_metrics(output: &mut String, site: &str, summary: &MetricsSnapshot) {
    write_metric(
        output,
        "courier_status_updates_total",
        "Stop status changes applied",
        MetricType::Counter,
        site,
        summary.status_updates_total,
    );
    write_metric(
        output,
        "courier_session_resets_total",
        "Session resets",
        MetricType::Counter,
        site,
        summary.resets_total,
    );
    write_metric(
        output,
        "courier_input_rejected_total",
        "Input lines rejected as malformed or invalid",
        MetricType::Counter,
        site,
        summary.input_rejected_total,
    );
    write_metric(
        output,
        "courier_fixes_throttled_total",
        "Fixes suppressed by the location cadence policy",
        MetricType::Counter,
        site,
        summary.fixes_throttled_total,
    );
    write_metric(
        output,
        "courier_events_dropped_total",
        "Input events dropped due to channel full",
        MetricType::Counter,
        site,
        summary.events_dropped_total,
    );
    write_metric(
        output,
        "courier_egress_failed_total",
        "Egress records that could not be written",
        MetricType::Counter,
        site,
        summary.egress_failed_total,
    );
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (status, content_type, body) = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => (
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&metrics, &site_id),
        ),
        (&Method::GET, "/health") => (StatusCode::OK, "text/plain", "ok".to_string()),
        _ => (StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(hyper::header::CONTENT_TYPE, hyper::header::HeaderValue::from_static(content_type));
    Ok(response)
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, metrics, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();

        metrics.record_event_processed(150);
        metrics.record_event_processed(250);
        metrics.record_fix();
        metrics.record_alerts(2);
        metrics.record_route_planned(300);
        metrics.set_active_stops(5);
        metrics.set_alerted_stops(2);

        let output = format_prometheus_metrics(&metrics, "north");

        assert!(output.contains("courier_events_total{site=\"north\"} 2"));
        assert!(output.contains("courier_event_latency_us_bucket{site=\"north\""));
        assert!(output.contains("courier_event_latency_us_count{site=\"north\"} 2"));
        assert!(output.contains("courier_fixes_total{site=\"north\"} 1"));
        assert!(output.contains("courier_alerts_total{site=\"north\"} 2"));
        assert!(output.contains("courier_routes_planned_total{site=\"north\"} 1"));
        assert!(output.contains("courier_active_stops{site=\"north\"} 5"));
        assert!(output.contains("courier_alerted_stops{site=\"north\"} 2"));
    }

    #[test]
    fn test_histogram_is_cumulative() {
        let metrics = Metrics::new();
        metrics.record_event_processed(50);
        metrics.record_event_processed(1_000_000);

        let output = format_prometheus_metrics(&metrics, "s");

        assert!(output.contains("courier_event_latency_us_bucket{site=\"s\",le=\"100\"} 1"));
        assert!(output.contains("courier_event_latency_us_bucket{site=\"s\",le=\"+Inf\"} 2"));
        assert!(output.contains("courier_event_latency_us_sum{site=\"s\"} 1000050"));
    }

    #[test]
    fn test_repeated_scrapes_keep_counts() {
        let metrics = Metrics::new();
        metrics.record_event_processed(150);
        metrics.record_event_processed(250);
        metrics.record_route_planned(300);
        metrics.record_egress_failed(1);

        let first = format_prometheus_metrics(&metrics, "s");
        metrics.record_event_processed(50);
        let second = format_prometheus_metrics(&metrics, "s");

        assert!(first.contains("courier_event_latency_us_count{site=\"s\"} 2"));
        assert!(second.contains("courier_event_latency_us_count{site=\"s\"} 3"));
        assert!(second.contains("courier_event_latency_us_sum{site=\"s\"} 450"));
        assert!(second.contains("courier_route_plan_latency_us_count{site=\"s\"} 1"));
        assert!(second.contains("courier_egress_failed_total{site=\"s\"} 1"));

        // Scrapes do not consume the periodic log window
        let summary = metrics.report();
        assert_eq!(summary.lat_buckets.iter().sum::<u64>(), 3);
        assert_eq!(summary.avg_process_latency_us, 150);

        let third = format_prometheus_metrics(&metrics, "s");
        assert!(third.contains("courier_event_latency_us_count{site=\"s\"} 3"));
    }

    #[tokio::test]
    async fn test_metrics_server_shutdown() {
        let metrics = Arc::new(Metrics::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let server = tokio::spawn(start_metrics_server(0, metrics, "s".to_string(), shutdown_rx));
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server).await;
        assert!(result.unwrap().unwrap().is_ok());
    }
}
