//! Prometheus metrics HTTP endpoint
//!
//! Exposes service metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::Metrics;
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

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(2048);

    write_metric(
        &mut output,
        "plex_presence_webhooks_total",
        "Webhook requests received",
        MetricType::Counter,
        summary.webhooks_received,
    );
    write_metric(
        &mut output,
        "plex_presence_webhooks_dropped_total",
        "Webhook bodies dropped due to full dispatch queue",
        MetricType::Counter,
        summary.webhooks_dropped,
    );
    write_metric(
        &mut output,
        "plex_presence_bodies_unparseable_total",
        "Webhook bodies without a parseable JSON payload",
        MetricType::Counter,
        summary.bodies_unparseable,
    );
    write_metric(
        &mut output,
        "plex_presence_events_dispatched_total",
        "Recognized playback events dispatched to sensors",
        MetricType::Counter,
        summary.events_dispatched,
    );
    write_metric(
        &mut output,
        "plex_presence_events_ignored_total",
        "Webhook payloads with a non-playback event type",
        MetricType::Counter,
        summary.events_ignored,
    );
    write_metric(
        &mut output,
        "plex_presence_transitions_total",
        "Occupancy transitions published",
        MetricType::Counter,
        summary.transitions_total,
    );
    write_metric(
        &mut output,
        "plex_presence_uptime_seconds",
        "Seconds since process start",
        MetricType::Gauge,
        summary.uptime_secs,
    );

    let _ = writeln!(output, "# HELP plex_presence_sensor_occupied Current occupancy per sensor");
    let _ = writeln!(output, "# TYPE plex_presence_sensor_occupied gauge");
    for (sensor, occupied) in metrics.occupancy() {
        let _ = writeln!(
            output,
            "plex_presence_sensor_occupied{{sensor=\"{sensor}\"}} {}",
            u8::from(occupied)
        );
    }

    output
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                async move { handle_request(req, metrics).await }
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
