//! Webhook HTTP listener
//!
//! Accepts Plex webhook deliveries on the configured port. Any method is
//! accepted, the body is buffered fully, and the response is always an
//! empty 200: processing outcome never surfaces to the media server, and a
//! malformed payload must never take the listener down. Bodies are handed
//! to the dispatcher via try_send so a slow consumer cannot stall accepts;
//! drops are counted in metrics.

use crate::infra::metrics::Metrics;
use crate::services::dispatcher::DispatchMsg;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    event_tx: mpsc::Sender<DispatchMsg>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    metrics.record_webhook_received();

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(error = %e, "webhook_body_read_failed");
            Bytes::new()
        }
    };

    match event_tx.try_send(DispatchMsg::Webhook(body)) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            metrics.record_webhook_dropped();
            warn!("webhook_dropped: dispatch queue full");
        }
        Err(TrySendError::Closed(_)) => {
            warn!("webhook_dropped: dispatcher gone");
        }
    }

    // Acknowledge unconditionally
    Ok(Response::builder()
        .status(StatusCode::OK)
        .body(Full::new(Bytes::new()))
        .expect("static response should not fail"))
}

/// Start the webhook HTTP listener
pub async fn start_webhook_listener(
    port: u16,
    event_tx: mpsc::Sender<DispatchMsg>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, "webhook_listener_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let event_tx = event_tx.clone();
                        let metrics = metrics.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let event_tx = event_tx.clone();
                                let metrics = metrics.clone();
                                async move { handle_request(req, event_tx, metrics).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                debug!(error = %e, "webhook_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "webhook_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("webhook_listener_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
