//! HTTP and WebSocket surface
//!
//! Routes are fixed by the dashboard and the deployed device firmware:
//! `POST /` and `POST /mobile` ingest, `GET /listen` upgrades to the viewer
//! push channel, `GET /all` snapshots, `/reset` clears.

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Query, State,
        rejection::BytesRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use fleetwear_core::{DeviceSnapshot, IngestPath, ViewerSink};
use fleetwear_errors::{BroadcastError, ForwardError, IngestError};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::ingestion::IngestionService;

/// Build the application router.
pub fn router(service: IngestionService) -> Router {
    Router::new()
        .route("/", post(ingest_vehicle))
        .route("/mobile", post(ingest_mobile))
        .route("/listen", get(listen))
        .route("/all", get(all))
        .route("/reset", get(reset).post(reset))
        .route("/query", get(query))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(service)
}

async fn ingest_vehicle(
    State(service): State<IngestionService>,
    body: Result<Bytes, BytesRejection>,
) -> &'static str {
    ingest(&service, IngestPath::Vehicle, body)
}

async fn ingest_mobile(
    State(service): State<IngestionService>,
    body: Result<Bytes, BytesRejection>,
) -> &'static str {
    ingest(&service, IngestPath::Mobile, body)
}

fn ingest(
    service: &IngestionService,
    path: IngestPath,
    body: Result<Bytes, BytesRejection>,
) -> &'static str {
    match body {
        Ok(body) => {
            service.ingest_bytes(path, &body);
        }
        Err(rejection) => {
            let e = IngestError::BodyUnreadable(rejection.body_text());
            service.metrics().malformed();
            warn!(%path, error = %e, "Dropping unreadable request body");
        }
    }
    "OK"
}

async fn all(State(service): State<IngestionService>) -> Json<Vec<DeviceSnapshot>> {
    Json(service.snapshot())
}

async fn reset(State(service): State<IngestionService>) -> &'static str {
    service.reset();
    "OK"
}

async fn listen(State(service): State<IngestionService>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| viewer_session(service, socket))
}

/// Outbound half of a dashboard WebSocket.
struct WebSocketSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl ViewerSink for WebSocketSink {
    async fn send_text(&mut self, text: String) -> Result<(), BroadcastError> {
        self.sender
            .send(Message::Text(text.into()))
            .await
            .map_err(BroadcastError::write_failed)
    }

    async fn close(&mut self) {
        if let Err(e) = self.sender.send(Message::Close(None)).await {
            debug!(error = %e, "Viewer already gone on close");
        }
        if let Err(e) = self.sender.close().await {
            debug!(error = %e, "Viewer socket close failed");
        }
    }
}

/// Hand the write half to the broadcaster and drain the read half until the
/// viewer goes away.
async fn viewer_session(service: IngestionService, socket: WebSocket) {
    let (sender, mut receiver) = socket.split();

    let connection = match service.attach_viewer(Box::new(WebSocketSink { sender })) {
        Ok(connection) => connection,
        Err(e) => {
            warn!(error = %e, "Viewer rejected");
            return;
        }
    };
    info!(connection, "Viewer connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection, error = %e, "Viewer read failed");
                break;
            }
        }
    }

    service.detach_viewer(connection);
    info!(connection, "Viewer disconnected");
}

#[derive(Debug, Deserialize)]
struct QueryParams {
    tag: String,
    tenant: Option<String>,
}

async fn query(
    State(service): State<IngestionService>,
    Query(params): Query<QueryParams>,
) -> Response {
    match service
        .forwarder()
        .query(&params.tag, params.tenant.as_deref())
        .await
    {
        Ok(reply) => {
            let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let content_type = reply
                .content_type
                .unwrap_or_else(|| "application/json".to_string());
            (status, [(header::CONTENT_TYPE, content_type)], reply.body).into_response()
        }
        Err(e @ ForwardError::NotConfigured(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
        Err(e) => {
            warn!(tag = %params.tag, error = %e, "Query pass-through failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

async fn health(State(service): State<IngestionService>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "fleetweard",
        "devices": service.state().device_count(),
        "viewer_attached": service.broadcaster().is_attached(),
        "timestamp": chrono::Utc::now(),
    }))
}

async fn metrics(State(service): State<IngestionService>) -> Response {
    match service.metrics().render() {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            output,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode Prometheus metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}
