//! REST API for accessory hosts
//!
//! Exposes the shutter devices as window coverings: normalized current/target
//! per axis over HTTP, and change notifications over WebSocket.
//! Default port: 8126

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::ShutterError;
use crate::manager::{parse_axis, AccessoryUpdate, DeviceRegistry};
use crate::shutter::DeviceSnapshot;

/// Shared state for API handlers
pub struct ApiState {
    /// Discovered devices
    pub registry: DeviceRegistry,
    /// Broadcast channel for current/target changes
    pub update_tx: broadcast::Sender<AccessoryUpdate>,
}

/// Request body for setting a target
#[derive(Debug, Deserialize)]
pub struct SetTargetRequest {
    pub value: i64,
}

/// Normalized values of one axis
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AxisValues {
    pub current: u8,
    pub target: u8,
}

/// API error response
#[derive(Debug, Serialize)]
struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

impl From<ShutterError> for ApiError {
    fn from(err: ShutterError) -> Self {
        let status = match err {
            ShutterError::UnknownDevice(_) => StatusCode::NOT_FOUND,
            ShutterError::MissingAttributeMapping { .. } | ShutterError::InvalidLevel(_) => {
                StatusCode::BAD_REQUEST
            }
            ShutterError::ConnectionFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            error: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Build the API router
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/devices/:name", get(get_device))
        .route("/api/devices/:name/:axis", get(get_axis))
        .route("/api/devices/:name/:axis/target", put(set_target))
        .route("/api/ws/updates", get(updates_ws))
        .route("/api/health", get(health_check))
        .with_state(state)
}

/// GET /api/devices - Snapshots of every device
async fn list_devices(State(state): State<Arc<ApiState>>) -> Json<Vec<DeviceSnapshot>> {
    Json(state.registry.snapshots())
}

/// GET /api/devices/:name - Snapshot of one device
async fn get_device(
    Path(name): Path<String>,
    State(state): State<Arc<ApiState>>,
) -> Result<Json<DeviceSnapshot>, ApiError> {
    Ok(Json(state.registry.snapshot(&name)?))
}

/// GET /api/devices/:name/:axis - Current and target of one axis
async fn get_axis(
    Path((name, axis)): Path<(String, String)>,
    State(state): State<Arc<ApiState>>,
) -> Result<Json<AxisValues>, ApiError> {
    let axis = parse_axis(&name, &axis)?;
    Ok(Json(AxisValues {
        current: state.registry.get_current(&name, axis)?,
        target: state.registry.get_target(&name, axis)?,
    }))
}

/// PUT /api/devices/:name/:axis/target - Command a new target
async fn set_target(
    Path((name, axis)): Path<(String, String)>,
    State(state): State<Arc<ApiState>>,
    Json(req): Json<SetTargetRequest>,
) -> Result<StatusCode, ApiError> {
    let axis = parse_axis(&name, &axis)?;
    state.registry.set_target(&name, axis, req.value)?;
    info!("Target set via API: {} {} -> {}", name, axis, req.value);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/ws/updates - WebSocket for push notifications
async fn updates_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state.update_tx.subscribe()))
}

/// Forward accessory updates to one WebSocket client
async fn handle_websocket(mut socket: WebSocket, mut rx: broadcast::Receiver<AccessoryUpdate>) {
    debug!("WebSocket client connected for accessory updates");

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(update) => {
                        let msg = match serde_json::to_string(&update) {
                            Ok(msg) => msg,
                            Err(e) => {
                                warn!("Failed to encode update: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(msg)).await.is_err() {
                            debug!("WebSocket client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged by {} messages", n);
                    }
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client closed connection");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }
}

/// GET /api/health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// Start the API server
pub async fn start_server(state: Arc<ApiState>, port: u16) -> Result<()> {
    let router = build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting accessory API server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutter::{AxisRanges, NodeSeed, ShutterDevice};
    use crate::zwave::{TransportCommand, TransportHandle};
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn serve() -> (String, UnboundedReceiver<TransportCommand>) {
        let (handle, rx) = TransportHandle::channel();
        let registry = DeviceRegistry::new();
        let seeds = [NodeSeed {
            axis: "position".to_string(),
            node_id: 2,
            level: Some(100),
            moving: false,
        }];
        registry.insert(ShutterDevice::new("Office", AxisRanges::default(), &seeds, handle));

        let (update_tx, _) = broadcast::channel(16);
        let state = Arc::new(ApiState { registry, update_tx });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        (format!("http://{}", addr), rx)
    }

    async fn request(method: &str, url: &str, body: Option<&str>) -> (u16, String) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let url = url.trim_start_matches("http://");
        let (host, path) = url.split_at(url.find('/').unwrap());
        let body = body.unwrap_or("");
        let raw = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            method,
            path,
            host,
            body.len(),
            body
        );

        let mut stream = tokio::net::TcpStream::connect(host).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        let status = response[9..12].parse().unwrap();
        let body = response
            .split_once("\r\n\r\n")
            .map(|(_, b)| b.to_string())
            .unwrap_or_default();
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let (base, _rx) = serve().await;
        let (status, body) = request("GET", &format!("{}/api/health", base), None).await;
        assert_eq!(status, 200);
        assert!(body.contains("ok"));
    }

    #[tokio::test]
    async fn test_get_axis_values() {
        let (base, _rx) = serve().await;
        let (status, body) =
            request("GET", &format!("{}/api/devices/Office/position", base), None).await;
        assert_eq!(status, 200);
        assert!(body.contains(r#""current":99"#));
        assert!(body.contains(r#""target":99"#));
    }

    #[tokio::test]
    async fn test_set_target_sends_level() {
        let (base, mut rx) = serve().await;
        let (status, _) = request(
            "PUT",
            &format!("{}/api/devices/Office/position/target", base),
            Some(r#"{"value":0}"#),
        )
        .await;
        assert_eq!(status, 204);
        assert_eq!(
            rx.recv().await,
            Some(TransportCommand::SetLevel { node_id: 2, level: 0 })
        );
    }

    #[tokio::test]
    async fn test_errors_map_to_status() {
        let (base, _rx) = serve().await;

        let (status, _) = request("GET", &format!("{}/api/devices/Attic", base), None).await;
        assert_eq!(status, 404);

        let (status, body) =
            request("GET", &format!("{}/api/devices/Office/slats", base), None).await;
        assert_eq!(status, 400);
        assert!(body.contains("slats"));

        let (status, _) = request(
            "PUT",
            &format!("{}/api/devices/Office/angle/target", base),
            Some(r#"{"value":150}"#),
        )
        .await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn test_out_of_range_targets_are_bad_requests() {
        let (base, mut rx) = serve().await;
        let url = format!("{}/api/devices/Office/position/target", base);

        for body in [r#"{"value":70000}"#, r#"{"value":-1}"#, r#"{"value":100}"#] {
            let (status, body) = request("PUT", &url, Some(body)).await;
            assert_eq!(status, 400, "{}", body);
            assert!(body.contains("outside 0..=99"));
        }
        assert!(rx.try_recv().is_err());
    }
}
