use crate::broadcast::{Connection, ConnectionId, DeliveryError, SubscriptionManager};
use crate::collector::MetricsCollector;
use crate::config::Config;
use crate::watcher::{handler_fn, RepoWatcher, StatusHandle, WatchEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Topic that carries repo updates and scan completions.
pub const METRICS_TOPIC: &str = "metrics";

/// Messages queued per client before further sends are dropped.
const CLIENT_QUEUE: usize = 64;

/// A WebSocket client as seen by the broadcast hub. Messages are queued to
/// the socket task, which owns the actual socket.
pub struct WsConnection {
    id: ConnectionId,
    tx: mpsc::Sender<Value>,
}

#[async_trait]
impl Connection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, message: &Value) -> Result<(), DeliveryError> {
        self.tx.try_send(message.clone()).map_err(|e| DeliveryError {
            id: self.id,
            reason: match e {
                TrySendError::Full(_) => "client queue full".to_string(),
                TrySendError::Closed(_) => "socket closed".to_string(),
            },
        })
    }
}

pub type Hub = SubscriptionManager<WsConnection>;

#[derive(Clone)]
pub struct AppState {
    collector: Arc<MetricsCollector>,
    watcher: StatusHandle,
    hub: Arc<Hub>,
    next_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(collector: Arc<MetricsCollector>, watcher: StatusHandle, hub: Arc<Hub>) -> Self {
        Self {
            collector,
            watcher,
            hub,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(all_metrics))
        .route("/metrics/watcher", get(watcher_status))
        .route("/metrics/scan", post(trigger_scan))
        .route("/metrics/:repo_name", get(repo_metrics))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

fn error(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": detail.into() }))).into_response()
}

async fn all_metrics(State(state): State<AppState>) -> Response {
    match state.collector.load_snapshot() {
        Some(snapshot) => Json(snapshot).into_response(),
        None => error(
            StatusCode::NOT_FOUND,
            "No snapshot: POST /metrics/scan first",
        ),
    }
}

async fn watcher_status(State(state): State<AppState>) -> Response {
    Json(state.watcher.status()).into_response()
}

async fn repo_metrics(State(state): State<AppState>, Path(repo_name): Path<String>) -> Response {
    let Some(snapshot) = state.collector.load_snapshot() else {
        return error(StatusCode::NOT_FOUND, "No snapshot");
    };
    match snapshot.find(&repo_name) {
        Some(repo) => Json(repo).into_response(),
        None => error(
            StatusCode::NOT_FOUND,
            format!("Repo not found: {}", repo_name),
        ),
    }
}

async fn trigger_scan(State(state): State<AppState>) -> Response {
    let results = match state.collector.collect_all().await {
        Ok(r) => r,
        Err(e) => {
            log::error!("metrics scan failed: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };
    let event = WatchEvent::MetricsScanComplete {
        repo_count: results.len(),
        timestamp: Utc::now(),
    };
    publish(&state.hub, &event).await;
    Json(json!({ "status": "complete", "repo_count": results.len() })).into_response()
}

/// Fan an event out to every client, then to `metrics` topic subscribers.
pub async fn publish(hub: &Hub, event: &WatchEvent) {
    let value = match serde_json::to_value(event) {
        Ok(v) => v,
        Err(e) => {
            log::error!("cannot encode event: {}", e);
            return;
        }
    };
    hub.broadcast_all(&value).await;
    hub.broadcast_to_topic(METRICS_TOPIC, &value).await;
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE);
    let conn = Arc::new(WsConnection { id, tx });
    state.hub.register(conn.clone()).await;
    let _ = conn
        .send(&json!({ "type": "connected", "connection_id": id }))
        .await;

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                let Some(value) = outgoing else { break };
                if socket.send(Message::Text(value.to_string())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = respond(&state.hub, &conn, &text).await;
                    if socket.send(Message::Text(reply.to_string())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.hub.remove_connection(id).await;
    log::debug!("websocket {} disconnected", id);
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Ping,
    Subscribe { topic: String },
    Unsubscribe { topic: String },
}

/// Handle one client frame and produce the reply.
async fn respond(hub: &Hub, conn: &Arc<WsConnection>, text: &str) -> Value {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => json!({ "type": "pong" }),
        Ok(ClientMessage::Subscribe { topic }) => {
            hub.subscribe(conn.clone(), &topic).await;
            json!({ "type": "subscribed", "topic": topic })
        }
        Ok(ClientMessage::Unsubscribe { topic }) => {
            hub.unsubscribe(conn.id(), &topic).await;
            json!({ "type": "unsubscribed", "topic": topic })
        }
        Err(e) => json!({ "type": "error", "detail": e.to_string() }),
    }
}

/// Run the metrics API until Ctrl-C: seeds a snapshot if none exists,
/// starts the watcher and fans its events out over WebSocket.
pub async fn serve(config: &Config, bind: &str) -> Result<()> {
    let collector = Arc::new(MetricsCollector::new(config));
    let hub: Arc<Hub> = Arc::new(SubscriptionManager::new());

    if collector.load_snapshot().is_none() {
        log::info!("No metrics snapshot; running initial scan in background");
        let initial = collector.clone();
        tokio::spawn(async move {
            match initial.collect_all().await {
                Ok(r) => log::info!("Initial metrics scan complete: {} repos", r.len()),
                Err(e) => log::error!("Initial metrics scan failed: {}", e),
            }
        });
    } else {
        log::info!("Loaded existing metrics snapshot");
    }

    let handler_hub = hub.clone();
    let handler = handler_fn(move |event| {
        let hub = handler_hub.clone();
        async move { publish(&hub, &event).await }
    });
    let mut watcher = RepoWatcher::new(collector.clone(), config).with_handler(handler);
    watcher
        .start()
        .await
        .context("failed to start repository watcher")?;

    let state = AppState::new(collector, watcher.status_handle(), hub);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("cannot bind {}", bind))?;
    log::info!("Serving metrics API on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    watcher.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RepoSnapshot;

    fn state_for(root: &std::path::Path) -> AppState {
        let config = Config::for_root(root);
        let collector = Arc::new(MetricsCollector::new(&config));
        let watcher = RepoWatcher::new(collector.clone(), &config);
        AppState::new(collector, watcher.status_handle(), Arc::new(SubscriptionManager::new()))
    }

    fn ws_conn(id: ConnectionId) -> (Arc<WsConnection>, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE);
        (Arc::new(WsConnection { id, tx }), rx)
    }

    #[tokio::test]
    async fn missing_snapshot_is_404() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state_for(tmp.path());
        let resp = all_metrics(State(state.clone())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = repo_metrics(State(state), Path("alpha".to_string())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_saved_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state_for(tmp.path());
        state
            .collector
            .save_snapshot(&[RepoSnapshot::empty(&tmp.path().join("alpha"))])
            .unwrap();

        assert_eq!(all_metrics(State(state.clone())).await.status(), StatusCode::OK);
        let found = repo_metrics(State(state.clone()), Path("alpha".to_string())).await;
        assert_eq!(found.status(), StatusCode::OK);
        let missing = repo_metrics(State(state), Path("beta".to_string())).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn watcher_status_reports_stopped_watcher() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = watcher_status(State(state_for(tmp.path()))).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn scan_broadcasts_completion() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state_for(tmp.path());
        let (conn, mut rx) = ws_conn(1);
        state.hub.subscribe(conn, METRICS_TOPIC).await;

        let resp = trigger_scan(State(state.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        // Once as a connected client, once as a topic subscriber.
        for _ in 0..2 {
            let msg = rx.try_recv().unwrap();
            assert_eq!(msg["type"], "metrics_scan_complete");
            assert_eq!(msg["repo_count"], 0);
        }
        assert!(state.collector.load_snapshot().is_some());
    }

    #[tokio::test]
    async fn client_protocol() {
        let hub: Hub = SubscriptionManager::new();
        let (conn, _rx) = ws_conn(7);

        let reply = respond(&hub, &conn, r#"{"type":"ping"}"#).await;
        assert_eq!(reply, json!({"type": "pong"}));

        let reply = respond(&hub, &conn, r#"{"type":"subscribe","topic":"metrics"}"#).await;
        assert_eq!(reply, json!({"type": "subscribed", "topic": "metrics"}));
        assert_eq!(hub.subscribers("metrics").await, 1);

        let reply = respond(&hub, &conn, r#"{"type":"unsubscribe","topic":"metrics"}"#).await;
        assert_eq!(reply["type"], "unsubscribed");
        assert_eq!(hub.subscribers("metrics").await, 0);

        let reply = respond(&hub, &conn, r#"{"type":"launch"}"#).await;
        assert_eq!(reply["type"], "error");
        let reply = respond(&hub, &conn, "not json").await;
        assert_eq!(reply["type"], "error");
    }

    #[tokio::test]
    async fn stalled_client_drops_messages() {
        let hub: Hub = SubscriptionManager::new();
        let (conn, mut rx) = ws_conn(4);
        hub.register(conn).await;

        for n in 0..CLIENT_QUEUE {
            assert_eq!(hub.broadcast_all(&json!({ "n": n })).await, 1);
        }
        assert_eq!(hub.broadcast_all(&json!({ "n": "overflow" })).await, 0);

        assert_eq!(rx.try_recv().unwrap()["n"], 0);
        assert_eq!(hub.broadcast_all(&json!({ "n": "after" })).await, 1);
    }

    #[tokio::test]
    async fn closed_socket_fails_delivery() {
        let (conn, rx) = ws_conn(3);
        drop(rx);
        assert!(conn.send(&json!({})).await.is_err());
    }
}
