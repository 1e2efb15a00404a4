//! # REST + WebSocket API
//!
//! Builds the axum router serving the node's ledger. All handlers share
//! [`AppState`]; the ledger sits behind one async `RwLock`, so reads run
//! concurrently and writes are serialized, one operation at a time, exactly
//! as the engine expects.
//!
//! ## Endpoints
//!
//! | Method | Path                   | Description                           |
//! |--------|------------------------|---------------------------------------|
//! | GET    | `/health`              | Liveness probe                        |
//! | GET    | `/status`              | Node and ledger summary               |
//! | GET    | `/registry`            | Approved modules, factories, baskets  |
//! | GET    | `/integrations`        | Adapter directory bindings            |
//! | GET    | `/baskets`             | Every basket, summarized              |
//! | GET    | `/baskets/:address`    | One basket in full                    |
//! | GET    | `/accounts/:address`   | Token balances and basket shares      |
//! | GET    | `/events`              | Event log page (`since`, `limit`)     |
//! | POST   | `/rpc`                 | JSON-RPC 2.0 gateway (see [`crate::rpc`]) |
//! | GET    | `/ws`                  | Live ledger events                    |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use trove_protocol::config::PROTOCOL_VERSION;
use trove_protocol::{Address, EventRecord, LedgerError};

use crate::genesis::NodeContext;
use crate::metrics::SharedMetrics;
use crate::rpc::{self, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::views::{AccountView, BasketSummary, BasketView, RegistryView};

/// Page size of `/events` when `limit` is omitted.
const DEFAULT_EVENT_PAGE: usize = 100;
const MAX_EVENT_PAGE: usize = 1_000;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub context: Arc<RwLock<NodeContext>>,
    /// Every committed ledger event, in order.
    pub event_tx: broadcast::Sender<EventRecord>,
    pub metrics: SharedMetrics,
}

impl AppState {
    pub fn new(version: impl Into<String>, context: NodeContext, metrics: SharedMetrics) -> Self {
        metrics.observe_ledger(&context.engine);
        let (event_tx, _) = broadcast::channel(1_024);
        Self {
            version: version.into(),
            context: Arc::new(RwLock::new(context)),
            event_tx,
            metrics,
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/registry", get(registry_handler))
        .route("/integrations", get(integrations_handler))
        .route("/baskets", get(baskets_handler))
        .route("/baskets/:address", get(basket_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/events", get(events_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub protocol_version: String,
    pub admin: String,
    pub baskets: usize,
    pub events: u64,
    /// Oldest sequence `/events` can still return.
    pub first_event: u64,
    pub integrations: usize,
    pub hosted_modules: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub since: Option<u64>,
    pub limit: Option<usize>,
}

fn rejection(status: StatusCode, err: &LedgerError) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind().to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// REST Handlers
// ---------------------------------------------------------------------------

/// `GET /health`
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let context = state.context.read().await;
    let engine = &context.engine;
    Json(StatusResponse {
        version: state.version.clone(),
        protocol_version: PROTOCOL_VERSION.to_string(),
        admin: engine.registry().admin().to_string(),
        baskets: engine.baskets().count(),
        events: engine.events().next_sequence(),
        first_event: engine.events().first_retained(),
        integrations: engine.directory().len(),
        hosted_modules: context
            .modules
            .iter()
            .map(|module| format!("{} ({})", module.address(), module.name()))
            .collect(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /registry`
async fn registry_handler(State(state): State<AppState>) -> impl IntoResponse {
    let context = state.context.read().await;
    Json(RegistryView::of(&context.engine))
}

/// `GET /integrations`
async fn integrations_handler(State(state): State<AppState>) -> impl IntoResponse {
    let context = state.context.read().await;
    Json(context.engine.directory().bindings())
}

/// `GET /baskets`
async fn baskets_handler(State(state): State<AppState>) -> impl IntoResponse {
    let context = state.context.read().await;
    let baskets: Vec<BasketSummary> = context.engine.baskets().map(BasketSummary::from).collect();
    Json(baskets)
}

/// `GET /baskets/:address`, 404 for an unknown basket.
async fn basket_handler(Path(address): Path<String>, State(state): State<AppState>) -> Response {
    let context = state.context.read().await;
    let engine = &context.engine;
    let view = engine
        .basket(&Address::new(address))
        .and_then(|basket| BasketView::of(engine, basket));
    match view {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err @ LedgerError::UnknownBasket(_)) => rejection(StatusCode::NOT_FOUND, &err),
        Err(err) => rejection(StatusCode::INTERNAL_SERVER_ERROR, &err),
    }
}

/// `GET /accounts/:address`. Unknown identities simply hold nothing.
async fn account_handler(Path(address): Path<String>, State(state): State<AppState>) -> impl IntoResponse {
    let context = state.context.read().await;
    Json(AccountView::of(&context.engine, Address::new(address)))
}

/// `GET /events?since=N&limit=M`
///
/// Without `since`, returns the most recent `limit` records. Records older
/// than the ledger's retention window are gone; a `since` before it starts
/// at the oldest record held.
async fn events_handler(Query(query): Query<EventsQuery>, State(state): State<AppState>) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_PAGE).min(MAX_EVENT_PAGE);
    let context = state.context.read().await;
    let log = context.engine.events();
    let page: Vec<EventRecord> = match query.since {
        Some(since) => log.since(since).iter().take(limit).cloned().collect(),
        None => log.tail(limit).to_vec(),
    };
    Json(page)
}

// ---------------------------------------------------------------------------
// JSON-RPC
// ---------------------------------------------------------------------------

/// `POST /rpc`
///
/// Queries take the read lock. Writes take the write lock, and on success
/// every event they committed is pushed to WebSocket subscribers.
async fn rpc_handler(State(state): State<AppState>, Json(req): Json<JsonRpcRequest>) -> impl IntoResponse {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse::failure(
            req.id,
            JsonRpcError {
                code: rpc::INVALID_REQUEST,
                message: "Invalid Request: jsonrpc must be \"2.0\"".into(),
                data: None,
            },
        ));
    }

    let method = req.method.as_str();
    let outcome = if rpc::is_query(method) {
        let context = state.context.read().await;
        rpc::query(&context, method, req.params)
    } else {
        let started = Instant::now();
        let mut context = state.context.write().await;
        let first_new = context.engine.events().next_sequence();
        let outcome = rpc::apply(&mut context, method, req.params);

        state.metrics.operations_total.with_label_values(&[method]).inc();
        state
            .metrics
            .operation_latency_seconds
            .observe(started.elapsed().as_secs_f64());
        match &outcome {
            Ok(_) => {
                for record in context.engine.events_since(first_new) {
                    // No subscribers is not an error.
                    let _ = state.event_tx.send(record.clone());
                }
                state.metrics.observe_ledger(&context.engine);
            }
            Err(failure) => {
                state
                    .metrics
                    .operations_failed_total
                    .with_label_values(&[method, failure.kind()])
                    .inc();
                tracing::debug!(method, kind = failure.kind(), "rpc call refused");
            }
        }
        outcome
    };

    Json(match outcome {
        Ok(result) => JsonRpcResponse::success(req.id, result),
        Err(failure) => JsonRpcResponse::failure(req.id, failure.into_error()),
    })
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// `GET /ws`
///
/// Streams every committed [`EventRecord`] as a JSON text frame. Client
/// messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(record) => {
                        let payload = match serde_json::to_string(&record) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to serialize ledger event");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "ws subscriber lagged; resume from /events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
