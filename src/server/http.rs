//! HTTP adapter for the engine: JSON-RPC 2.0 over POST plus SSE.
//!
//! Routes:
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /a2a` | `message/send`, `message/stream`, `tasks/get`, `tasks/cancel` |
//! | `GET /.well-known/agent.json` | agent card discovery |
//!
//! `message/stream` answers with Server-Sent Events. Every frame is a
//! JSON-RPC success envelope around one stream event; a `status-update`
//! with `final: true` closes the stream. Auth, UI, and scheduling live
//! outside this adapter.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult, INVALID_REQUEST, METHOD_NOT_FOUND};
use crate::types::{AgentCard, JsonRpcError, StreamResponse};

/// Build the engine's router.
pub fn engine_router(
    handler: Arc<super::RequestHandler>,
    agent_card: AgentCard,
) -> Router {
    let shared = Arc::new(Adapter {
        handler,
        agent_card,
    });

    Router::new()
        .route("/a2a", post(dispatch))
        .route("/.well-known/agent.json", get(serve_card))
        .layer(CorsLayer::permissive())
        .with_state(shared)
}

struct Adapter {
    handler: Arc<super::RequestHandler>,
    agent_card: AgentCard,
}

#[derive(Debug, serde::Deserialize)]
struct RpcCall {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct RpcReply {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl RpcReply {
    fn ok(id: Option<Value>, result: Value) -> Self {
        RpcReply {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn fail(id: Option<Value>, error: JsonRpcError) -> Self {
        RpcReply {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

async fn serve_card(State(adapter): State<Arc<Adapter>>) -> impl IntoResponse {
    Json(&adapter.agent_card).into_response()
}

async fn dispatch(State(adapter): State<Arc<Adapter>>, Json(call): Json<RpcCall>) -> Response {
    if call.jsonrpc != "2.0" {
        let error = JsonRpcError {
            code: INVALID_REQUEST,
            message: "jsonrpc must be \"2.0\"".to_string(),
            data: None,
        };
        return Json(RpcReply::fail(call.id, error)).into_response();
    }

    debug!(method = %call.method, "dispatching JSON-RPC call");
    let RpcCall {
        id, method, params, ..
    } = call;

    match method.as_str() {
        "message/send" => match decode(params) {
            Ok(p) => respond(id, adapter.handler.send(p).await),
            Err(e) => respond::<()>(id, Err(e)),
        },
        "message/stream" => match decode(params) {
            Ok(p) => match adapter.handler.send_stream(p).await {
                Ok(rx) => Sse::new(event_frames(id, rx))
                    .keep_alive(KeepAlive::default())
                    .into_response(),
                Err(e) => respond::<()>(id, Err(e)),
            },
            Err(e) => respond::<()>(id, Err(e)),
        },
        "tasks/get" => match decode(params) {
            Ok(p) => respond(id, adapter.handler.get_task(p).await),
            Err(e) => respond::<()>(id, Err(e)),
        },
        "tasks/cancel" => match decode(params) {
            Ok(p) => respond(id, adapter.handler.cancel_task(p).await),
            Err(e) => respond::<()>(id, Err(e)),
        },
        other => {
            warn!(method = %other, "unknown JSON-RPC method");
            let error = JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("no such method: {}", other),
                data: None,
            };
            Json(RpcReply::fail(id, error)).into_response()
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(params: Value) -> EngineResult<T> {
    serde_json::from_value(params)
        .map_err(|e| EngineError::invalid_request(format!("invalid params: {}", e)))
}

/// Serialize a handler outcome into a JSON-RPC reply.
fn respond<T: Serialize>(id: Option<Value>, outcome: EngineResult<T>) -> Response {
    let reply = outcome
        .and_then(|value| serde_json::to_value(value).map_err(EngineError::from))
        .map_or_else(
            |e| RpcReply::fail(id.clone(), e.into()),
            |value| RpcReply::ok(id.clone(), value),
        );
    Json(reply).into_response()
}

/// Adapt the event subscription into SSE frames. The stream drains
/// until the final event or until the queue closes.
fn event_frames(
    rpc_id: Option<Value>,
    mut rx: broadcast::Receiver<StreamResponse>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "SSE subscriber lagged");
                    continue;
                }
            };

            let done = event.is_final();
            if let Some(frame) = encode_frame(&rpc_id, &event) {
                yield Ok(frame);
            }
            if done {
                break;
            }
        }
    }
}

fn encode_frame(rpc_id: &Option<Value>, event: &StreamResponse) -> Option<Event> {
    let label = match event {
        StreamResponse::Task(_) => "task",
        StreamResponse::Message(_) => "message",
        StreamResponse::StatusUpdate(_) => "status-update",
        StreamResponse::ArtifactUpdate(_) => "artifact-update",
    };

    let payload = serde_json::to_value(event).ok()?;
    let envelope = RpcReply::ok(rpc_id.clone(), payload);
    let body = serde_json::to_string(&envelope).ok()?;
    Some(Event::default().event(label).data(body))
}
