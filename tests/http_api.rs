//! HTTP adapter: JSON-RPC dispatch, error-code mapping, and the agent
//! card endpoint, exercised over a real listener.

mod common;

use a2a_engine::server::engine_router;
use a2a_engine::types::{AgentCapabilities, AgentCard};
use common::*;
use serde_json::{json, Value};

fn test_card(url: &str) -> AgentCard {
    AgentCard {
        name: "test-agent".to_string(),
        description: "Engine under test".to_string(),
        version: "0.0.0".to_string(),
        url: url.to_string(),
        capabilities: AgentCapabilities {
            streaming: Some(true),
        },
        default_input_modes: vec!["text/plain".to_string()],
        default_output_modes: vec!["text/plain".to_string()],
    }
}

/// Serve the engine on an ephemeral port; returns the base URL.
async fn serve(engine: &TestEngine) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{}", addr);

    let app = engine_router(engine.handler.clone(), test_card(&format!("{}/a2a", base)));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    base
}

#[tokio::test]
async fn agent_card_is_discoverable() {
    let engine = engine(ScriptedModel::new(), 5000).await;
    let base = serve(&engine).await;

    let card: Value = reqwest::get(format!("{}/.well-known/agent.json", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(card["name"], "test-agent");
    assert_eq!(card["capabilities"]["streaming"], true);
}

#[tokio::test]
async fn unknown_method_maps_to_method_not_found() {
    let engine = engine(ScriptedModel::new(), 5000).await;
    let base = serve(&engine).await;

    let response: Value = reqwest::Client::new()
        .post(format!("{}/a2a", base))
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tasks/teleport",
            "params": {}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn tasks_get_unknown_id_maps_to_not_found_code() {
    let engine = engine(ScriptedModel::new(), 5000).await;
    let base = serve(&engine).await;

    let response: Value = reqwest::Client::new()
        .post(format!("{}/a2a", base))
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tasks/get",
            "params": {"id": "missing"}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], -32001);
}

#[tokio::test]
async fn message_send_returns_direct_reply() {
    let model = ScriptedModel::new();
    model.push_complete(direct_reply("blue"));
    let engine = engine(model, 5000).await;
    let base = serve(&engine).await;

    let response: Value = reqwest::Client::new()
        .post(format!("{}/a2a", base))
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "message/send",
            "params": {
                "message": {
                    "messageId": "m-http-1",
                    "role": "user",
                    "kind": "message",
                    "parts": [{"kind": "text", "text": "favorite color?"}]
                }
            }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["result"]["kind"], "message");
    assert_eq!(response["result"]["parts"][0]["text"], "blue");
}

#[tokio::test]
async fn invalid_jsonrpc_version_rejected() {
    let engine = engine(ScriptedModel::new(), 5000).await;
    let base = serve(&engine).await;

    let response: Value = reqwest::Client::new()
        .post(format!("{}/a2a", base))
        .json(&json!({
            "jsonrpc": "1.0",
            "id": 4,
            "method": "message/send",
            "params": {}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], -32600);
}
