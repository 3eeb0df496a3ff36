//! # a2a-engine — an A2A agent execution engine
//!
//! This crate implements the server side of the
//! [A2A protocol](https://a2a-protocol.org/latest/specification/) as an
//! execution engine: a user message arrives within a conversational
//! context, a routing model call decides whether to answer directly or
//! open a task, and tasks are driven through a streaming model loop
//! with tool invocation, progressive artifact generation, periodic
//! status narration, cooperative cancellation, and durable persistence
//! of every event in SQLite.
//!
//! ## Anatomy of a request
//!
//! ```text
//! message/stream
//!   └─ stage 1: routing   — one model call, only the create_task tool
//!        ├─ no tool call  → a single `message` event, done
//!        └─ create_task   → stage 2
//!   └─ stage 2: execution — task created, `task` + `status-update(working)`
//!        ├─ streaming model loop with tools + create_artifact
//!        ├─ narrator queues short `status-update`s every few seconds
//!        └─ artifact deltas stream out as `artifact-update` events
//!   └─ stage 3: finalize  — artifact persisted (forced if none was
//!        produced), then `status-update{completed, final: true}`
//! ```
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use a2a_engine::config::EngineConfig;
//! use a2a_engine::server::{engine_router, RequestHandler};
//! use a2a_engine::types::{AgentCard, AgentCapabilities};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::from_path("config.toml")?;
//!     let model = Arc::new(MyProvider::new(&config.model));
//!     let handler = Arc::new(RequestHandler::from_config(model, &config).await?);
//!
//!     let card = AgentCard {
//!         name: "my-agent".into(),
//!         description: "A task-running agent".into(),
//!         version: "0.1.0".into(),
//!         url: "http://localhost:7420/a2a".into(),
//!         capabilities: AgentCapabilities { streaming: Some(true) },
//!         default_input_modes: vec!["text/plain".into()],
//!         default_output_modes: vec!["text/plain".into()],
//!     };
//!
//!     let app = engine_router(handler, card);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:7420").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! The model provider is opaque to the engine: implement
//! [`model::ModelClient`] over your provider SDK of choice. Tool
//! sources — built-ins, remote A2A agents, MCP servers — are configured
//! in [`config::EngineConfig::capabilities`] and flattened into the
//! uniform [`capability::Capability`] shape.

pub mod capability;
pub mod config;
pub mod error;
pub mod model;
pub mod persistence;
pub mod server;
pub mod types;
pub mod utils;

/// Re-exports of the types most embedders need.
pub mod prelude {
    pub use crate::capability::{Capability, CapabilitySet};
    pub use crate::config::EngineConfig;
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::model::{ChatRequest, ModelClient, ModelEvent, ModelReply, ToolChoice};
    pub use crate::persistence::Database;
    pub use crate::server::{engine_router, EventQueue, RequestHandler, TaskService};
    pub use crate::types::{
        AgentCard, Artifact, CancelTaskParams, Context, FileContent, FileWithBytes, FileWithUri,
        GetTaskParams, Message, Part, Role, SendMessageParams, SendMessageResponse,
        StreamResponse, Task, TaskArtifactUpdateEvent, TaskState, TaskStatus,
        TaskStatusUpdateEvent,
    };
}

pub use error::{EngineError, EngineResult};
