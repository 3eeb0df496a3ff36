//! The engine's server framework.
//!
//! - [`RequestHandler`] — the public surface and three-stage pipeline
//! - [`TaskService`] — task lifecycle, sticky-terminal guard, abort registry
//! - [`narrator`] — periodic status narration for working tasks
//! - [`ArtifactPipeline`] — streamed artifact-tool input → progressive events
//! - [`orchestrator`] — the single serialized emission point
//! - [`EventQueue`] — per-request broadcast channel to subscribers
//! - [`engine_router`] — axum JSON-RPC + SSE adapter

pub mod artifact_stream;
pub mod event_queue;
pub mod http;
pub mod narrator;
pub mod orchestrator;
pub mod request_handler;
pub mod task_service;

pub use artifact_stream::{ArtifactPipeline, ArtifactStreamState};
pub use event_queue::EventQueue;
pub use http::engine_router;
pub use narrator::NarratorHandle;
pub use request_handler::RequestHandler;
pub use task_service::TaskService;
