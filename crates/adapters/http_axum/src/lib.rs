//! # roomhub-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - `GET  /health` — liveness
//! - `GET  /api/workflows` — workflows currently loaded by the dispatcher
//! - `POST /api/workflows/{id}/triggers/{node_id}/fire` — invoke a manual
//!   trigger, waiting for the outcome when the body says `{"wait": true}`
//! - `POST /api/readings` — push sensor readings into the ingestion feed
//! - `GET  /api/readings` — cached readings with their staleness flag
//!
//! ## Dependency rule
//! Depends on `roomhub-app` (engine and port traits) and `roomhub-domain`
//! (for types used in request/response mapping). Never leaks axum types
//! into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

pub use router::build;
pub use state::AppState;
