//! pipehub HTTP surface: axum handlers, static-token auth, environment
//! configuration and the periodic state machine driver task.

pub mod api_errors;
pub mod api_handlers;
pub mod api_models;
pub mod config;
pub mod driver_task;

pub use api_handlers::{build_router, AuthConfig, HubState};
pub use config::{ApiTokenEntry, HubSettings};
