//! HTTP boundary for the Anvil commit-trust subsystem.
//!
//! Thin by design: handlers validate typed request/response schemas and
//! delegate to the core components. Auth and rate limiting live upstream.

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;
