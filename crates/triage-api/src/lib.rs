//! Triage API crate - axum HTTP server, route handlers, event stream.
//!
//! Exposes error submission, agent status, memory inspection and reset, and
//! a server-sent event stream mirroring every pipeline stage event.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod stream;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
pub use stream::{ConnectionState, ConnectionStream};
