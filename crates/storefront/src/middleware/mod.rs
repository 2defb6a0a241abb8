//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span with method, URI, status, latency)
//! 3. Request ID (recorded in the span and the Sentry scope)
//! 4. Session layer (tower-sessions, read by the auth extractors)

pub mod auth;
pub mod request_id;
pub mod session;

pub use auth::{RequireAdmin, RequireAuth};
pub use request_id::request_id_middleware;
pub use session::{create_session_layer, postgres_session_store};
