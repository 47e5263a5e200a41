//! HTTP middleware stack.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers (nosniff, CSP, HSTS outside local development)
//! 5. Cookie manager (`tower-cookies`)
//! 6. Gatekeeper (per route group, with its access policy)

pub mod context;
pub mod cookies;
pub mod gatekeeper;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use context::{CookieNames, CredentialSource, RequestContext};
pub use gatekeeper::{
    Admission, Admitted, Gate, GateDecision, GateStage, Principal, RouteGatekeeper, gatekeeper,
};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
