// =============================================================================
// servicemap-risk-api — library root
// =============================================================================
//
// Exposes the modules the binary wires together so the integration test
// suite (tests/) can spin up the real `axum::Router` and store against an
// in-memory SQLite database without going through `main`.
// =============================================================================

pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod interlink;
pub mod op_context;
pub mod pidfile;
pub mod risk;
pub mod risk_cache;
pub mod store;
pub mod supervisor;
pub mod types;
