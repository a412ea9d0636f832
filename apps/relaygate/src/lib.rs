//! Multi-provider LLM gateway (spec.md). `main.rs` is a thin binary wrapper
//! around this library so integration tests can build the router and state
//! the same way the real process does.

pub mod auth;
pub mod bootstrap;
pub mod cache_backend;
pub mod config_load;
pub mod error_response;
pub mod estimate;
pub mod handlers;
pub mod ledger_store;
pub mod mcp;
pub mod observability;
pub mod routes;
pub mod state;
pub mod upstream;
