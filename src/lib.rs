pub mod api;
pub mod calls;
pub mod config;
pub mod error;
pub mod events;
pub mod markup;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod server;
pub mod sse;
pub mod tunnel;
pub mod workspace;
