//! HTTP trigger harness
//!
//! Invokes the pipeline components the way an external front door would.

pub mod handlers;
pub mod server;

pub use handlers::{AppState, LocalTransports};
pub use server::{build_router, build_state, run_server};
