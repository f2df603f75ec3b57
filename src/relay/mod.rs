//! Queue-to-topic relay
//!
//! Drains queued alerts and republishes each one, unmodified, to the
//! notification topic. Delivery is at-least-once; subscribers must tolerate
//! duplicates.

pub mod service;
pub mod worker;

pub use service::RelayService;
pub use worker::{RelayStats, RelayWorker};
