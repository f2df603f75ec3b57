//! Alert normalization
//!
//! Raw alert payloads get per-field defaults and are placed on the durable
//! queue for the relay to pick up.

pub mod message;
pub mod normalizer;

pub use message::{AlertLevel, AlertMessage};
pub use normalizer::{AlertNormalizer, EnqueueError};
