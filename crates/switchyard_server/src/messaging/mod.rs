//! Outbound messaging helpers.

pub mod broadcast;

pub use broadcast::{BroadcastReport, Broadcaster};
