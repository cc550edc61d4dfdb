//! Outbound side: a worker that keeps a connection to a socket server open.

pub mod request;
mod transport;
pub mod worker;

pub use request::{source_fn, ConnectSource, ConnectTarget, SourceFn};
pub use worker::{ClientWorker, STOPPING_REASON};
