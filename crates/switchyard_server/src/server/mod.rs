//! Server-side session handling: upgrade endpoint, admission and the
//! per-connection lifecycle.

pub mod core;
mod endpoint;
pub mod handshake;
pub mod session;
mod transport;

pub use self::core::{ConnectionInfo, SocketServer, Statistics};
pub use endpoint::InviteRequest;
pub use handshake::{RequestMetadata, INVITE_TOKEN_NAME};
pub use session::{NoopHooks, SessionHandler, SessionHooks, SessionOutcome, SessionState};
