//! # Switchyard Events
//!
//! Message envelope and event dispatch shared by the Switchyard server and
//! its reconnecting client.
//!
//! ## Core Features
//!
//! - **Lazy payloads**: an [`Envelope`] keeps its body as an opaque JSON
//!   document until a handler decodes it into the type it declares
//! - **Explicit registration**: channels list their actions through
//!   [`Channel::routes`] and the [`DispatcherBuilder`] validates them once
//!   at startup
//! - **Non-blocking dispatch**: every matched message runs on its own tokio
//!   task with a [`RequestContext`] that can reply over the originating
//!   connection
//! - **Host-supplied instances**: channel instances come from an
//!   [`InstanceResolver`] so the host keeps control of their lifetime
//!
//! ## Wire Format
//!
//! ```json
//! { "event": "chat.join", "body": { "room": "lobby" } }
//! ```
//!
//! `body` may be omitted or `null`. Unknown events are dropped without
//! error so peers can evolve independently.
//!
//! ## Handler Signatures
//!
//! A handler takes the channel by value followed by up to three extractor
//! arguments, at most one of which decodes the payload:
//!
//! ```rust,ignore
//! async fn join(self, Body(req): Body<JoinRequest>, ctx: RequestContext) -> anyhow::Result<()>
//! async fn ping(self, ctx: RequestContext) -> anyhow::Result<()>
//! async fn tick(self) -> anyhow::Result<()>
//! ```

pub mod context;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod handler;
pub mod resolver;
pub mod types;

pub use context::{DispatchOrigin, Replier, RequestContext};
pub use dispatcher::{
    Channel, ChannelRoutes, ChannelToken, DispatchOutcome, Dispatcher, DispatcherBuilder,
    DuplicatePolicy,
};
pub use envelope::Envelope;
pub use error::{DispatchError, RegistrationError};
pub use filter::ActionFilter;
pub use handler::{ActionHandler, Body, FromInvocation, Invocation};
pub use resolver::{InstanceResolver, ServiceRegistry};
pub use types::{ClientId, SessionId};
