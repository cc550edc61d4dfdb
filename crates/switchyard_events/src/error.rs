//! Error types for registration and dispatch.

/// Contract violations detected while a dispatcher is being built.
///
/// These are fatal at startup: a process that fails to register its
/// channels should not start accepting traffic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// A handler declared more than one payload argument
    #[error("handler for event '{event}' on {channel} declares {found} payload arguments, at most one is allowed")]
    HandlerArity {
        channel: &'static str,
        event: String,
        found: usize,
    },
    /// A channel registered no actions at all
    #[error("no actions registered for channel {channel}")]
    NoActions { channel: &'static str },
    /// A handler was registered under an empty event name
    #[error("empty event name registered on {channel}")]
    EmptyEvent { channel: &'static str },
    /// Two handlers claim the same event and duplicates are rejected
    #[error("event '{event}' registered by {existing} is also claimed by {channel}")]
    DuplicateEvent {
        event: String,
        existing: &'static str,
        channel: &'static str,
    },
}

/// Failures of a single handler invocation.
///
/// A dispatch error is logged and stays local to the invocation that
/// produced it.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The payload could not be decoded into the declared argument type
    #[error("failed to decode payload for '{event}': {source}")]
    Decode {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    /// The resolver has no instance of the requested type
    #[error("no instance available for {0}")]
    Unresolved(&'static str),
    /// An action filter refused the invocation
    #[error("rejected by filter: {0}")]
    Rejected(String),
    /// The handler body returned an error
    #[error("handler failed: {0}")]
    Handler(#[source] anyhow::Error),
    /// A reply could not be delivered to the peer
    #[error("reply failed: {0}")]
    Reply(String),
    /// The message could not be encoded for sending
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
