//! Connection handles, the client directory and the reply path.
//!
//! This module provides the types the rest of the server uses to reach an
//! admitted socket without owning it.

pub mod client;
pub mod directory;
pub mod response;

pub use client::{Connection, ConnectionState};
pub use directory::{ClientDirectory, DirectoryEntry, SendOutcome};
pub use response::ConnectionReplier;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::framing::OutboundFrame;
    use crate::server::handshake::RequestMetadata;
    use crate::shards::Shard;
    use std::sync::Arc;
    use switchyard_events::ClientId;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    /// A connection for a fresh client whose writer side is `rx`.
    pub(crate) fn test_connection(
        shard: &Arc<Shard>,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<OutboundFrame>) {
        connection_for(ClientId::new(), shard)
    }

    pub(crate) fn connection_for(
        client_id: ClientId,
        shard: &Arc<Shard>,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Connection::new(
            client_id,
            shard,
            RequestMetadata::default(),
            tx,
            CancellationToken::new(),
        );
        (Arc::new(connection), rx)
    }
}
