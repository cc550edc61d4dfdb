//! Global index from client identity to its live connection.

use super::client::Connection;
use crate::shards::Shard;
use dashmap::DashMap;
use std::sync::Arc;
use switchyard_events::{ClientId, Envelope, SessionId};
use tracing::{debug, warn};

/// A connection together with the shard it is attached to.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub connection: Arc<Connection>,
    pub shard: Arc<Shard>,
}

/// Result of a targeted send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued on the connection's writer
    Delivered,
    /// No connection is registered for the identity
    UnknownClient,
    /// The connection is closing or closed
    NotOpen,
    /// The message could not be queued
    Failed,
}

/// Concurrent map of admitted clients.
///
/// Lookups are O(1) and [`snapshot`](ClientDirectory::snapshot) copies the
/// entries out, so broadcasts never hold a map lock while sending.
#[derive(Debug, Default)]
pub struct ClientDirectory {
    entries: DashMap<ClientId, DirectoryEntry>,
}

impl ClientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, client_id: &ClientId) -> Option<DirectoryEntry> {
        self.entries.get(client_id).map(|entry| entry.value().clone())
    }

    /// Registers `connection`, returning the entry it replaced.
    pub fn put(&self, connection: Arc<Connection>, shard: Arc<Shard>) -> Option<DirectoryEntry> {
        self.entries
            .insert(connection.client_id(), DirectoryEntry { connection, shard })
    }

    /// Removes the entry for `client_id` only if it still belongs to
    /// `session_id`, so a superseded session cannot evict its successor.
    pub fn remove_session(&self, client_id: &ClientId, session_id: SessionId) -> Option<DirectoryEntry> {
        self.entries
            .remove_if(client_id, |_, entry| entry.connection.session_id() == session_id)
            .map(|(_, entry)| entry)
    }

    pub fn contains_session(&self, client_id: &ClientId, session_id: SessionId) -> bool {
        self.entries
            .get(client_id)
            .map(|entry| entry.connection.session_id() == session_id)
            .unwrap_or(false)
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> Vec<DirectoryEntry> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sends `envelope` to the connection registered for `client_id`.
    ///
    /// Never fails: unknown or closed targets are logged and reported
    /// through the returned [`SendOutcome`].
    pub fn send_to(&self, client_id: &ClientId, envelope: &Envelope) -> SendOutcome {
        let Some(entry) = self.get(client_id) else {
            warn!(client = %client_id, event = %envelope.event, "Send to unknown client ignored");
            return SendOutcome::UnknownClient;
        };
        if !entry.connection.is_open() {
            warn!(client = %client_id, event = %envelope.event, "Send to closed connection ignored");
            return SendOutcome::NotOpen;
        }
        match entry.connection.send(envelope) {
            Ok(()) => {
                debug!(client = %client_id, event = %envelope.event, "📤 Sent");
                SendOutcome::Delivered
            }
            Err(error) => {
                warn!(client = %client_id, event = %envelope.event, %error, "❌ Send failed");
                SendOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::{connection_for, test_connection};
    use crate::framing::OutboundFrame;
    use crate::shards::ShardRegistry;
    use std::time::Duration;

    fn shard() -> Arc<Shard> {
        ShardRegistry::new("/ws", 10, Duration::from_secs(600)).create_shard()
    }

    #[tokio::test]
    async fn send_to_unknown_client_is_a_noop() {
        let directory = ClientDirectory::new();
        assert_eq!(
            directory.send_to(&ClientId::new(), &Envelope::new("ping")),
            SendOutcome::UnknownClient
        );
    }

    #[tokio::test]
    async fn send_to_reaches_the_registered_connection() {
        let directory = ClientDirectory::new();
        let shard = shard();
        let (connection, mut rx) = test_connection(&shard);
        let client = connection.client_id();
        directory.put(connection, shard);

        assert_eq!(directory.send_to(&client, &Envelope::new("ping")), SendOutcome::Delivered);
        assert_eq!(
            rx.recv().await,
            Some(OutboundFrame::Text(Arc::from(r#"{"event":"ping","body":null}"#)))
        );
    }

    #[tokio::test]
    async fn send_to_closing_connection_is_skipped() {
        let directory = ClientDirectory::new();
        let shard = shard();
        let (connection, _rx) = test_connection(&shard);
        let client = connection.client_id();
        connection.close(crate::framing::CloseReason::normal("bye"));
        directory.put(connection, shard);

        assert_eq!(directory.send_to(&client, &Envelope::new("ping")), SendOutcome::NotOpen);
    }

    #[tokio::test]
    async fn stale_session_cannot_remove_its_successor() {
        let directory = ClientDirectory::new();
        let shard = shard();
        let (old, _old_rx) = test_connection(&shard);
        let client = old.client_id();
        let (new, _new_rx) = connection_for(client, &shard);

        assert!(directory.put(old.clone(), shard.clone()).is_none());
        let replaced = directory.put(new.clone(), shard.clone()).unwrap();
        assert_eq!(replaced.connection.session_id(), old.session_id());

        assert!(directory.remove_session(&client, old.session_id()).is_none());
        assert!(directory.contains_session(&client, new.session_id()));
        assert!(directory.remove_session(&client, new.session_id()).is_some());
        assert!(directory.is_empty());
    }
}
