//! Fan-out of one message to many connections.

use crate::connection::{ClientDirectory, Connection};
use std::sync::Arc;
use switchyard_events::Envelope;
use tracing::{debug, warn};

/// Counts from one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections considered (the directory snapshot size)
    pub attempted: usize,
    /// Messages queued successfully
    pub delivered: usize,
    /// Sends that failed
    pub failed: usize,
    /// Connections skipped by shard state, predicate or connection state
    pub skipped: usize,
}

/// Sends one serialized message to every matching open connection.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    directory: Arc<ClientDirectory>,
}

impl Broadcaster {
    pub fn new(directory: Arc<ClientDirectory>) -> Self {
        Self { directory }
    }

    /// Broadcasts to every open connection in an active shard.
    pub fn broadcast(&self, envelope: &Envelope) -> Result<BroadcastReport, serde_json::Error> {
        self.broadcast_filtered(envelope, |_| true)
    }

    /// Broadcasts to open connections in active shards that satisfy
    /// `predicate`.
    ///
    /// The envelope is serialized once. Connections added or removed while
    /// the broadcast runs may or may not receive it. `predicate` only sees
    /// open connections in active shards. A connection that closes after
    /// that check counts as failed and the fan-out continues.
    pub fn broadcast_filtered<P>(&self, envelope: &Envelope, predicate: P) -> Result<BroadcastReport, serde_json::Error>
    where
        P: Fn(&Connection) -> bool,
    {
        let payload: Arc<str> = Arc::from(envelope.to_json()?);
        let targets = self.directory.snapshot();
        let mut report = BroadcastReport {
            attempted: targets.len(),
            ..BroadcastReport::default()
        };

        for entry in targets {
            let connection = &entry.connection;
            if !entry.shard.is_active() || !connection.is_open() || !predicate(connection) {
                report.skipped += 1;
                continue;
            }
            match connection.send_text(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    report.failed += 1;
                    warn!(client = %connection.client_id(), %error, "Broadcast send failed");
                }
            }
        }

        debug!(
            event = %envelope.event,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "📢 Broadcast complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::test_connection;
    use crate::framing::OutboundFrame;
    use crate::shards::ShardRegistry;
    use std::time::Duration;

    #[tokio::test]
    async fn predicate_limits_recipients() {
        let registry = ShardRegistry::new("/ws", 10, Duration::from_secs(600));
        let shard = registry.create_shard();
        let directory = Arc::new(ClientDirectory::new());

        let (chosen, mut chosen_rx) = test_connection(&shard);
        let (other, mut other_rx) = test_connection(&shard);
        directory.put(chosen.clone(), shard.clone());
        directory.put(other.clone(), shard.clone());

        let target = chosen.client_id();
        let report = Broadcaster::new(directory)
            .broadcast_filtered(&Envelope::new("news"), |c| c.client_id() == target)
            .unwrap();

        assert_eq!(report, BroadcastReport { attempted: 2, delivered: 1, failed: 0, skipped: 1 });
        assert!(matches!(chosen_rx.try_recv(), Ok(OutboundFrame::Text(_))));
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broken_connection_does_not_stop_the_rest() {
        let registry = ShardRegistry::new("/ws", 10, Duration::from_secs(600));
        let shard = registry.create_shard();
        let directory = Arc::new(ClientDirectory::new());

        let (broken, broken_rx) = test_connection(&shard);
        drop(broken_rx);
        directory.put(broken, shard.clone());

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (healthy, rx) = test_connection(&shard);
            directory.put(healthy, shard.clone());
            receivers.push(rx);
        }

        let report = Broadcaster::new(directory).broadcast(&Envelope::new("tick")).unwrap();
        assert_eq!(report.attempted, 4);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.skipped, 1);
        for mut rx in receivers {
            assert!(matches!(rx.try_recv(), Ok(OutboundFrame::Text(text)) if text.contains("tick")));
        }
    }

    #[tokio::test]
    async fn send_failing_after_open_check_is_counted_and_fan_out_continues() {
        let registry = ShardRegistry::new("/ws", 10, Duration::from_secs(600));
        let shard = registry.create_shard();
        let directory = Arc::new(ClientDirectory::new());

        let (vanishing, vanishing_rx) = test_connection(&shard);
        let vanishing_id = vanishing.client_id();
        directory.put(vanishing, shard.clone());

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (healthy, rx) = test_connection(&shard);
            directory.put(healthy, shard.clone());
            receivers.push(rx);
        }

        // The writer goes away after the connection passed the open check.
        let writer = parking_lot::Mutex::new(Some(vanishing_rx));
        let report = Broadcaster::new(directory)
            .broadcast_filtered(&Envelope::new("tick"), |connection| {
                if connection.client_id() == vanishing_id {
                    drop(writer.lock().take());
                }
                true
            })
            .unwrap();

        assert_eq!(report, BroadcastReport { attempted: 4, delivered: 3, failed: 1, skipped: 0 });
        for mut rx in receivers {
            assert!(matches!(rx.try_recv(), Ok(OutboundFrame::Text(text)) if text.contains("tick")));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_shards_and_closing_connections_are_skipped() {
        let registry = ShardRegistry::new("/ws", 10, Duration::from_secs(600));
        let stale = registry.create_shard();
        tokio::time::advance(Duration::from_secs(601)).await;
        let live = registry.create_shard();
        let directory = Arc::new(ClientDirectory::new());

        let (open, mut open_rx) = test_connection(&live);
        let (closing, _closing_rx) = test_connection(&live);
        let (orphaned, mut orphaned_rx) = test_connection(&stale);
        closing.close(crate::framing::CloseReason::normal("bye"));
        directory.put(open, live.clone());
        directory.put(closing, live.clone());
        directory.put(orphaned, stale.clone());

        assert_eq!(registry.sweep_idle(), vec![stale.id()]);

        let report = Broadcaster::new(directory).broadcast(&Envelope::new("tick")).unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 2);
        assert!(open_rx.try_recv().is_ok());
        assert!(orphaned_rx.try_recv().is_err());
    }
}
