//! # Shard Registry
//!
//! Shards are in-process groups of connections used to spread load. They
//! are not separate endpoints: every shard is reached through the same
//! upgrade path, and the invite decides which shard a connection joins.
//!
//! Selection picks the least-loaded active shard that still has room and
//! creates a new shard when none qualifies. Selection works from a load
//! snapshot, so concurrent admissions can land on the same shard; the cap
//! is a balancing hint, not a hard limit.

use crate::connection::Connection;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchyard_events::SessionId;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Unique identifier for a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ShardId(pub Uuid);

impl ShardId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ShardId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ShardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A logical group of connections.
#[derive(Debug)]
pub struct Shard {
    id: ShardId,
    url: String,
    created_at: Instant,
    created_at_utc: chrono::DateTime<chrono::Utc>,
    active: AtomicBool,
    max_connections: usize,
    connections: DashMap<SessionId, Arc<Connection>>,
}

impl Shard {
    fn new(url: String, max_connections: usize) -> Self {
        Self {
            id: ShardId::new(),
            url,
            created_at: Instant::now(),
            created_at_utc: chrono::Utc::now(),
            active: AtomicBool::new(true),
            max_connections,
            connections: DashMap::new(),
        }
    }

    pub fn id(&self) -> ShardId {
        self.id
    }

    /// URL clients use to reach this shard.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.connection_count() < self.max_connections
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.connections.contains_key(session_id)
    }

    /// Adds a connection to this shard.
    pub fn attach(&self, connection: Arc<Connection>) {
        self.connections.insert(connection.session_id(), connection);
    }

    /// Removes a connection, returning it if it was attached.
    pub fn detach(&self, session_id: &SessionId) -> Option<Arc<Connection>> {
        self.connections.remove(session_id).map(|(_, connection)| connection)
    }

    /// Point-in-time copy of the attached connections.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|entry| entry.value().clone()).collect()
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Serializable view of this shard.
    pub fn snapshot(&self) -> ShardSnapshot {
        ShardSnapshot {
            id: self.id,
            current_connections: self.connection_count(),
            max_connections: self.max_connections,
            is_active: self.is_active(),
            created_at: self.created_at_utc,
        }
    }
}

/// Per-shard entry of the server statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShardSnapshot {
    pub id: ShardId,
    pub current_connections: usize,
    pub max_connections: usize,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Owner of all shards.
#[derive(Debug)]
pub struct ShardRegistry {
    shards: DashMap<ShardId, Arc<Shard>>,
    url: String,
    max_connections_per_shard: usize,
    idle_threshold: Duration,
}

impl ShardRegistry {
    pub fn new(url: impl Into<String>, max_connections_per_shard: usize, idle_threshold: Duration) -> Self {
        Self {
            shards: DashMap::new(),
            url: url.into(),
            max_connections_per_shard,
            idle_threshold,
        }
    }

    /// Creates an empty, active shard.
    pub fn create_shard(&self) -> Arc<Shard> {
        let shard = Arc::new(Shard::new(self.url.clone(), self.max_connections_per_shard));
        self.shards.insert(shard.id(), shard.clone());
        info!(shard = %shard.id(), total = self.shards.len(), "🧩 Created shard");
        shard
    }

    /// Picks the least-loaded active shard with spare capacity, creating
    /// one if none qualifies.
    pub fn select_or_create(&self) -> Arc<Shard> {
        let candidate = self
            .snapshot()
            .into_iter()
            .filter(|shard| shard.is_active() && shard.has_capacity())
            .min_by_key(|shard| shard.connection_count());

        match candidate {
            Some(shard) => shard,
            None => self.create_shard(),
        }
    }

    /// Attaches `connection` to `shard` if the shard is still registered
    /// and active afterwards.
    ///
    /// The sweep only removes shards it sees empty, so once the attach is
    /// visible the shard can no longer be swept. If the sweep won the race
    /// the connection is detached again and `false` is returned.
    pub fn attach_live(&self, shard: &Arc<Shard>, connection: Arc<Connection>) -> bool {
        let session_id = connection.session_id();
        shard.attach(connection);
        let live = shard.is_active()
            && self
                .get(&shard.id())
                .is_some_and(|registered| Arc::ptr_eq(&registered, shard));
        if !live {
            shard.detach(&session_id);
            debug!(shard = %shard.id(), session = %session_id, "Shard swept before attach");
        }
        live
    }

    pub fn get(&self, id: &ShardId) -> Option<Arc<Shard>> {
        self.shards.get(id).map(|entry| entry.value().clone())
    }

    /// Point-in-time copy of all shards.
    pub fn snapshot(&self) -> Vec<Arc<Shard>> {
        self.shards.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn active_count(&self) -> usize {
        self.shards.iter().filter(|entry| entry.is_active()).count()
    }

    pub fn total_connections(&self) -> usize {
        self.shards.iter().map(|entry| entry.connection_count()).sum()
    }

    /// Deactivates and removes empty shards older than the idle threshold.
    ///
    /// Oldest shards go first, and at least one active shard is always kept.
    /// Returns the ids of the removed shards.
    pub fn sweep_idle(&self) -> Vec<ShardId> {
        let now = Instant::now();
        let mut idle: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter(|shard| {
                shard.connection_count() == 0
                    && now.saturating_duration_since(shard.created_at()) > self.idle_threshold
            })
            .collect();
        idle.sort_by_key(|shard| shard.created_at());

        let mut active = self.active_count();
        let mut removed = Vec::new();
        for shard in idle {
            if shard.is_active() {
                if active <= 1 {
                    break;
                }
                active -= 1;
            }
            // A connection may have been admitted since the snapshot.
            let taken = self
                .shards
                .remove_if(&shard.id(), |_, candidate| candidate.connection_count() == 0);
            if let Some((id, shard)) = taken {
                shard.deactivate();
                removed.push(id);
            } else if shard.is_active() {
                active += 1;
            }
        }

        if !removed.is_empty() {
            info!(removed = removed.len(), remaining = self.shards.len(), "🧹 Swept idle shards");
        } else {
            debug!(shards = self.shards.len(), "No idle shards to sweep");
        }
        removed
    }
}
