//! # Invite Ledger
//!
//! Single-use, time-limited admission tokens.
//!
//! An invite binds a prospective client identity to the shard it should
//! join. The token is redeemed once during the upgrade handshake; redeeming
//! it flips the `used` flag under the map's per-entry write lock, so two
//! concurrent redemptions of one token can never both succeed.

use crate::shards::ShardId;
use dashmap::DashMap;
use std::time::Duration;
use switchyard_events::ClientId;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// An issued admission token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub token: String,
    pub shard_id: ShardId,
    pub client_id: ClientId,
    pub created_at: Instant,
    pub expires_at: Instant,
    pub used: bool,
}

impl Invite {
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Why a token was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InviteRejection {
    #[error("Token not found.")]
    NotFound,
    #[error("Token already used.")]
    AlreadyUsed,
    #[error("Token expired.")]
    Expired,
}

/// Store of outstanding invites keyed by token.
#[derive(Debug, Default)]
pub struct InviteLedger {
    invites: DashMap<String, Invite>,
}

impl InviteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a token for `client_id` to join `shard_id` within `ttl`.
    ///
    /// Tokens are 128 random bits from the OS generator, rendered as hex.
    pub fn issue(&self, shard_id: ShardId, client_id: ClientId, ttl: Duration) -> Invite {
        let now = Instant::now();
        let invite = Invite {
            token: Uuid::new_v4().simple().to_string(),
            shard_id,
            client_id,
            created_at: now,
            expires_at: now + ttl,
            used: false,
        };
        self.invites.insert(invite.token.clone(), invite.clone());
        debug!(shard = %shard_id, client = %client_id, "🎟️ Issued invite");
        invite
    }

    /// Redeems `token`.
    ///
    /// Fails with [`InviteRejection::NotFound`] for unknown tokens,
    /// [`InviteRejection::AlreadyUsed`] for redeemed ones and
    /// [`InviteRejection::Expired`] once the expiry has passed, in which
    /// case the entry is evicted. On success the invite is marked used and
    /// a copy is returned.
    pub fn validate(&self, token: &str) -> Result<Invite, InviteRejection> {
        let now = Instant::now();
        let outcome = match self.invites.get_mut(token) {
            None => Err(InviteRejection::NotFound),
            Some(mut invite) => {
                if invite.used {
                    Err(InviteRejection::AlreadyUsed)
                } else if invite.is_expired_at(now) {
                    Err(InviteRejection::Expired)
                } else {
                    invite.used = true;
                    Ok(invite.clone())
                }
            }
        };

        if matches!(outcome, Err(InviteRejection::Expired)) {
            self.invites.remove_if(token, |_, invite| invite.is_expired_at(now));
        }
        outcome
    }

    pub fn get(&self, token: &str) -> Option<Invite> {
        self.invites.get(token).map(|invite| invite.value().clone())
    }

    /// Removes every invite past its expiry, returning how many went.
    pub fn reap_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.invites.len();
        self.invites.retain(|_, invite| !invite.is_expired_at(now));
        let reaped = before.saturating_sub(self.invites.len());
        if reaped > 0 {
            info!(reaped, pending = self.invites.len(), "🧹 Reaped expired invites");
        }
        reaped
    }

    /// Invites not yet redeemed.
    pub fn pending(&self) -> usize {
        self.invites.iter().filter(|invite| !invite.used).count()
    }

    pub fn len(&self) -> usize {
        self.invites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn invite_redeems_exactly_once() {
        let ledger = InviteLedger::new();
        let shard = ShardId::new();
        let client = ClientId::new();
        let invite = ledger.issue(shard, client, FIVE_MINUTES);

        let redeemed = ledger.validate(&invite.token).unwrap();
        assert_eq!(redeemed.shard_id, shard);
        assert_eq!(redeemed.client_id, client);
        assert!(redeemed.used);
        assert!(ledger.get(&invite.token).unwrap().used);

        assert_eq!(ledger.validate(&invite.token), Err(InviteRejection::AlreadyUsed));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_invite_is_rejected_and_evicted() {
        let ledger = InviteLedger::new();
        let invite = ledger.issue(ShardId::new(), ClientId::new(), FIVE_MINUTES);

        tokio::time::advance(FIVE_MINUTES + Duration::from_millis(1)).await;

        assert_eq!(ledger.validate(&invite.token), Err(InviteRejection::Expired));
        assert!(ledger.get(&invite.token).is_none());
        assert_eq!(ledger.validate(&invite.token), Err(InviteRejection::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn invite_is_valid_up_to_its_expiry() {
        let ledger = InviteLedger::new();
        let invite = ledger.issue(ShardId::new(), ClientId::new(), FIVE_MINUTES);
        tokio::time::advance(FIVE_MINUTES).await;
        assert!(ledger.validate(&invite.token).is_ok());
    }

    #[test]
    fn unknown_token_is_not_found() {
        let ledger = InviteLedger::new();
        assert_eq!(ledger.validate("nope"), Err(InviteRejection::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn reaping_removes_only_expired_invites() {
        let ledger = InviteLedger::new();
        let stale = ledger.issue(ShardId::new(), ClientId::new(), Duration::from_secs(10));
        let fresh = ledger.issue(ShardId::new(), ClientId::new(), FIVE_MINUTES);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(ledger.reap_expired(), 1);
        assert!(ledger.get(&stale.token).is_none());
        assert!(ledger.get(&fresh.token).is_some());
        assert_eq!(ledger.pending(), 1);
    }

    #[test]
    fn tokens_are_unique() {
        let ledger = InviteLedger::new();
        let a = ledger.issue(ShardId::new(), ClientId::new(), FIVE_MINUTES);
        let b = ledger.issue(ShardId::new(), ClientId::new(), FIVE_MINUTES);
        assert_ne!(a.token, b.token);
        assert_eq!(a.token.len(), 32);
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_redemption_has_a_single_winner() {
        let ledger = Arc::new(InviteLedger::new());
        let invite = ledger.issue(ShardId::new(), ClientId::new(), FIVE_MINUTES);

        let attempts: Vec<_> = (0..32)
            .map(|_| {
                let ledger = ledger.clone();
                let token = invite.token.clone();
                tokio::spawn(async move { ledger.validate(&token) })
            })
            .collect();

        let mut accepted = 0;
        let mut reused = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(InviteRejection::AlreadyUsed) => reused += 1,
                Err(other) => panic!("unexpected rejection: {other:?}"),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(reused, 31);
    }
}
