//! Reply path from handlers back to the originating connection.

use super::client::Connection;
use async_trait::async_trait;
use std::sync::Arc;
use switchyard_events::{DispatchError, Envelope, Replier};

/// [`Replier`] over an accepted server connection.
#[derive(Debug, Clone)]
pub struct ConnectionReplier {
    connection: Arc<Connection>,
}

impl ConnectionReplier {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl Replier for ConnectionReplier {
    async fn reply(&self, envelope: &Envelope) -> Result<(), DispatchError> {
        self.connection
            .send(envelope)
            .map_err(|error| DispatchError::Reply(error.to_string()))
    }

    fn is_open(&self) -> bool {
        self.connection.is_open()
    }
}
