//! Reconnecting client worker.
//!
//! The worker owns one background task that connects to a server, runs the
//! shared receive loop against the connection and dispatches inbound text
//! messages through the same [`Dispatcher`] the server side uses. When the
//! connection fails or the server closes it, the task waits
//! `reconnect_delay` and tries again until it is stopped. Each attempt asks
//! the worker's [`ConnectSource`] for its target, so a source that fetches a
//! fresh invite gets the worker re-admitted after a disconnect.

use super::request::ConnectSource;
use super::transport::split_stream;
use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};
use crate::framing::{receive_loop, write_loop, CloseReason, InboundMessage, LoopExit, OutboundFrame};
use crate::pool::{shared_pool, BufferPool};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use switchyard_events::{DispatchError, DispatchOrigin, Dispatcher, Envelope, Replier};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Close reason sent when the worker is stopped.
pub const STOPPING_REASON: &str = "Service stopping.";

/// How long a closing connection may take to flush its close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Keeps a connection to a socket server alive and dispatches what it
/// receives.
pub struct ClientWorker {
    config: ClientConfig,
    source: Arc<dyn ConnectSource>,
    dispatcher: Arc<Dispatcher>,
    pool: Arc<BufferPool>,
    outbound: Mutex<Option<mpsc::UnboundedSender<OutboundFrame>>>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientWorker {
    /// Creates a worker that presents `config`'s URL, headers and cookies
    /// on every attempt.
    pub fn new(config: ClientConfig, dispatcher: Arc<Dispatcher>) -> Arc<Self> {
        let source: Arc<dyn ConnectSource> = Arc::new(config.clone());
        Self::with_source(config, source, dispatcher)
    }

    /// Creates a worker that asks `source` for the target of every attempt.
    /// `config` still supplies the reconnect delay.
    pub fn with_source(
        config: ClientConfig,
        source: Arc<dyn ConnectSource>,
        dispatcher: Arc<Dispatcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            source,
            dispatcher,
            pool: shared_pool(),
            outbound: Mutex::new(None),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Spawns the connection task. Has no effect if it is already running.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        info!("🔗 Starting client worker");
        *task = Some(tokio::spawn(self.clone().run()));
    }

    /// Closes the current connection with a normal close and joins the
    /// connection task.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Client worker task failed: {}", e);
            }
        }
        info!("🛑 Client worker stopped");
    }

    /// Whether a connection is currently established.
    pub fn is_connected(&self) -> bool {
        self.outbound
            .lock()
            .as_ref()
            .is_some_and(|outbound| !outbound.is_closed())
    }

    /// Serializes `envelope` and queues it on the live connection.
    pub fn send(&self, envelope: &Envelope) -> Result<(), ClientError> {
        let text = envelope
            .to_json()
            .map_err(|e| TransportError::Send(e.to_string()))?;
        let outbound = self.outbound.lock();
        let Some(sender) = outbound.as_ref() else {
            return Err(ClientError::NotConnected);
        };
        sender
            .send(OutboundFrame::Text(Arc::from(text)))
            .map_err(|_| ClientError::NotConnected)
    }

    async fn run(self: Arc<Self>) {
        while !self.shutdown.is_cancelled() {
            match self.connect_once().await {
                Ok(()) => {}
                Err(ClientError::RemoteClosed(reason)) => {
                    info!(reason = ?reason, "Server closed the connection");
                }
                Err(e) => warn!("❌ Client connection failed: {}", e),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {
                    debug!("Reconnecting");
                }
            }
        }
    }

    async fn connect_once(&self) -> Result<(), ClientError> {
        let target = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Ok(()),
            target = self.source.next_target() => target?,
        };
        let request = target.to_request()?;
        let socket = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Ok(()),
            connected = connect_async(request) => connected?.0,
        };
        info!(url = %target.url, "🔗 Connected");

        let (mut stream, sink) = split_stream(socket);
        let (sender, queue) = mpsc::unbounded_channel();
        let mut writer = tokio::spawn(write_loop(sink, queue));
        *self.outbound.lock() = Some(sender.clone());

        let connection = self.shutdown.child_token();
        let replier: Arc<dyn Replier> = Arc::new(ChannelReplier {
            outbound: sender.clone(),
        });
        let origin = DispatchOrigin::new(replier, connection.clone());
        let dispatcher = &self.dispatcher;

        let exit = receive_loop(&mut stream, &self.pool, &connection, |message| match message {
            InboundMessage::Text(text) => {
                dispatcher.dispatch_text(&text, origin.clone());
            }
            InboundMessage::Binary(data) => {
                debug!(bytes = data.len(), "Ignoring binary message");
            }
        })
        .await;

        *self.outbound.lock() = None;
        connection.cancel();

        // After a remote close the transport rejects this; the writer then
        // stops on the failed send.
        let reason = match exit {
            LoopExit::Cancelled => STOPPING_REASON,
            _ => "Closed by client",
        };
        let _ = sender.send(OutboundFrame::Close(CloseReason::normal(reason)));
        drop(sender);
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await.is_err() {
            writer.abort();
        }

        match exit {
            LoopExit::Cancelled => Ok(()),
            LoopExit::RemoteClosed(reason) => Err(ClientError::RemoteClosed(reason)),
            LoopExit::StreamEnded => Err(ClientError::StreamEnded),
            LoopExit::Fault(error) => Err(ClientError::Transport(error)),
        }
    }
}

/// Replies from client-side handlers go straight to the writer queue.
struct ChannelReplier {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
}

#[async_trait]
impl Replier for ChannelReplier {
    async fn reply(&self, envelope: &Envelope) -> Result<(), DispatchError> {
        let text = envelope.to_json()?;
        self.outbound
            .send(OutboundFrame::Text(Arc::from(text)))
            .map_err(|_| DispatchError::Reply("connection closed".to_string()))
    }

    fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::request::source_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchyard_events::ServiceRegistry;

    fn worker(config: ClientConfig) -> Arc<ClientWorker> {
        let dispatcher = Dispatcher::builder(Arc::new(ServiceRegistry::new())).build();
        ClientWorker::new(config, Arc::new(dispatcher))
    }

    #[tokio::test]
    async fn send_without_connection_fails() {
        let worker = worker(ClientConfig::default());
        assert!(!worker.is_connected());
        assert!(matches!(
            worker.send(&Envelope::new("ping")),
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn stop_interrupts_reconnect_delay() {
        // Nothing listens on port 9 of the loopback address.
        let mut config = ClientConfig::new("ws://127.0.0.1:9/ws");
        config.reconnect_delay = Duration::from_secs(3600);
        let worker = worker(config);
        worker.start();
        worker.start();

        tokio::time::sleep(Duration::from_millis(10)).await;
        worker.stop().await;
        assert!(!worker.is_connected());
    }

    #[tokio::test]
    async fn source_is_consulted_on_every_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = {
            let calls = calls.clone();
            source_fn(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::InvalidRequest("no invite yet".to_string())) }
            })
        };
        let mut config = ClientConfig::default();
        config.reconnect_delay = Duration::from_millis(5);
        let dispatcher = Dispatcher::builder(Arc::new(ServiceRegistry::new())).build();
        let worker = ClientWorker::with_source(config, Arc::new(source), Arc::new(dispatcher));

        worker.start();
        tokio::time::timeout(Duration::from_secs(5), async {
            while calls.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        worker.stop().await;
        assert!(!worker.is_connected());
    }
}
