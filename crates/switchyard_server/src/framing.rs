//! Transport-neutral framing shared by server sessions and the client worker.
//!
//! Both sides adapt their WebSocket library into a stream of [`Frame`]s and a
//! sink of [`OutboundFrame`]s. The receive loop here assembles frames into
//! whole messages and the writer loop owns the sink, so the rest of the
//! crate never touches a socket directly.

use crate::error::TransportError;
use crate::pool::BufferPool;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Close status codes used by the session layer.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const POLICY_VIOLATION: u16 = 1008;
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// Status code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(close_code::NORMAL, reason)
    }

    pub fn policy_violation(reason: impl Into<String>) -> Self {
        Self::new(close_code::POLICY_VIOLATION, reason)
    }

    pub fn internal_error(reason: impl Into<String>) -> Self {
        Self::new(close_code::INTERNAL_ERROR, reason)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

/// One frame as read from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// First (or only) fragment of a text message
    Text { data: Vec<u8>, fin: bool },
    /// First (or only) fragment of a binary message
    Binary { data: Vec<u8>, fin: bool },
    /// Follow-up fragment of the message in progress
    Continuation { data: Vec<u8>, fin: bool },
    Close(Option<CloseReason>),
    Ping,
    Pong,
}

/// A fully assembled message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Why a receive loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The peer sent a close frame
    RemoteClosed(Option<CloseReason>),
    /// The cancellation token fired
    Cancelled,
    /// The transport ended without a close frame
    StreamEnded,
    /// Reading from the transport failed
    Fault(TransportError),
}

/// What the writer task sends over the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(Arc<str>),
    Close(CloseReason),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Assembling {
    Text,
    Binary,
}

/// Reads frames until the peer closes, the transport fails or `cancel` fires.
///
/// Fragments are accumulated in a buffer checked out from `pool` for the
/// duration of the call; the buffer goes back to the pool when the function
/// returns, whichever way it returns. Only complete messages reach
/// `on_message`, and text messages only when non-empty. A message still
/// being assembled when the loop stops is discarded.
pub async fn receive_loop<S, F>(
    stream: &mut S,
    pool: &Arc<BufferPool>,
    cancel: &CancellationToken,
    mut on_message: F,
) -> LoopExit
where
    S: Stream<Item = Result<Frame, TransportError>> + Unpin,
    F: FnMut(InboundMessage),
{
    let mut scratch = pool.checkout();
    let mut assembling: Option<Assembling> = None;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return LoopExit::Cancelled,
            next = stream.next() => next,
        };

        let (data, fin) = match next {
            None => return LoopExit::StreamEnded,
            Some(Err(error)) => return LoopExit::Fault(error),
            Some(Ok(Frame::Close(reason))) => return LoopExit::RemoteClosed(reason),
            Some(Ok(Frame::Ping | Frame::Pong)) => continue,
            Some(Ok(Frame::Text { data, fin })) => {
                scratch.clear();
                assembling = Some(Assembling::Text);
                (data, fin)
            }
            Some(Ok(Frame::Binary { data, fin })) => {
                scratch.clear();
                assembling = Some(Assembling::Binary);
                (data, fin)
            }
            Some(Ok(Frame::Continuation { data, fin })) => {
                if assembling.is_none() {
                    trace!("Ignoring continuation frame with no message in progress");
                    continue;
                }
                (data, fin)
            }
        };

        scratch.extend_from_slice(&data);
        if !fin {
            continue;
        }

        match assembling.take() {
            Some(Assembling::Text) => {
                if scratch.is_empty() {
                    continue;
                }
                match std::str::from_utf8(&scratch) {
                    Ok(text) => on_message(InboundMessage::Text(text.to_owned())),
                    Err(error) => debug!(%error, "Dropping text message that is not valid UTF-8"),
                }
            }
            Some(Assembling::Binary) => on_message(InboundMessage::Binary(scratch.to_vec())),
            None => {}
        }
        scratch.clear();
    }
}

/// Drains `outbound` into `sink` until a close frame is written, the queue
/// is dropped or a send fails, then closes the sink.
///
/// The writer task is the only owner of the sink, so the transport is
/// released exactly once when this returns.
pub async fn write_loop<Si>(mut sink: Si, mut outbound: mpsc::UnboundedReceiver<OutboundFrame>)
where
    Si: Sink<OutboundFrame, Error = TransportError> + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        let closing = matches!(frame, OutboundFrame::Close(_));
        if let Err(error) = sink.send(frame).await {
            debug!(%error, "Writer stopping after failed send");
            break;
        }
        if closing {
            break;
        }
    }
    if let Err(error) = sink.close().await {
        trace!(%error, "Ignoring error while closing transport");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;
    use futures::stream;

    fn text(data: &str, fin: bool) -> Result<Frame, TransportError> {
        Ok(Frame::Text { data: data.as_bytes().to_vec(), fin })
    }

    fn cont(data: &str, fin: bool) -> Result<Frame, TransportError> {
        Ok(Frame::Continuation { data: data.as_bytes().to_vec(), fin })
    }

    async fn collect(frames: Vec<Result<Frame, TransportError>>) -> (Vec<InboundMessage>, LoopExit, Arc<BufferPool>) {
        let pool = Arc::new(BufferPool::new(16, 4));
        let mut frames = stream::iter(frames);
        let mut seen = Vec::new();
        let exit = receive_loop(&mut frames, &pool, &CancellationToken::new(), |m| seen.push(m)).await;
        (seen, exit, pool)
    }

    #[tokio::test]
    async fn assembles_fragmented_text() {
        let (seen, exit, pool) = collect(vec![
            text("{\"event\":", false),
            Ok(Frame::Ping),
            cont("\"ping\"", false),
            cont("}", true),
            text("second", true),
        ])
        .await;

        assert_eq!(
            seen,
            vec![
                InboundMessage::Text("{\"event\":\"ping\"}".into()),
                InboundMessage::Text("second".into()),
            ]
        );
        assert_eq!(exit, LoopExit::StreamEnded);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.retained(), 1);
    }

    #[tokio::test]
    async fn empty_text_is_skipped_and_binary_passes_through() {
        let (seen, _, _) = collect(vec![
            text("", true),
            Ok(Frame::Binary { data: vec![1, 2], fin: false }),
            Ok(Frame::Continuation { data: vec![3], fin: true }),
        ])
        .await;
        assert_eq!(seen, vec![InboundMessage::Binary(vec![1, 2, 3])]);
    }

    #[tokio::test]
    async fn close_frame_ends_loop_and_drops_partial_message() {
        let reason = CloseReason::normal("bye");
        let (seen, exit, pool) = collect(vec![
            text("partial", false),
            Ok(Frame::Close(Some(reason.clone()))),
            text("never", true),
        ])
        .await;
        assert!(seen.is_empty());
        assert_eq!(exit, LoopExit::RemoteClosed(Some(reason)));
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn transport_error_is_a_fault() {
        let failure = TransportError::Receive("reset".into());
        let (_, exit, pool) = collect(vec![Err(failure.clone())]).await;
        assert_eq!(exit, LoopExit::Fault(failure));
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn cancellation_never_dispatches_a_partial_message() {
        let pool = Arc::new(BufferPool::new(16, 4));
        let cancel = CancellationToken::new();
        let (tx, mut rx) = fmpsc::unbounded();
        tx.unbounded_send(text("half of", false)).unwrap();

        let task = {
            let pool = pool.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                let exit = receive_loop(&mut rx, &pool, &cancel, |m| seen.push(m)).await;
                (seen, exit)
            })
        };

        tokio::task::yield_now().await;
        cancel.cancel();
        let (seen, exit) = task.await.unwrap();
        // The rest of the message arrives too late to matter.
        tx.unbounded_send(cont(" a message", true)).ok();

        assert!(seen.is_empty());
        assert_eq!(exit, LoopExit::Cancelled);
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn writer_stops_after_close_and_closes_sink() {
        let (sink, mut written) = fmpsc::unbounded::<OutboundFrame>();
        let sink = sink.sink_map_err(|e| TransportError::Send(e.to_string()));
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(OutboundFrame::Text(Arc::from("one"))).unwrap();
        tx.send(OutboundFrame::Close(CloseReason::normal("done"))).unwrap();
        tx.send(OutboundFrame::Text(Arc::from("after close"))).unwrap();
        write_loop(sink, rx).await;

        assert_eq!(written.next().await, Some(OutboundFrame::Text(Arc::from("one"))));
        assert_eq!(
            written.next().await,
            Some(OutboundFrame::Close(CloseReason::normal("done")))
        );
        assert_eq!(written.next().await, None);
    }
}
