//! Adapts an axum [`WebSocket`] to the crate's frame stream and sink.
//!
//! axum reassembles fragmented messages itself, so every frame produced
//! here is final.

use crate::error::TransportError;
use crate::framing::{CloseReason, Frame, OutboundFrame};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use std::borrow::Cow;

pub(crate) fn split_socket(
    socket: WebSocket,
) -> (
    impl Stream<Item = Result<Frame, TransportError>> + Unpin + Send,
    impl Sink<OutboundFrame, Error = TransportError> + Unpin + Send + 'static,
) {
    let (sink, stream) = socket.split();
    let stream = stream.map(|message| {
        message
            .map(into_frame)
            .map_err(|e| TransportError::Receive(e.to_string()))
    });
    let sink = sink
        .sink_map_err(|e| TransportError::Send(e.to_string()))
        .with(|frame: OutboundFrame| future::ready(Ok::<_, TransportError>(into_message(frame))));
    (stream, sink)
}

fn into_frame(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text {
            data: text.into_bytes(),
            fin: true,
        },
        Message::Binary(data) => Frame::Binary { data, fin: true },
        Message::Ping(_) => Frame::Ping,
        Message::Pong(_) => Frame::Pong,
        Message::Close(frame) => {
            Frame::Close(frame.map(|frame| CloseReason::new(frame.code, frame.reason.into_owned())))
        }
    }
}

fn into_message(frame: OutboundFrame) -> Message {
    match frame {
        OutboundFrame::Text(text) => Message::Text(text.to_string()),
        OutboundFrame::Close(close) => Message::Close(Some(CloseFrame {
            code: close.code,
            reason: Cow::Owned(close.reason),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn close_frames_keep_code_and_reason() {
        let message = into_message(OutboundFrame::Close(CloseReason::policy_violation("nope")));
        let Message::Close(Some(frame)) = message.clone() else {
            panic!("expected close message, got {message:?}");
        };
        assert_eq!(frame.code, 1008);
        assert_eq!(
            into_frame(message),
            Frame::Close(Some(CloseReason::policy_violation("nope")))
        );
    }

    #[test]
    fn text_is_a_final_frame() {
        let message = into_message(OutboundFrame::Text(Arc::from("{}")));
        assert_eq!(
            into_frame(message),
            Frame::Text { data: b"{}".to_vec(), fin: true }
        );
    }
}
