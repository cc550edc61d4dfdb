//! Adapts a tungstenite socket to the crate's frame stream and sink.

use crate::error::TransportError;
use crate::framing::{CloseReason, Frame, OutboundFrame};
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

pub(crate) fn split_stream<S>(
    socket: S,
) -> (
    impl Stream<Item = Result<Frame, TransportError>> + Unpin + Send,
    impl Sink<OutboundFrame, Error = TransportError> + Unpin + Send + 'static,
)
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send + 'static,
{
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
            data: text.as_bytes().to_vec(),
            fin: true,
        },
        Message::Binary(data) => Frame::Binary {
            data: data.to_vec(),
            fin: true,
        },
        Message::Ping(_) => Frame::Ping,
        // Raw frames only surface when writing; treat them as noise.
        Message::Pong(_) | Message::Frame(_) => Frame::Pong,
        Message::Close(frame) => Frame::Close(
            frame.map(|frame| CloseReason::new(u16::from(frame.code), frame.reason.as_str())),
        ),
    }
}

fn into_message(frame: OutboundFrame) -> Message {
    match frame {
        OutboundFrame::Text(text) => Message::text(text.to_string()),
        OutboundFrame::Close(close) => Message::Close(Some(CloseFrame {
            code: CloseCode::from(close.code),
            reason: close.reason.into(),
        })),
    }
}
