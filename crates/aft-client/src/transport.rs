//! WebSocket duplex channel to the worker.
//!
//! A [`Channel`] owns the write half of the socket; a spawned reader task
//! owns the read half and feeds decoded frames into an ordered event queue.
//! Frames are delivered strictly in receipt order — the consumer side is a
//! single task, so downstream state never sees reordering.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use aft_core::error::{AftError, AftResult};
use aft_core::messages::{decode_frame, WorkerMessage};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Channel lifecycle and data events, in receipt order.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A decoded inbound frame.
    Frame(WorkerMessage),
    /// The peer closed the channel (or the stream ended).
    Closed,
    /// Transport-level failure; the channel is gone.
    Error(String),
}

/// An open duplex channel to the worker.
pub struct Channel {
    sink: Arc<Mutex<WsSink>>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl Channel {
    /// Open a WebSocket to the given endpoint and spawn the reader task.
    ///
    /// Returns the channel plus the receiver for its ordered event queue.
    pub async fn connect(endpoint: &str) -> AftResult<(Self, mpsc::Receiver<ChannelEvent>)> {
        let (ws_stream, _response) = connect_async(endpoint)
            .await
            .map_err(|e| AftError::Channel(format!("connect error: {e}")))?;

        tracing::info!(endpoint, "channel connected");

        let (sink, stream) = ws_stream.split();
        let sink = Arc::new(Mutex::new(sink));

        let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(256);

        let reader_handle = {
            let sink = sink.clone();
            tokio::spawn(async move {
                read_loop(stream, event_tx, sink).await;
            })
        };

        Ok((
            Self {
                sink,
                reader_handle,
            },
            event_rx,
        ))
    }

    /// Write one text frame to the channel.
    pub async fn send_text(&self, text: String) -> AftResult<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| AftError::Channel(format!("send error: {e}")))
    }

    /// Close the channel and stop the reader task.
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        self.reader_handle.abort();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").finish_non_exhaustive()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

/// Reader loop: decode inbound frames and push events until the stream ends.
///
/// A frame that fails to decode is dropped with a log line — a per-frame
/// failure, never a channel-level error.
async fn read_loop(mut stream: WsStream, event_tx: mpsc::Sender<ChannelEvent>, sink: Arc<Mutex<WsSink>>) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match decode_frame(&text) {
                Ok(frame) => {
                    if event_tx.send(ChannelEvent::Frame(frame)).await.is_err() {
                        tracing::debug!("event queue closed, stopping reader");
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed frame");
                }
            },
            Ok(Message::Ping(payload)) => {
                let mut sink = sink.lock().await;
                let _ = sink.send(Message::Pong(payload)).await;
            }
            Ok(Message::Close(_)) => {
                tracing::debug!("close frame received");
                let _ = event_tx.send(ChannelEvent::Closed).await;
                return;
            }
            Ok(_) => {} // binary, pong — not part of the protocol
            Err(e) => {
                tracing::error!(error = %e, "channel read error");
                let _ = event_tx.send(ChannelEvent::Error(e.to_string())).await;
                return;
            }
        }
    }

    // Stream ended without a close frame.
    let _ = event_tx.send(ChannelEvent::Closed).await;
}
