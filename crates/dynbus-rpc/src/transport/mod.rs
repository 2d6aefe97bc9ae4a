//! Envelope transport.
//!
//! One JSON document per physical message. The transport knows envelopes,
//! not messages: batching and correlation live in the endpoint. Connection
//! loss is terminal; there is no reconnect.

mod channel;
mod ws;

use async_trait::async_trait;
use tokio::sync::mpsc;

use dynbus_core::error::Result;
use dynbus_core::protocol::Envelope;

/// Write half of a frame connection.
#[async_trait]
pub trait FrameSink: Send + 'static {
    async fn send_frame(&mut self, frame: String) -> Result<()>;

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Read half of a frame connection. `Ok(None)` is an orderly end.
#[async_trait]
pub trait FrameStream: Send + 'static {
    async fn next_frame(&mut self) -> Result<Option<String>>;
}

pub struct Transport {
    sink: Box<dyn FrameSink>,
    stream: Box<dyn FrameStream>,
}

impl Transport {
    pub fn from_parts(sink: Box<dyn FrameSink>, stream: Box<dyn FrameStream>) -> Self {
        Self { sink, stream }
    }

    /// WebSocket client connection to a router.
    pub async fn connect(url: &str) -> Result<Self> {
        ws::connect(url).await
    }

    /// In-process connection: frames go out on `tx`, come in on `rx`.
    pub fn from_channels(tx: mpsc::Sender<String>, rx: mpsc::Receiver<String>) -> Self {
        channel::pair(tx, rx)
    }

    pub fn split(self) -> (TransportSender, TransportReceiver) {
        (
            TransportSender { sink: self.sink },
            TransportReceiver {
                stream: self.stream,
            },
        )
    }
}

pub struct TransportSender {
    sink: Box<dyn FrameSink>,
}

impl TransportSender {
    pub async fn send(&mut self, env: &Envelope) -> Result<()> {
        let frame = env.to_json()?;
        tracing::debug!(to = ?env.to, "--> {frame}");
        self.sink.send_frame(frame).await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await
    }
}

pub struct TransportReceiver {
    stream: Box<dyn FrameStream>,
}

impl TransportReceiver {
    /// Next envelope, `Ok(None)` once the peer hung up.
    pub async fn receive(&mut self) -> Result<Option<Envelope>> {
        let Some(frame) = self.stream.next_frame().await? else {
            return Ok(None);
        };
        tracing::debug!("<-- {frame}");
        Envelope::parse(&frame).map(Some)
    }
}
