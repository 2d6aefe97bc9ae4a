use async_trait::async_trait;
use tokio::sync::mpsc;

use dynbus_core::error::{DynbusError, Result};

use super::{FrameSink, FrameStream, Transport};

struct ChannelSink(Option<mpsc::Sender<String>>);

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_frame(&mut self, frame: String) -> Result<()> {
        let tx = self.0.as_ref().ok_or(DynbusError::ConnectionClosed)?;
        tx.send(frame)
            .await
            .map_err(|_| DynbusError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.0 = None;
        Ok(())
    }
}

struct ChannelStream(mpsc::Receiver<String>);

#[async_trait]
impl FrameStream for ChannelStream {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        Ok(self.0.recv().await)
    }
}

pub(super) fn pair(tx: mpsc::Sender<String>, rx: mpsc::Receiver<String>) -> Transport {
    Transport::from_parts(Box::new(ChannelSink(Some(tx))), Box::new(ChannelStream(rx)))
}
