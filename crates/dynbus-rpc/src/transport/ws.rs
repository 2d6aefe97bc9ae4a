use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use dynbus_core::error::{DynbusError, Result};

use super::{FrameSink, FrameStream, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send_frame(&mut self, frame: String) -> Result<()> {
        self.0.send(Message::Text(frame)).await.map_err(|e| {
            tracing::debug!(error = %e, "websocket send failed");
            DynbusError::ConnectionClosed
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.0
            .close()
            .await
            .map_err(|e| DynbusError::Internal(format!("websocket close failed: {e}")))
    }
}

struct WsFrames(SplitStream<WsStream>);

#[async_trait]
impl FrameStream for WsFrames {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        loop {
            match self.0.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Text(s))) => return Ok(Some(s)),
                Some(Ok(Message::Binary(_))) => {
                    return Err(DynbusError::BadRequest(
                        "binary frames are not supported".into(),
                    ))
                }
                // ping/pong are answered by tungstenite
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "websocket receive failed");
                    return Err(DynbusError::ConnectionClosed);
                }
            }
        }
    }
}

pub(super) async fn connect(url: &str) -> Result<Transport> {
    let (ws, _resp) = connect_async(url)
        .await
        .map_err(|e| DynbusError::Internal(format!("connect to {url} failed: {e}")))?;
    tracing::info!(%url, "connected to router");
    let (sink, stream) = ws.split();
    Ok(Transport::from_parts(
        Box::new(WsSink(sink)),
        Box::new(WsFrames(stream)),
    ))
}
