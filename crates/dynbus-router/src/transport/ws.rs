//! WebSocket handler.
//!
//! - Upgrade HTTP -> WS (frame size capped by `router.max_frame_bytes`)
//! - One select! loop per connection: outbound queue, inbound frames,
//!   heartbeat ping, idle timeout
//! - Frames go to the connection's `NodeSession`; a `Close` decision ends the
//!   loop after the queued error reply has been flushed

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::Instrument;

use dynbus_core::error::{DynbusError, Result};

use crate::app_state::AppState;
use crate::broker::FrameDecision;
use crate::transport::codec::{decode, Inbound};

pub async fn ws_upgrade(State(app): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let max = app.cfg().router.max_frame_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| {
            async move {
                if let Err(e) = run_session(app, socket).await {
                    tracing::debug!(error = %e, "session ended with error");
                }
            }
            .instrument(tracing::info_span!("ws"))
        })
}

async fn run_session(app: AppState, socket: WebSocket) -> Result<()> {
    let r = &app.cfg().router;

    let (out_tx, mut out_rx) = mpsc::channel::<String>(r.outbound_queue);
    let mut session = app.broker().open_session(out_tx);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let ping_every = Duration::from_millis(r.ping_interval_ms);
    let idle_timeout = Duration::from_millis(r.idle_timeout_ms);

    let mut ping_tick = tokio::time::interval(ping_every);
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();
    let mut result = Ok(());

    loop {
        tokio::select! {
            maybe_out = out_rx.recv() => {
                let Some(frame) = maybe_out else { break };
                if ws_tx.send(Message::Text(frame)).await.is_err() {
                    result = Err(DynbusError::ConnectionClosed);
                    break;
                }
            }

            incoming = ws_rx.next() => {
                let Some(Ok(msg)) = incoming else { break };
                last_activity = Instant::now();

                match decode(msg) {
                    Ok(Inbound::Text(text)) => {
                        if session.handle_frame(&text).await == FrameDecision::Close {
                            break;
                        }
                    }
                    Ok(Inbound::Ping(payload)) => {
                        if ws_tx.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Inbound::Pong) => {}
                    Ok(Inbound::Close) => break,
                    Err(e) => {
                        session.fail(&e);
                        break;
                    }
                }
            }

            _ = ping_tick.tick() => {
                if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if last_activity.elapsed() >= idle_timeout {
                    tracing::info!("idle timeout");
                    break;
                }
            }
        }
    }

    // flush replies queued by the last frame (fatal error notices)
    while let Ok(frame) = out_rx.try_recv() {
        if ws_tx.send(Message::Text(frame)).await.is_err() {
            break;
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;

    session.close().await;
    result
}
