//! WebSocket progress stream.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::interval;
use tracing::{debug, info, warn};

use cutmirror_models::{ProgressEvent, SessionId};

use crate::error::ApiResult;
use crate::handlers::jobs::parse_session_id;
use crate::metrics;
use crate::state::AppState;

/// GET /ws/jobs/:id
///
/// Sends the latest event, then every later one, and closes after the
/// terminal event.
pub async fn ws_job_progress(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Response> {
    let session_id = parse_session_id(&session_id)?;
    // Unknown sessions are rejected before the upgrade.
    let (latest, rx) = state.jobs.subscribe(&session_id).await?;
    Ok(ws.on_upgrade(move |socket| stream_progress(socket, state, session_id, latest, rx)))
}

async fn stream_progress(
    socket: WebSocket,
    state: AppState,
    session_id: SessionId,
    latest: ProgressEvent,
    mut rx: tokio::sync::broadcast::Receiver<ProgressEvent>,
) {
    metrics::record_ws_connection();
    info!(session_id = %session_id, "WebSocket subscribed");

    let (mut sender, mut receiver) = socket.split();
    let mut heartbeat = interval(state.config.ws_heartbeat);
    heartbeat.tick().await;

    let mut done = !send_event(&mut sender, &latest).await || latest.status.is_terminal();

    while !done {
        tokio::select! {
            received = rx.recv() => {
                let event = match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        // Intermediate events are replaceable; resend the latest.
                        debug!(session_id = %session_id, skipped, "Subscriber lagged");
                        match state.jobs.status(&session_id).await {
                            Ok(event) => event,
                            Err(_) => break,
                        }
                    }
                    Err(RecvError::Closed) => break,
                };
                done = !send_event(&mut sender, &event).await || event.status.is_terminal();
            }
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, error = %e, "WebSocket receive failed");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    metrics::record_ws_disconnect();
    info!(session_id = %session_id, "WebSocket closed");
}

async fn send_event<S>(sender: &mut S, event: &ProgressEvent) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize progress event");
            return false;
        }
    };
    let sent = sender.send(Message::Text(json)).await.is_ok();
    if sent {
        metrics::record_ws_message_sent(event.status.as_str());
    }
    sent
}
