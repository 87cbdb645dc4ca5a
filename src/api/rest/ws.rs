use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::models::tracking::TrackingEvent;
use crate::state::AppState;

/// Streams tracking events for one tracking id as they are appended.
pub async fn live_tracking(
    ws: WebSocketUpgrade,
    Path(tracking_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, tracking_id))
}

fn events_for(
    rx: broadcast::Receiver<TrackingEvent>,
    tracking_id: String,
) -> impl Stream<Item = TrackingEvent> + Send + 'static {
    BroadcastStream::new(rx).filter_map(move |result| {
        let event = match result {
            Ok(event) if event.tracking_id == tracking_id => Some(event),
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "live tracking subscriber lagged");
                None
            }
        };
        futures::future::ready(event)
    })
}

/// Waits for either task to end and aborts the other one.
async fn first_to_finish(mut send_task: JoinHandle<()>, mut recv_task: JoinHandle<()>) {
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, tracking_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = Box::pin(events_for(state.tracking.subscribe(), tracking_id.clone()));

    info!(tracking_id = %tracking_id, "live tracking client connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize tracking event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    // The filtered stream may never yield again, so a closed client must
    // cancel the sender explicitly.
    first_to_finish(send_task, recv_task).await;

    info!(tracking_id = %tracking_id, "live tracking client disconnected");
}
