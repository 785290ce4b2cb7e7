use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use desk_state::{Desktop, Snapshot};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tracing::{debug, error, info, warn};

use crate::AppState;

/// Upgrade to a subscriber stream of full-state snapshots.
pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let desktop = state.desktop.clone();
    ws.on_upgrade(move |socket| handle_subscriber(socket, desktop))
}

/// Drive one subscriber connection until either side goes away.
///
/// The client receives the current state immediately, then one frame per
/// committed mutation. Inbound frames other than Close are ignored.
pub async fn handle_subscriber(socket: WebSocket, desktop: Arc<Desktop>) {
    let (mut subscription, initial) = desktop.subscribe().await;
    let conn_id = subscription.id();
    info!(conn_id = %conn_id, "Subscriber connected at v{}", initial.version);

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let sender_task = async {
        let mut last_sent = initial.version;
        if send_snapshot(&mut ws_sender, &initial).await.is_err() {
            return;
        }

        while let Some(snapshot) = subscription.recv().await {
            // Queued behind a newer one we already sent
            if snapshot.version < last_sent {
                debug!(conn_id = %conn_id, "Skipping stale v{}", snapshot.version);
                continue;
            }
            last_sent = snapshot.version;
            if send_snapshot(&mut ws_sender, &snapshot).await.is_err() {
                return;
            }
        }

        // Stream closed by the registry: pruned or shutting down
        let _ = ws_sender.send(Message::Close(None)).await;
    };

    let receiver_task = async {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(conn_id = %conn_id, "WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!(conn_id = %conn_id, "Sender task ended"),
        _ = receiver_task => debug!(conn_id = %conn_id, "Receiver task ended"),
    }

    desktop.disconnect(conn_id).await;
    info!(conn_id = %conn_id, "Subscriber disconnected");
}

async fn send_snapshot(
    ws_sender: &mut SplitSink<WebSocket, Message>,
    snapshot: &Snapshot,
) -> Result<(), ()> {
    let json = match snapshot.to_json() {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize snapshot v{}: {}", snapshot.version, e);
            return Err(());
        }
    };
    ws_sender.send(Message::Text(json.into())).await.map_err(|e| {
        warn!("Failed to send snapshot v{}: {}", snapshot.version, e);
    })
}
