//! WebSocket transport for change events.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

use crate::web::api::AppState;

/// `GET /ws`: subscribes on open, unsubscribes on close.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(socket: WebSocket, state: AppState) {
    let subscription = state.notifier.subscribe();
    let handle = subscription.handle;
    let mut events = subscription.events;
    let (mut sink, mut stream) = socket.split();

    // The notifier drops this subscriber when its queue fills or closes,
    // which ends `events` and with it the forwarding task.
    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = events.recv().await {
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.notifier.unsubscribe(handle);
}
