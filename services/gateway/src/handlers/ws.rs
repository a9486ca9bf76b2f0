use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use market_data::Session;
use tracing::debug;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut session, mut outbox) = Session::open(state.broadcaster.clone());
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = outbox.recv() => {
                // A closed outbox means the broadcaster dropped this session
                let Some(frame) = frame else {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                if sender.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        session.handle_text(text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(session = %session.id(), error = %err, "Socket error");
                        break;
                    }
                }
            }
        }
    }
    // Dropping the session releases its subscriptions
}
