use std::sync::Arc;
use axum::{
    extract::{State, ws::{Message, WebSocket, WebSocketUpgrade}},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::models::{ClientEvent, ServerEvent};
use crate::utils::scope_guard::ScopeGuard;
use crate::websocket::msg_run_handler::handle_run_message;

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt");
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    // Split the socket into sender and receiver
    let (mut sender, mut receiver) = socket.split();

    // Everything addressed to this connection goes through its outbox
    let (outbox, mut inbox) = mpsc::unbounded_channel::<ServerEvent>();

    let conn_id = match app_state.hub.connect(outbox.clone()).await {
        Ok(conn_id) => conn_id,
        Err(e) => {
            error!("Failed to open session: {}", e);
            return;
        }
    };
    info!("WebSocket connection established with connection_id: {}", conn_id);

    // Release the session exactly once, however this function exits
    let hub = app_state.hub.clone();
    let _release = ScopeGuard::new(move || hub.disconnect(conn_id));

    // Drain the outbox into the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize event for {}: {}", conn_id, e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Read client frames and hand them to the hub or the runner
    let hub = app_state.hub.clone();
    let runner = app_state.runner.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let event = match ClientEvent::parse(&text) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Ignoring frame from {}: {}", conn_id, e);
                    continue;
                }
            };
            debug!("Received {:?} from {}", event, conn_id);

            if let ClientEvent::RunPython { code, ack } = event {
                handle_run_message(code, ack, conn_id, runner.clone(), outbox.clone());
                continue;
            }
            if hub.dispatch(conn_id, event).is_err() {
                error!("Hub is gone, closing connection {}", conn_id);
                break;
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    info!("WebSocket connection {} terminated", conn_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::memory::MemoryStore;
    use crate::hub::HubHandle;
    use crate::models::{AckReply, InitPayload, RunResult};
    use crate::routes::create_app;
    use crate::runner::CodeRunner;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    struct FixedRunner;

    #[async_trait]
    impl CodeRunner for FixedRunner {
        async fn run(&self, _code: &str) -> RunResult {
            RunResult::Output("1\n".into())
        }
    }

    async fn start_server() -> SocketAddr {
        let store = Arc::new(MemoryStore::new());
        let (hub, _) = HubHandle::spawn(store.clone(), store, 100);
        let config = Config::default();
        let state = Arc::new(AppState {
            hub,
            runner: Arc::new(FixedRunner),
            config,
        });
        let app = create_app(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn open(addr: SocketAddr) -> Client {
        let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        client
    }

    async fn emit(client: &mut Client, frame: Value) {
        client
            .send(tungstenite::Message::text(frame.to_string()))
            .await
            .unwrap();
    }

    async fn next_event(client: &mut Client) -> ServerEvent {
        loop {
            let message = client.next().await.unwrap().unwrap();
            if let Ok(text) = message.to_text() {
                if !text.is_empty() {
                    return serde_json::from_str(text).unwrap();
                }
            }
        }
    }

    async fn expect_init(client: &mut Client) -> InitPayload {
        let init = match next_event(client).await {
            ServerEvent::Init(init) => init,
            other => panic!("expected init, got {other:?}"),
        };
        assert!(matches!(next_event(client).await, ServerEvent::OnlineUsers(_)));
        assert!(matches!(next_event(client).await, ServerEvent::TypingUsers(_)));
        init
    }

    #[tokio::test]
    async fn late_joiner_receives_latest_code_and_chat() {
        let addr = start_server().await;

        let mut alice = open(addr).await;
        assert_eq!(expect_init(&mut alice).await, InitPayload::default());

        emit(&mut alice, json!({"event": "register-username", "data": "alice"})).await;
        assert_eq!(
            next_event(&mut alice).await,
            ServerEvent::OnlineUsers(vec!["alice".into()])
        );

        emit(&mut alice, json!({"event": "code-change", "data": "print(1)"})).await;
        emit(&mut alice, json!({"event": "send-message", "data": {"username": "alice", "text": "hi"}})).await;
        // The echo of our own message orders it after the code change
        assert!(matches!(next_event(&mut alice).await, ServerEvent::ReceiveMessage(_)));

        let mut bob = open(addr).await;
        let init = expect_init(&mut bob).await;
        assert_eq!(init.code, "print(1)");
        assert_eq!(init.messages.len(), 1);
        assert_eq!(init.messages[0].username, "alice");

        emit(&mut bob, json!({"event": "register-username", "data": "bob"})).await;
        assert_eq!(
            next_event(&mut alice).await,
            ServerEvent::OnlineUsers(vec!["alice".into(), "bob".into()])
        );

        emit(&mut bob, json!({"event": "code-change", "data": "print(2)"})).await;
        assert_eq!(next_event(&mut alice).await, ServerEvent::CodeUpdate("print(2)".into()));

        bob.close(None).await.unwrap();
        assert_eq!(
            next_event(&mut alice).await,
            ServerEvent::OnlineUsers(vec!["alice".into()])
        );
    }

    #[tokio::test]
    async fn run_reply_and_bad_frames_stay_with_the_requester() {
        let addr = start_server().await;
        let mut alice = open(addr).await;
        expect_init(&mut alice).await;

        emit(&mut alice, json!({"event": "no-such-event"})).await;
        alice
            .send(tungstenite::Message::text("{not json".to_string()))
            .await
            .unwrap();
        emit(&mut alice, json!({"event": "run-python", "data": "print(1)", "ack": 5})).await;

        assert_eq!(
            next_event(&mut alice).await,
            ServerEvent::Ack(AckReply {
                ack: 5,
                result: RunResult::Output("1\n".into())
            })
        );
    }
}
