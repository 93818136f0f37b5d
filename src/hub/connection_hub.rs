use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::notifier::Notifier;
use super::presence::PresenceTracker;
use super::session::{ConnId, Session};
use super::typing::TypingTracker;
use crate::db::{ChatStore, DocumentStore, StoreError, DOCUMENT_KEY};
use crate::models::{ChatLine, ChatMessage, InitPayload, OutgoingChat, ServerEvent};

/// Counters exposed through the diagnostics endpoint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HubStats {
    pub sessions: usize,
    pub online: usize,
    pub typing: usize,
}

/// Presence, typing and broadcast state of all connected sessions.
///
/// Every method runs to completion before the next one starts; the actor in
/// `hub::actor` is the only caller in production.
pub struct Hub<N: Notifier> {
    sessions: HashMap<ConnId, Session>,
    presence: PresenceTracker,
    typing: TypingTracker,
    notifier: N,
    documents: Arc<dyn DocumentStore>,
    chats: Arc<dyn ChatStore>,
    history_limit: usize,
    last_message_at: Option<DateTime<Utc>>,
}

impl<N: Notifier> Hub<N> {
    pub fn new(
        notifier: N,
        documents: Arc<dyn DocumentStore>,
        chats: Arc<dyn ChatStore>,
        history_limit: usize,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            presence: PresenceTracker::new(),
            typing: TypingTracker::new(),
            notifier,
            documents,
            chats,
            history_limit,
            last_message_at: None,
        }
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            sessions: self.sessions.len(),
            online: self.presence.len(),
            typing: self.typing.len(),
        }
    }

    /// Allocate a session with no display name bound yet
    pub fn on_connect(&mut self) -> Session {
        let session = Session::new();
        self.sessions.insert(session.id, session.clone());
        debug!("Session {} connected ({} total)", session.id, self.sessions.len());
        session
    }

    /// Bind `name` to the session and broadcast the online users
    pub fn on_register(&mut self, conn: ConnId, name: String) {
        let Some(session) = self.sessions.get_mut(&conn) else {
            warn!("Register from unknown connection {}", conn);
            return;
        };

        info!("Connection {} registered as '{}'", conn, name);
        session.display_name = Some(name.clone());
        self.presence.register(conn, name.clone());
        self.broadcast(ServerEvent::OnlineUsers(self.presence.names()));

        if self.typing.rename(conn, &name) {
            self.broadcast(ServerEvent::TypingUsers(self.typing.names()));
        }
    }

    /// Drop the session and broadcast whatever presence/typing state changed.
    /// Returns `false` if the session was already gone.
    pub fn on_disconnect(&mut self, conn: ConnId) -> bool {
        if self.sessions.remove(&conn).is_none() {
            return false;
        }
        info!("Session {} disconnected ({} remaining)", conn, self.sessions.len());

        if self.presence.remove(conn) {
            self.broadcast(ServerEvent::OnlineUsers(self.presence.names()));
        }
        if self.typing.stop(conn) {
            self.broadcast(ServerEvent::TypingUsers(self.typing.names()));
        }
        true
    }

    /// Persist the new document content, then forward it to every other session
    pub async fn on_document_edit(&mut self, conn: ConnId, content: String) {
        if !self.sessions.contains_key(&conn) {
            warn!("Code change from unknown connection {}", conn);
            return;
        }

        let documents = Arc::clone(&self.documents);
        if let Err(e) =
            persist_with_retry("code", conn, || documents.upsert_latest(DOCUMENT_KEY, &content)).await
        {
            error!("Code change from {} was not persisted: {}", conn, e);
        }

        self.broadcast_except(conn, ServerEvent::CodeUpdate(content));
    }

    /// Persist a chat message and broadcast it to everyone, sender included.
    /// Blank messages are dropped.
    pub async fn on_chat_send(&mut self, conn: ConnId, chat: OutgoingChat) {
        if chat.text.trim().is_empty() {
            debug!("Dropping blank chat message from {}", conn);
            return;
        }
        let Some(session) = self.sessions.get(&conn) else {
            warn!("Chat message from unknown connection {}", conn);
            return;
        };

        let username = match &session.display_name {
            Some(name) => name.clone(),
            None if !chat.username.trim().is_empty() => chat.username,
            None => {
                warn!("Dropping chat message from unregistered connection {}", conn);
                return;
            }
        };

        let message = ChatMessage {
            username,
            text: chat.text,
            timestamp: self.next_timestamp(),
        };

        let chats = Arc::clone(&self.chats);
        if let Err(e) = persist_with_retry("chat message", conn, || chats.append(DOCUMENT_KEY, &message)).await {
            error!("Chat message from {} was not persisted: {}", conn, e);
        }

        self.broadcast(ServerEvent::ReceiveMessage(ChatLine::from(&message)));
    }

    /// Mark a session with a non-empty name as typing. Broadcasts even when
    /// already typing.
    pub fn on_typing_start(&mut self, conn: ConnId) {
        let Some(name) = self
            .sessions
            .get(&conn)
            .and_then(|s| s.display_name.clone())
            .filter(|name| !name.is_empty())
        else {
            debug!("Ignoring typing signal from unnamed connection {}", conn);
            return;
        };
        self.typing.start(conn, name);
        self.broadcast(ServerEvent::TypingUsers(self.typing.names()));
    }

    /// Clear the typing flag; broadcasts only if the session was typing
    pub fn on_typing_stop(&mut self, conn: ConnId) {
        if self.typing.stop(conn) {
            self.broadcast(ServerEvent::TypingUsers(self.typing.names()));
        }
    }

    /// Send the current document, chat history, online and typing users to
    /// `conn` alone. Store failures yield an empty document and history.
    pub async fn on_initial_sync(&mut self, conn: ConnId) -> InitPayload {
        let payload = match self.load_initial_payload().await {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to load initial data for {}: {}", conn, e);
                InitPayload::default()
            }
        };

        self.notifier.notify(conn, ServerEvent::Init(payload.clone()));
        self.notifier.notify(conn, ServerEvent::OnlineUsers(self.presence.names()));
        self.notifier.notify(conn, ServerEvent::TypingUsers(self.typing.names()));
        payload
    }

    async fn load_initial_payload(&self) -> Result<InitPayload, StoreError> {
        let code = self.documents.latest(DOCUMENT_KEY).await?.unwrap_or_default();
        let messages = self.chats.recent(DOCUMENT_KEY, self.history_limit).await?;
        Ok(InitPayload {
            code,
            messages: messages.iter().map(ChatLine::from).collect(),
        })
    }

    // Arrival time, never earlier than the previous message
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_message_at {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_message_at = Some(at);
        at
    }

    fn broadcast(&mut self, event: ServerEvent) {
        for conn in self.sessions.keys() {
            self.notifier.notify(*conn, event.clone());
        }
    }

    fn broadcast_except(&mut self, origin: ConnId, event: ServerEvent) {
        for conn in self.sessions.keys().filter(|c| **c != origin) {
            self.notifier.notify(*conn, event.clone());
        }
    }

    #[cfg(test)]
    fn typing_connections(&self) -> Vec<ConnId> {
        self.typing.connections().copied().collect()
    }

    #[cfg(test)]
    fn is_online(&self, conn: ConnId) -> bool {
        self.presence.contains(conn)
    }
}

/// Run a write, retrying once if the first attempt fails
async fn persist_with_retry<F, Fut>(what: &str, conn: ConnId, mut op: F) -> Result<(), StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
{
    match op().await {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!("Saving {} from {} failed, retrying once: {}", what, conn, e);
            op().await
        }
    }
}
