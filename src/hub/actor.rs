use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::connection_hub::{Hub, HubStats};
use super::notifier::{ChannelNotifier, Outbox};
use super::session::ConnId;
use crate::db::{ChatStore, DocumentStore};
use crate::models::{ClientEvent, OutgoingChat};

#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub is not running")]
    Closed,
}

/// Work items consumed, one at a time, by the hub task
#[derive(Debug)]
pub enum HubCommand {
    Connect {
        outbox: Outbox,
        reply: oneshot::Sender<ConnId>,
    },
    Register {
        conn: ConnId,
        name: String,
    },
    CodeChange {
        conn: ConnId,
        content: String,
    },
    SendMessage {
        conn: ConnId,
        chat: OutgoingChat,
    },
    TypingStart {
        conn: ConnId,
    },
    TypingStop {
        conn: ConnId,
    },
    Disconnect {
        conn: ConnId,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

impl HubCommand {
    /// Map a client event to a hub command. `run-python` never reaches the hub.
    pub fn from_client(conn: ConnId, event: ClientEvent) -> Option<Self> {
        match event {
            ClientEvent::RegisterUsername(name) => Some(HubCommand::Register { conn, name }),
            ClientEvent::CodeChange(content) => Some(HubCommand::CodeChange { conn, content }),
            ClientEvent::SendMessage(chat) => Some(HubCommand::SendMessage { conn, chat }),
            ClientEvent::ChatTyping => Some(HubCommand::TypingStart { conn }),
            ClientEvent::ChatStopTyping => Some(HubCommand::TypingStop { conn }),
            ClientEvent::RunPython { .. } => None,
        }
    }
}

/// Cloneable entry point to the hub task
#[derive(Clone, Debug)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// Start the hub task over the given stores
    pub fn spawn(
        documents: Arc<dyn DocumentStore>,
        chats: Arc<dyn ChatStore>,
        history_limit: usize,
    ) -> (Self, JoinHandle<()>) {
        let hub = Hub::new(ChannelNotifier::new(), documents, chats, history_limit);
        let (commands, inbox) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(hub, inbox));
        (Self { commands }, task)
    }

    fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.commands.send(command).map_err(|_| HubError::Closed)
    }

    /// Open a session; its initial sync is queued on `outbox` before this returns
    pub async fn connect(&self, outbox: Outbox) -> Result<ConnId, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Connect { outbox, reply })?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Forward a client event. Returns `Ok(false)` for events the hub does not handle.
    pub fn dispatch(&self, conn: ConnId, event: ClientEvent) -> Result<bool, HubError> {
        match HubCommand::from_client(conn, event) {
            Some(command) => self.send(command).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn disconnect(&self, conn: ConnId) {
        if self.send(HubCommand::Disconnect { conn }).is_err() {
            error!("Hub stopped before connection {} was released", conn);
        }
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats { reply })?;
        rx.await.map_err(|_| HubError::Closed)
    }
}

async fn run(mut hub: Hub<ChannelNotifier>, mut inbox: mpsc::UnboundedReceiver<HubCommand>) {
    info!("Hub started");
    while let Some(command) = inbox.recv().await {
        match command {
            HubCommand::Connect { outbox, reply } => {
                let session = hub.on_connect();
                hub.notifier_mut().attach(session.id, outbox);
                hub.on_initial_sync(session.id).await;
                if reply.send(session.id).is_err() {
                    // The socket went away while we were syncing
                    debug!("Connection {} dropped before connect completed", session.id);
                    hub.on_disconnect(session.id);
                    hub.notifier_mut().detach(session.id);
                }
            }
            HubCommand::Register { conn, name } => hub.on_register(conn, name),
            HubCommand::CodeChange { conn, content } => hub.on_document_edit(conn, content).await,
            HubCommand::SendMessage { conn, chat } => hub.on_chat_send(conn, chat).await,
            HubCommand::TypingStart { conn } => hub.on_typing_start(conn),
            HubCommand::TypingStop { conn } => hub.on_typing_stop(conn),
            HubCommand::Disconnect { conn } => {
                hub.on_disconnect(conn);
                hub.notifier_mut().detach(conn);
            }
            HubCommand::Stats { reply } => {
                let _ = reply.send(hub.stats());
            }
        }
    }
    info!("Hub stopped");
}
