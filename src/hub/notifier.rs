use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

use super::session::ConnId;
use crate::models::ServerEvent;

/// Outbound queue of a single connection
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

/// Delivers hub events to individual connections
pub trait Notifier: Send {
    fn notify(&mut self, conn: ConnId, event: ServerEvent);
}

/// Notifier writing into the per-connection outboxes drained by the socket tasks
#[derive(Default)]
pub struct ChannelNotifier {
    outboxes: HashMap<ConnId, Outbox>,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, conn: ConnId, outbox: Outbox) {
        self.outboxes.insert(conn, outbox);
    }

    pub fn detach(&mut self, conn: ConnId) {
        self.outboxes.remove(&conn);
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&mut self, conn: ConnId, event: ServerEvent) {
        match self.outboxes.get(&conn) {
            Some(outbox) => {
                if outbox.send(event).is_err() {
                    debug!("Outbox of connection {} is closed", conn);
                }
            }
            None => debug!("No outbox attached for connection {}", conn),
        }
    }
}

#[cfg(test)]
pub mod recording {
    use super::*;

    /// Notifier that keeps every delivery for inspection
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Vec<(ConnId, ServerEvent)>,
    }

    impl RecordingNotifier {
        /// Drain everything delivered so far
        pub fn take(&mut self) -> Vec<(ConnId, ServerEvent)> {
            std::mem::take(&mut self.sent)
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&mut self, conn: ConnId, event: ServerEvent) {
            self.sent.push((conn, event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_only_to_attached_outboxes() {
        let mut notifier = ChannelNotifier::new();
        let (a, b) = (ConnId::new(), ConnId::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        notifier.attach(a, tx);

        notifier.notify(a, ServerEvent::CodeUpdate("x".into()));
        notifier.notify(b, ServerEvent::CodeUpdate("y".into()));
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::CodeUpdate("x".into()));
        assert!(rx.try_recv().is_err());

        notifier.detach(a);
        notifier.notify(a, ServerEvent::CodeUpdate("z".into()));
        assert!(rx.try_recv().is_err());
    }
}
