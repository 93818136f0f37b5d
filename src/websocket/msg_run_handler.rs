use std::sync::Arc;
use tracing::{debug, info};

use crate::hub::{ConnId, Outbox};
use crate::models::{AckReply, ServerEvent};
use crate::runner::CodeRunner;

/// Handle a run-python request off the hub; the result goes to the requester only
pub fn handle_run_message(
    code: String,
    ack: Option<u64>,
    conn_id: ConnId,
    runner: Arc<dyn CodeRunner>,
    outbox: Outbox,
) {
    info!("Run request from connection {} ({} bytes)", conn_id, code.len());

    tokio::spawn(async move {
        let result = runner.run(&code).await;

        let Some(ack) = ack else {
            debug!("Run request from {} had no ack id, discarding result", conn_id);
            return;
        };
        if outbox.send(ServerEvent::Ack(AckReply { ack, result })).is_err() {
            debug!("Connection {} closed before its run result was ready", conn_id);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunResult;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct EchoRunner;

    #[async_trait]
    impl CodeRunner for EchoRunner {
        async fn run(&self, code: &str) -> RunResult {
            RunResult::Output(code.to_uppercase())
        }
    }

    #[tokio::test]
    async fn replies_once_with_the_ack_id() {
        let (outbox, mut rx) = mpsc::unbounded_channel();
        handle_run_message("print".into(), Some(7), ConnId::new(), Arc::new(EchoRunner), outbox);

        assert_eq!(
            rx.recv().await,
            Some(ServerEvent::Ack(AckReply {
                ack: 7,
                result: RunResult::Output("PRINT".into())
            }))
        );
        // The spawned task dropped its sender after replying
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn no_reply_without_ack_id() {
        let (outbox, mut rx) = mpsc::unbounded_channel();
        handle_run_message("print".into(), None, ConnId::new(), Arc::new(EchoRunner), outbox);
        assert_eq!(rx.recv().await, None);
    }
}
