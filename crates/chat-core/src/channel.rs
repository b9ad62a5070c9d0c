use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::types::{DelegateEvent, EngineCommand};

/// Broadcast delegate-event stream consumed by UI subscribers.
pub type DelegateStream = broadcast::Receiver<DelegateEvent>;

/// Errors returned by engine channel operations.
#[derive(Debug, Error)]
pub enum EngineChannelError {
    /// The engine task is gone and no longer accepts commands.
    #[error("engine command channel is closed")]
    CommandChannelClosed,
}

/// Command/delegate channel pair connecting callers to the engine task.
///
/// Commands are serialized into a single `mpsc` queue (the chat-engine
/// queue); delegate events fan out over `broadcast` so slow consumers
/// cannot stall the engine.
#[derive(Clone, Debug)]
pub struct EngineChannels {
    command_tx: mpsc::Sender<EngineCommand>,
    delegate_tx: broadcast::Sender<DelegateEvent>,
}

impl EngineChannels {
    /// Create a new channel set and return it with the command receiver.
    pub fn new(
        command_buffer: usize,
        delegate_buffer: usize,
    ) -> (Self, mpsc::Receiver<EngineCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (delegate_tx, _) = broadcast::channel(delegate_buffer.max(1));

        (
            Self {
                command_tx,
                delegate_tx,
            },
            command_rx,
        )
    }

    /// Clone the command sender.
    pub fn command_sender(&self) -> mpsc::Sender<EngineCommand> {
        self.command_tx.clone()
    }

    /// Subscribe to emitted delegate events.
    pub fn subscribe(&self) -> DelegateStream {
        self.delegate_tx.subscribe()
    }

    /// Send one command to the engine task.
    pub async fn send_command(&self, command: EngineCommand) -> Result<(), EngineChannelError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| EngineChannelError::CommandChannelClosed)
    }

    /// Emit a delegate event to all subscribers.
    ///
    /// Emission is best-effort; lagged subscribers are handled by
    /// `broadcast`.
    pub fn emit(&self, event: DelegateEvent) {
        let _ = self.delegate_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PeerId;

    #[tokio::test]
    async fn sends_commands_to_receiver() {
        let (channels, mut rx) = EngineChannels::new(8, 8);
        let peer_id = PeerId::random();
        channels
            .send_command(EngineCommand::Reconcile { peer_id })
            .await
            .expect("command send should work");

        let command = rx.recv().await.expect("receiver should have a command");
        match command {
            EngineCommand::Reconcile { peer_id: got } => assert_eq!(got, peer_id),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fans_out_delegate_events_to_subscribers() {
        let (channels, _) = EngineChannels::new(4, 16);
        let mut a = channels.subscribe();
        let mut b = channels.subscribe();

        let event = DelegateEvent::ReadyToChat {
            peer_id: PeerId::random(),
        };
        channels.emit(event.clone());

        assert_eq!(a.recv().await.expect("subscriber a"), event);
        assert_eq!(b.recv().await.expect("subscriber b"), event);
    }

    #[tokio::test]
    async fn reports_closed_command_channel() {
        let (channels, rx) = EngineChannels::new(1, 1);
        drop(rx);

        let err = channels
            .send_command(EngineCommand::Reconcile {
                peer_id: PeerId::random(),
            })
            .await
            .expect_err("send into closed channel must fail");
        assert!(matches!(err, EngineChannelError::CommandChannelClosed));
    }
}
