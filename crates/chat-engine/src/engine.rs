use std::{
    collections::HashMap,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use chat_core::{
    chat_user_id, peer_id_from, CannotChatReason, ChatError, DelegateEvent, DelegateStream,
    EngineChannelError, EngineChannels, EngineCommand, MatchEvent, MatchState, PeerId, PushEvent,
};

use crate::{facade::ChatBackend, match_state::MatchStateSource, registry::RoomRegistry};

/// Static engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The local user's own peer identifier.
    pub peer_id: PeerId,
    /// Home server name used to derive backend user IDs.
    pub home_server: String,
    /// Last read timestamp per relationship, in milliseconds since epoch.
    pub last_reads: HashMap<PeerId, u64>,
    /// Command channel buffer size.
    pub command_buffer: usize,
    /// Delegate broadcast buffer size.
    pub delegate_buffer: usize,
}

impl EngineConfig {
    pub fn new(peer_id: PeerId, home_server: impl Into<String>) -> Self {
        Self {
            peer_id,
            home_server: home_server.into(),
            last_reads: HashMap::new(),
            command_buffer: 128,
            delegate_buffer: 512,
        }
    }
}

/// Cloneable handle for interacting with a spawned engine task.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    channels: EngineChannels,
    cancel: CancellationToken,
}

impl EngineHandle {
    /// Subscribe to delegate events.
    pub fn subscribe(&self) -> DelegateStream {
        self.channels.subscribe()
    }

    /// Request a reconciliation pass for `peer_id`.
    pub async fn reconcile(&self, peer_id: PeerId) -> Result<(), EngineChannelError> {
        self.channels
            .send_command(EngineCommand::Reconcile { peer_id })
            .await
    }

    /// Whether a message to `peer_id` could currently be delivered.
    pub async fn can_chat(&self, peer_id: PeerId) -> Option<ChatError> {
        let (reply, response) = oneshot::channel();
        if self
            .channels
            .send_command(EngineCommand::CanChat { peer_id, reply })
            .await
            .is_err()
        {
            return Some(ChatError::Fatal("engine is not running".to_owned()));
        }

        match response.await {
            Ok(answer) => answer,
            Err(_) => Some(ChatError::Fatal("engine dropped the reply".to_owned())),
        }
    }

    /// Send a text message to the canonical room of `peer_id`.
    pub async fn send(
        &self,
        message: impl Into<String>,
        peer_id: PeerId,
    ) -> Result<String, ChatError> {
        let (reply, response) = oneshot::channel();
        self.channels
            .send_command(EngineCommand::Send {
                peer_id,
                message: message.into(),
                reply,
            })
            .await
            .map_err(|_| ChatError::Fatal("engine is not running".to_owned()))?;

        response
            .await
            .map_err(|_| ChatError::Fatal("engine dropped the reply".to_owned()))?
    }

    /// Send read receipts for all messages with `peer_id`.
    pub async fn mark_all_read(&self, peer_id: PeerId) -> Result<(), EngineChannelError> {
        self.channels
            .send_command(EngineCommand::MarkAllRead { peer_id })
            .await
    }

    /// Register the push token with the backend's push gateway.
    pub async fn configure_pusher(&self, device_token: Vec<u8>) -> Result<(), EngineChannelError> {
        self.channels
            .send_command(EngineCommand::ConfigurePusher { device_token })
            .await
    }

    /// Forget a broken room and derive a fresh one.
    pub async fn recreate_room(&self, peer_id: PeerId) -> Result<(), EngineChannelError> {
        self.channels
            .send_command(EngineCommand::RecreateRoom { peer_id })
            .await
    }

    /// Feed one match-state transition into the engine.
    pub async fn notify_match_changed(&self, event: MatchEvent) -> Result<(), EngineChannelError> {
        self.channels
            .send_command(EngineCommand::MatchChanged(event))
            .await
    }

    /// Feed one backend-pushed event into the engine.
    pub async fn push(&self, event: PushEvent) -> Result<(), EngineChannelError> {
        self.channels
            .send_command(EngineCommand::Backend(event))
            .await
    }

    /// Stop the engine task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Spawn the engine task and return a handle to it.
pub fn spawn_engine(
    config: EngineConfig,
    backend: Arc<dyn ChatBackend>,
    matches: Arc<dyn MatchStateSource>,
) -> EngineHandle {
    let (channels, command_rx) = EngineChannels::new(config.command_buffer, config.delegate_buffer);
    let cancel = CancellationToken::new();
    let engine = ChatEngine::new(config, backend, matches, channels.clone());

    let child = cancel.child_token();
    tokio::spawn(async move {
        engine.run(command_rx, child).await;
    });

    EngineHandle { channels, cancel }
}

/// The reconciliation and messaging engine.
///
/// All registry mutation happens inside this struct, which is driven by a
/// single task: the chat-engine queue. Commands for the same relationship
/// are therefore always serialized.
pub struct ChatEngine {
    pub(crate) channels: EngineChannels,
    pub(crate) backend: Arc<dyn ChatBackend>,
    pub(crate) matches: Arc<dyn MatchStateSource>,
    pub(crate) registry: RoomRegistry,
    pub(crate) own_user_id: String,
    pub(crate) home_server: String,
    pub(crate) last_reads: HashMap<PeerId, u64>,
}

impl ChatEngine {
    pub(crate) fn new(
        config: EngineConfig,
        backend: Arc<dyn ChatBackend>,
        matches: Arc<dyn MatchStateSource>,
        channels: EngineChannels,
    ) -> Self {
        let own_user_id = chat_user_id(config.peer_id, &config.home_server);
        Self {
            channels,
            backend,
            matches,
            registry: RoomRegistry::default(),
            own_user_id,
            home_server: config.home_server,
            last_reads: config.last_reads,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<EngineCommand>,
        cancel: CancellationToken,
    ) {
        self.handle_initial_rooms().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = command_rx.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }
            }
        }

        debug!("chat engine task exiting");
    }

    pub(crate) async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Reconcile { peer_id } => {
                if let Err(err) = self.reconcile(peer_id).await {
                    self.report_internal(&err);
                }
            }
            EngineCommand::CanChat { peer_id, reply } => {
                let _ = reply.send(self.can_chat(peer_id));
            }
            EngineCommand::Send {
                peer_id,
                message,
                reply,
            } => {
                let _ = reply.send(self.send_message(peer_id, &message).await);
            }
            EngineCommand::MarkAllRead { peer_id } => self.mark_all_read(peer_id).await,
            EngineCommand::ConfigurePusher { device_token } => {
                self.configure_pusher(&device_token).await
            }
            EngineCommand::RecreateRoom { peer_id } => self.recreate_room(peer_id).await,
            EngineCommand::MatchChanged(event) => self.handle_match_event(event).await,
            EngineCommand::Backend(event) => self.handle_push(event).await,
        }
    }

    /// Sweep over all direct-chat counterparties known at startup:
    /// validate the match state (without forcing a server round trip) and
    /// either reconcile or drop their rooms.
    pub(crate) async fn handle_initial_rooms(&mut self) {
        let user_ids = match self.backend.direct_chat_user_ids().await {
            Ok(user_ids) => user_ids,
            Err(err) => {
                warn!(error = %err, "listing initial direct chats failed");
                return;
            }
        };

        for user_id in user_ids {
            let Some(peer_id) = peer_id_from(&user_id) else {
                warn!(%user_id, "direct chat with a non-peer user id");
                continue;
            };

            match self.matches.refresh(peer_id, false).await {
                Ok(MatchState::MutualMatch) => {
                    if let Err(err) = self.reconcile(peer_id).await {
                        self.report_internal(&err);
                    }
                }
                Ok(_) => self.forget_all_rooms(peer_id).await,
                Err(err) => {
                    warn!(error = %err, %peer_id, "initial match-state refresh failed")
                }
            }
        }
    }

    /// `None` once the canonical room has both parties joined.
    pub(crate) fn can_chat(&self, peer_id: PeerId) -> Option<ChatError> {
        match self.registry.get(peer_id) {
            Some(tracked) if tracked.peer_joined => None,
            _ => Some(ChatError::CannotChat {
                peer_id,
                reason: CannotChatReason::NotJoined,
            }),
        }
    }

    pub(crate) async fn mark_all_read(&mut self, peer_id: PeerId) {
        let Some(room_id) = self.registry.room_for(peer_id).map(str::to_owned) else {
            debug!(%peer_id, "mark-all-read without a canonical room");
            return;
        };

        self.last_reads.insert(peer_id, now_ms());
        if let Err(err) = self.backend.mark_all_read(&room_id).await {
            warn!(error = %err, %room_id, "sending read receipts failed");
        }
    }

    pub(crate) async fn configure_pusher(&mut self, device_token: &[u8]) {
        if let Err(err) = self.backend.configure_pusher(device_token).await {
            error!(error = %err, "configuring pusher failed");
            self.channels.emit(DelegateEvent::PusherConfigurationFailed {
                message: err.to_string(),
            });
        }
    }

    pub(crate) fn report_internal(&self, err: &ChatError) {
        error!(error = %err, "engine operation failed");
        self.channels.emit(DelegateEvent::InternalError {
            message: err.to_string(),
        });
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
