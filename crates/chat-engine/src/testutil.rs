//! In-memory backend and match-state fakes shared by the engine tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use chat_core::{
    chat_user_id, BackendError, CandidateRoom, DelegateEvent, DelegateStream, EngineChannels,
    MatchState, Membership, PeerId, StoredEvent, StoredEventContent,
};

use crate::{
    engine::{ChatEngine, EngineConfig},
    facade::{ChatBackend, DecryptedBatch, TimelineHandle},
    match_state::MatchStateSource,
};

pub(crate) const HOME_SERVER: &str = "chat.example.org";

/// One direct room as the fake backend stores it.
#[derive(Debug, Clone)]
pub(crate) struct FakeRoom {
    pub(crate) counterparty: String,
    pub(crate) our_membership: Membership,
    pub(crate) their_membership: Membership,
    pub(crate) encrypted: bool,
    pub(crate) stored: Vec<StoredEvent>,
}

pub(crate) fn room(counterparty: &str, ours: Membership, theirs: Membership) -> FakeRoom {
    FakeRoom {
        counterparty: counterparty.to_owned(),
        our_membership: ours,
        their_membership: theirs,
        encrypted: true,
        stored: Vec::new(),
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeBackendState {
    pub(crate) rooms: HashMap<String, FakeRoom>,
    pub(crate) plaintexts: HashMap<String, String>,
    pub(crate) undecryptable: HashSet<String>,
    pub(crate) profiles: HashSet<String>,
    pub(crate) encryption_available: bool,
    pub(crate) send_script: VecDeque<BackendError>,
    pub(crate) sent: Vec<(String, String)>,
    pub(crate) left_rooms: Vec<String>,
    pub(crate) join_failures: HashSet<String>,
    pub(crate) timeline_failures: HashSet<String>,
    pub(crate) trusted_devices: Vec<String>,
    pub(crate) marked_read: Vec<String>,
    pub(crate) pusher_tokens: Vec<Vec<u8>>,
    next_room: usize,
}

/// Scriptable in-memory stand-in for the remote chat service.
#[derive(Debug)]
pub(crate) struct FakeBackend {
    state: Mutex<FakeBackendState>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FakeBackendState {
                encryption_available: true,
                ..FakeBackendState::default()
            }),
        }
    }

    pub(crate) fn state<R>(&self, inspect: impl FnOnce(&FakeBackendState) -> R) -> R {
        inspect(&self.state.lock().unwrap())
    }

    pub(crate) fn insert_room(&self, room_id: &str, room: FakeRoom) {
        self.state.lock().unwrap().rooms.insert(room_id.to_owned(), room);
    }

    pub(crate) fn add_profile(&self, user_id: &str) {
        self.state.lock().unwrap().profiles.insert(user_id.to_owned());
    }

    pub(crate) fn set_encryption_available(&self, available: bool) {
        self.state.lock().unwrap().encryption_available = available;
    }

    pub(crate) fn fail_join(&self, room_id: &str) {
        self.state.lock().unwrap().join_failures.insert(room_id.to_owned());
    }

    pub(crate) fn fail_timeline(&self, room_id: &str) {
        self.state
            .lock()
            .unwrap()
            .timeline_failures
            .insert(room_id.to_owned());
    }

    /// Queue one failure; each `send_text` call consumes at most one.
    pub(crate) fn script_send_failure(&self, error: BackendError) {
        self.state.lock().unwrap().send_script.push_back(error);
    }

    pub(crate) fn add_plain_event(
        &self,
        room_id: &str,
        event_id: &str,
        sender: &str,
        timestamp_ms: u64,
        body: &str,
    ) {
        let mut state = self.state.lock().unwrap();
        let room = state.rooms.get_mut(room_id).expect("room must exist");
        room.stored.push(StoredEvent {
            event_id: event_id.to_owned(),
            sender: sender.to_owned(),
            timestamp_ms,
            content: StoredEventContent::Plain {
                body: body.to_owned(),
            },
        });
    }

    /// `plaintext: None` makes the event undecryptable.
    pub(crate) fn add_encrypted_event(
        &self,
        room_id: &str,
        event_id: &str,
        sender: &str,
        timestamp_ms: u64,
        plaintext: Option<&str>,
    ) {
        let mut state = self.state.lock().unwrap();
        match plaintext {
            Some(body) => {
                state.plaintexts.insert(event_id.to_owned(), body.to_owned());
            }
            None => {
                state.undecryptable.insert(event_id.to_owned());
            }
        }
        let room = state.rooms.get_mut(room_id).expect("room must exist");
        room.stored.push(StoredEvent {
            event_id: event_id.to_owned(),
            sender: sender.to_owned(),
            timestamp_ms,
            content: StoredEventContent::Encrypted,
        });
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn direct_chat_user_ids(&self) -> Result<Vec<String>, BackendError> {
        let state = self.state.lock().unwrap();
        let mut user_ids: Vec<String> = state
            .rooms
            .values()
            .filter(|room| room.our_membership != Membership::Leave)
            .map(|room| room.counterparty.clone())
            .collect();
        user_ids.sort();
        user_ids.dedup();
        Ok(user_ids)
    }

    async fn direct_room_infos(&self, user_id: &str) -> Result<Vec<CandidateRoom>, BackendError> {
        let state = self.state.lock().unwrap();
        let mut infos: Vec<CandidateRoom> = state
            .rooms
            .iter()
            .filter(|(_, room)| {
                room.counterparty == user_id && room.our_membership != Membership::Leave
            })
            .map(|(room_id, room)| CandidateRoom {
                room_id: room_id.clone(),
                our_membership: room.our_membership,
                their_membership: room.their_membership,
            })
            .collect();
        infos.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        Ok(infos)
    }

    async fn has_profile(&self, user_id: &str) -> Result<bool, BackendError> {
        Ok(self.state.lock().unwrap().profiles.contains(user_id))
    }

    async fn can_enable_encryption(&self, _user_id: &str) -> Result<bool, BackendError> {
        Ok(self.state.lock().unwrap().encryption_available)
    }

    async fn create_direct_room(
        &self,
        user_id: &str,
        encrypted: bool,
    ) -> Result<String, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.next_room += 1;
        let room_id = format!("!r{}:s", state.next_room);
        state.rooms.insert(
            room_id.clone(),
            FakeRoom {
                counterparty: user_id.to_owned(),
                our_membership: Membership::Join,
                their_membership: Membership::Invite,
                encrypted,
                stored: Vec::new(),
            },
        );
        Ok(room_id)
    }

    async fn join_room(&self, room_id: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if state.join_failures.contains(room_id) {
            return Err(BackendError::Forbidden {
                message: "join rejected".to_owned(),
            });
        }
        let Some(room) = state.rooms.get_mut(room_id) else {
            return Err(BackendError::RoomNotFound {
                room_id: room_id.to_owned(),
            });
        };
        room.our_membership = Membership::Join;
        Ok(())
    }

    async fn leave_room(&self, room_id: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if let Some(room) = state.rooms.get_mut(room_id) {
            room.our_membership = Membership::Leave;
        }
        state.left_rooms.push(room_id.to_owned());
        Ok(())
    }

    async fn live_timeline(&self, room_id: &str) -> Result<TimelineHandle, BackendError> {
        let state = self.state.lock().unwrap();
        if state.timeline_failures.contains(room_id) {
            return Err(BackendError::Network {
                message: "timeline unavailable".to_owned(),
            });
        }
        if !state.rooms.contains_key(room_id) {
            return Err(BackendError::RoomNotFound {
                room_id: room_id.to_owned(),
            });
        }
        Ok(TimelineHandle(format!("timeline:{room_id}")))
    }

    async fn stored_events(&self, room_id: &str) -> Result<Vec<StoredEvent>, BackendError> {
        let state = self.state.lock().unwrap();
        match state.rooms.get(room_id) {
            Some(room) => Ok(room.stored.clone()),
            None => Err(BackendError::RoomNotFound {
                room_id: room_id.to_owned(),
            }),
        }
    }

    async fn decrypt_events(
        &self,
        _timeline: &TimelineHandle,
        events: Vec<StoredEvent>,
    ) -> Result<DecryptedBatch, BackendError> {
        let state = self.state.lock().unwrap();
        let mut batch = DecryptedBatch::default();
        for event in events {
            if state.undecryptable.contains(&event.event_id) {
                batch.failed.push(event.event_id);
                continue;
            }
            let body = state
                .plaintexts
                .get(&event.event_id)
                .cloned()
                .unwrap_or_default();
            batch.decrypted.push(StoredEvent {
                content: StoredEventContent::Plain { body },
                ..event
            });
        }
        Ok(batch)
    }

    async fn send_text(&self, room_id: &str, body: &str) -> Result<String, BackendError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.send_script.pop_front() {
            return Err(error);
        }
        state.sent.push((room_id.to_owned(), body.to_owned()));
        Ok(format!("$echo{}", state.sent.len()))
    }

    async fn trust_devices(&self, devices: &[String]) -> Result<(), BackendError> {
        self.state
            .lock()
            .unwrap()
            .trusted_devices
            .extend_from_slice(devices);
        Ok(())
    }

    async fn mark_all_read(&self, room_id: &str) -> Result<(), BackendError> {
        self.state.lock().unwrap().marked_read.push(room_id.to_owned());
        Ok(())
    }

    async fn configure_pusher(&self, device_token: &[u8]) -> Result<(), BackendError> {
        self.state
            .lock()
            .unwrap()
            .pusher_tokens
            .push(device_token.to_vec());
        Ok(())
    }
}

/// Match-state source answering from a settable map, recording refreshes.
#[derive(Debug, Default)]
pub(crate) struct FakeMatches {
    states: Mutex<HashMap<PeerId, MatchState>>,
    refreshes: Mutex<Vec<(PeerId, bool)>>,
}

impl FakeMatches {
    pub(crate) fn set(&self, peer_id: PeerId, state: MatchState) {
        self.states.lock().unwrap().insert(peer_id, state);
    }

    pub(crate) fn forced_refreshes(&self, peer_id: PeerId) -> usize {
        self.refreshes
            .lock()
            .unwrap()
            .iter()
            .filter(|(got, force)| *got == peer_id && *force)
            .count()
    }
}

#[async_trait]
impl MatchStateSource for FakeMatches {
    async fn current(&self, peer_id: PeerId) -> MatchState {
        self.states
            .lock()
            .unwrap()
            .get(&peer_id)
            .copied()
            .unwrap_or(MatchState::Unmatched)
    }

    async fn refresh(&self, peer_id: PeerId, force: bool) -> Result<MatchState, BackendError> {
        self.refreshes.lock().unwrap().push((peer_id, force));
        Ok(self.current(peer_id).await)
    }
}

/// An engine wired to fakes, plus the counterparty most tests talk to.
pub(crate) struct TestEngine {
    pub(crate) engine: ChatEngine,
    pub(crate) backend: Arc<FakeBackend>,
    pub(crate) matches: Arc<FakeMatches>,
    pub(crate) peer_id: PeerId,
    pub(crate) peer_user_id: String,
}

pub(crate) fn test_engine() -> TestEngine {
    let backend = Arc::new(FakeBackend::new());
    let matches = Arc::new(FakeMatches::default());
    let peer_id = PeerId::random();
    let peer_user_id = chat_user_id(peer_id, HOME_SERVER);

    let config = EngineConfig::new(PeerId::random(), HOME_SERVER);
    let (channels, _command_rx) =
        EngineChannels::new(config.command_buffer, config.delegate_buffer);
    let engine = ChatEngine::new(config, backend.clone(), matches.clone(), channels);

    TestEngine {
        engine,
        backend,
        matches,
        peer_id,
        peer_user_id,
    }
}

/// Collect everything currently buffered on a delegate subscription.
pub(crate) fn drain_delegate(delegate: &mut DelegateStream) -> Vec<DelegateEvent> {
    let mut events = Vec::new();
    while let Ok(event) = delegate.try_recv() {
        events.push(event);
    }
    events
}
