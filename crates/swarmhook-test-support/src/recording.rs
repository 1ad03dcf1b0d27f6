//! Plugins that record every call into a shared log.
//!
//! Entries read `label:hook` for session plugins, `label/torrent:hook` for torrent plugins
//! and `label/peer:hook` for peer plugins.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Value, json};
use swarmhook_plugin::{
    Bitfield, DisconnectReason, EngineAlert, InfoHash, PeerConnectionRef, PeerFlags, PeerPlugin,
    PeerRequest, PeerSource, PieceIndex, SessionPlugin, StateMap, TorrentHandle, TorrentPlugin,
    TorrentStateCode, UnchokeCandidate,
};

/// Shared, ordered record of plugin calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    /// Append an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    /// Snapshot of every entry so far.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of entries equal to `entry`.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|recorded| recorded.as_str() == entry)
            .count()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Switches controlling how the recording plugins answer hooks.
#[derive(Debug, Clone, Copy, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct Behaviour {
    /// Session factory returns `None`.
    pub decline_torrents: bool,
    /// Torrent factory returns `None`.
    pub decline_peers: bool,
    /// `on_pause` vetoes.
    pub veto_pause: bool,
    /// `on_resume` vetoes.
    pub veto_resume: bool,
    /// Consumable peer hooks return `true`.
    pub consume: bool,
    /// Handshake hooks return `false`.
    pub reject_handshake: bool,
    /// `can_disconnect` returns `false`.
    pub hold_connection: bool,
    /// `on_unknown_torrent` and `on_optimistic_unchoke` return `true`.
    pub claim: bool,
}

/// Session plugin that records calls and builds recording torrent plugins.
#[derive(Debug, Clone)]
pub struct RecordingSessionPlugin {
    label: String,
    log: CallLog,
    behaviour: Behaviour,
}

impl RecordingSessionPlugin {
    /// Plugin with default behaviour.
    #[must_use]
    pub fn new(label: impl Into<String>, log: CallLog) -> Self {
        Self::with_behaviour(label, log, Behaviour::default())
    }

    /// Plugin with explicit behaviour.
    #[must_use]
    pub fn with_behaviour(label: impl Into<String>, log: CallLog, behaviour: Behaviour) -> Self {
        Self {
            label: label.into(),
            log,
            behaviour,
        }
    }

    fn record(&self, hook: &str) {
        self.log.record(format!("{}:{hook}", self.label));
    }
}

impl SessionPlugin for RecordingSessionPlugin {
    fn create_torrent_handler(&self, _torrent: &TorrentHandle) -> Option<Box<dyn TorrentPlugin>> {
        self.record("create_torrent_handler");
        if self.behaviour.decline_torrents {
            return None;
        }
        Some(Box::new(RecordingTorrentPlugin {
            label: self.label.clone(),
            log: self.log.clone(),
            behaviour: self.behaviour,
        }))
    }

    fn on_tick(&self) {
        self.record("on_tick");
    }

    fn on_alert(&self, alert: &EngineAlert) {
        self.record(&format!("on_alert({})", alert.kind));
    }

    fn on_unknown_torrent(&self, _info_hash: &InfoHash, _peer: &PeerConnectionRef) -> bool {
        self.record("on_unknown_torrent");
        self.behaviour.claim
    }

    fn on_optimistic_unchoke(&self, candidates: &mut [UnchokeCandidate]) -> bool {
        self.record("on_optimistic_unchoke");
        if self.behaviour.claim {
            candidates.sort_by_key(|candidate| candidate.last_optimistic_unchoke);
        }
        self.behaviour.claim
    }

    fn save_state(&self, state: &mut StateMap) {
        self.record("save_state");
        state.insert(self.label.clone(), json!({"saved": true}));
    }

    fn load_state(&self, state: &Value) {
        let present = state.get(&self.label).is_some();
        self.record(&format!("load_state({present})"));
    }
}

/// Torrent plugin built by [`RecordingSessionPlugin`].
#[derive(Debug, Clone)]
pub struct RecordingTorrentPlugin {
    label: String,
    log: CallLog,
    behaviour: Behaviour,
}

impl RecordingTorrentPlugin {
    fn record(&self, hook: &str) {
        self.log.record(format!("{}/torrent:{hook}", self.label));
    }
}

impl TorrentPlugin for RecordingTorrentPlugin {
    fn create_peer_handler(&self, _peer: &PeerConnectionRef) -> Option<Box<dyn PeerPlugin>> {
        self.record("create_peer_handler");
        if self.behaviour.decline_peers {
            return None;
        }
        Some(Box::new(RecordingPeerPlugin {
            label: self.label.clone(),
            log: self.log.clone(),
            behaviour: self.behaviour,
        }))
    }

    fn on_piece_pass(&self, index: PieceIndex) {
        self.record(&format!("on_piece_pass({index})"));
    }

    fn on_piece_failed(&self, index: PieceIndex) {
        self.record(&format!("on_piece_failed({index})"));
    }

    fn tick(&self) {
        self.record("tick");
    }

    fn on_pause(&self) -> bool {
        self.record("on_pause");
        self.behaviour.veto_pause
    }

    fn on_resume(&self) -> bool {
        self.record("on_resume");
        self.behaviour.veto_resume
    }

    fn on_files_checked(&self) {
        self.record("on_files_checked");
    }

    fn on_state(&self, state: TorrentStateCode) {
        self.record(&format!("on_state({})", state.code()));
    }

    fn on_unload(&self) {
        self.record("on_unload");
    }

    fn on_load(&self) {
        self.record("on_load");
    }

    fn on_add_peer(&self, endpoint: SocketAddr, source: PeerSource, flags: PeerFlags) {
        self.record(&format!("on_add_peer({endpoint},{source:?},{})", flags.0));
    }
}

/// Peer plugin built by [`RecordingTorrentPlugin`]; its type name is the label.
#[derive(Debug, Clone)]
pub struct RecordingPeerPlugin {
    label: String,
    log: CallLog,
    behaviour: Behaviour,
}

impl RecordingPeerPlugin {
    fn record(&self, hook: &str) {
        self.log.record(format!("{}/peer:{hook}", self.label));
    }

    fn consume(&self, hook: &str) -> bool {
        self.record(hook);
        self.behaviour.consume
    }
}

impl PeerPlugin for RecordingPeerPlugin {
    fn type_name(&self) -> &str {
        &self.label
    }

    fn add_handshake(&self, handshake: &mut StateMap) {
        self.record("add_handshake");
        handshake.insert(self.label.clone(), json!(1));
    }

    fn on_connected(&self) {
        self.record("on_connected");
    }

    fn on_disconnect(&self, reason: &DisconnectReason) {
        self.record(&format!("on_disconnect({})", reason.code));
    }

    fn on_handshake(&self, _reserved: &[u8; 8]) -> bool {
        self.record("on_handshake");
        !self.behaviour.reject_handshake
    }

    fn on_extension_handshake(&self, _handshake: &Value) -> bool {
        self.record("on_extension_handshake");
        !self.behaviour.reject_handshake
    }

    fn on_choke(&self) -> bool {
        self.consume("on_choke")
    }

    fn on_unchoke(&self) -> bool {
        self.consume("on_unchoke")
    }

    fn on_interested(&self) -> bool {
        self.consume("on_interested")
    }

    fn on_have(&self, index: PieceIndex) -> bool {
        self.consume(&format!("on_have({index})"))
    }

    fn on_bitfield(&self, bitfield: &Bitfield) -> bool {
        self.consume(&format!("on_bitfield({})", bitfield.count()))
    }

    fn on_request(&self, request: &PeerRequest) -> bool {
        self.consume(&format!("on_request({})", request.piece))
    }

    fn on_piece(&self, request: &PeerRequest, _data: &[u8]) -> bool {
        self.consume(&format!("on_piece({})", request.piece))
    }

    fn on_extended(&self, _length: u32, message: u8, _body: &[u8]) -> bool {
        self.consume(&format!("on_extended({message})"))
    }

    fn on_unknown_message(&self, _length: u32, message: u8, _body: &[u8]) -> bool {
        self.consume(&format!("on_unknown_message({message})"))
    }

    fn sent_payload(&self, bytes: u32) {
        self.record(&format!("sent_payload({bytes})"));
    }

    fn can_disconnect(&self, _reason: &DisconnectReason) -> bool {
        self.record("can_disconnect");
        !self.behaviour.hold_connection
    }

    fn on_piece_pass(&self, index: PieceIndex) {
        self.record(&format!("on_piece_pass({index})"));
    }

    fn tick(&self) {
        self.record("tick");
    }
}
