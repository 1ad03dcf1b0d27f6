//! Per-torrent plugin chain.

use std::net::SocketAddr;

use swarmhook_events::{Event, EventBus, TransitionKind};
use swarmhook_plugin::{
    PeerConnectionRef, PeerFlags, PeerPluginShim, PeerSource, PieceIndex, TorrentHandle,
    TorrentPluginShim, TorrentStateCode, Transition,
};
use tracing::{debug, trace};

use crate::peer::PeerExtensions;

/// Torrent plugins built for one torrent, in registration order.
pub struct TorrentExtensions {
    torrent: TorrentHandle,
    chain: Vec<TorrentPluginShim>,
    events: EventBus,
}

impl TorrentExtensions {
    pub(crate) const fn new(
        torrent: TorrentHandle,
        chain: Vec<TorrentPluginShim>,
        events: EventBus,
    ) -> Self {
        Self {
            torrent,
            chain,
            events,
        }
    }

    /// Handle of the torrent this chain belongs to.
    #[must_use]
    pub const fn torrent(&self) -> &TorrentHandle {
        &self.torrent
    }

    /// Number of plugins attached to the torrent.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Whether every extension declined the torrent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Build the peer plugin chain for a new connection on this torrent.
    pub fn attach_peer(&self, peer: &PeerConnectionRef) -> PeerExtensions {
        let chain: Vec<PeerPluginShim> = self
            .chain
            .iter()
            .filter_map(|shim| shim.on_peer_factory_requested(peer))
            .collect();

        trace!(
            torrent_id = %self.torrent.id,
            peer_id = %peer.id,
            endpoint = %peer.endpoint,
            extensions = chain.len(),
            "peer attached"
        );
        self.events.publish(Event::PeerAttached {
            torrent_id: self.torrent.id,
            peer_id: peer.id,
            extensions: chain.len(),
        });

        PeerExtensions::new(peer.clone(), chain, self.events.clone())
    }

    /// A piece passed the hash check.
    pub fn piece_passed(&self, index: PieceIndex) {
        for shim in &self.chain {
            shim.on_piece_pass(index);
        }
    }

    /// A piece failed the hash check.
    pub fn piece_failed(&self, index: PieceIndex) {
        for shim in &self.chain {
            shim.on_piece_failed(index);
        }
    }

    /// Once-per-second torrent tick.
    pub fn tick(&self) {
        for shim in &self.chain {
            shim.tick();
        }
    }

    /// Ask the chain whether the torrent may pause.
    #[must_use]
    pub fn pause(&self) -> Transition {
        self.request_transition(TransitionKind::Pause, TorrentPluginShim::on_pause)
    }

    /// Ask the chain whether the torrent may resume.
    #[must_use]
    pub fn resume(&self) -> Transition {
        self.request_transition(TransitionKind::Resume, TorrentPluginShim::on_resume)
    }

    /// Initial file check finished.
    pub fn files_checked(&self) {
        for shim in &self.chain {
            shim.on_files_checked();
        }
    }

    /// Forward a state change; unknown codes are passed through untouched.
    pub fn state_changed(&self, state: impl Into<TorrentStateCode>) {
        let state = state.into();
        for shim in &self.chain {
            shim.on_state(state);
        }
    }

    /// The torrent was loaded back into memory.
    pub fn load(&self) {
        for shim in &self.chain {
            shim.on_load();
        }
    }

    /// The torrent is being unloaded from memory.
    pub fn unload(&self) {
        for shim in &self.chain {
            shim.on_unload();
        }
        self.events.publish(Event::TorrentUnloaded {
            torrent_id: self.torrent.id,
        });
    }

    /// A peer endpoint was added to the torrent's peer list.
    pub fn add_peer(&self, endpoint: SocketAddr, source: PeerSource, flags: PeerFlags) {
        for shim in &self.chain {
            shim.on_add_peer(endpoint, source, flags);
        }
    }

    fn request_transition(
        &self,
        kind: TransitionKind,
        ask: impl Fn(&TorrentPluginShim) -> Transition,
    ) -> Transition {
        for (position, shim) in self.chain.iter().enumerate() {
            if ask(shim).is_vetoed() {
                debug!(
                    torrent_id = %self.torrent.id,
                    transition = ?kind,
                    extension = position,
                    "plugin vetoed transition"
                );
                self.events.publish(Event::TransitionVetoed {
                    torrent_id: self.torrent.id,
                    transition: kind,
                    extension: position,
                });
                return Transition::Vetoed;
            }
        }
        Transition::Allowed
    }
}
