//! Torrent scope: lifecycle hooks and the peer plugin factory.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::model::{
    PeerConnectionRef, PeerFlags, PeerSource, PieceIndex, TorrentStateCode, Transition,
};
use crate::peer::{BasePeerPlugin, PeerPlugin, PeerPluginShim};

/// Per-torrent hooks.
///
/// `on_pause` and `on_resume` are the only hooks with control-flow weight: returning `true`
/// vetoes the transition. Everything else is a notification.
#[allow(unused_variables)]
pub trait TorrentPlugin: Send + Sync {
    /// Build the plugin for a newly established peer connection, or `None` to stay out of it.
    fn create_peer_handler(&self, peer: &PeerConnectionRef) -> Option<Box<dyn PeerPlugin>> {
        Some(Box::new(BasePeerPlugin))
    }

    /// A piece passed the hash check.
    fn on_piece_pass(&self, index: PieceIndex) {}

    /// A piece failed the hash check.
    fn on_piece_failed(&self, index: PieceIndex) {}

    /// Once-per-second tick for the torrent.
    fn tick(&self) {}

    /// The torrent is about to pause; `true` vetoes.
    fn on_pause(&self) -> bool {
        false
    }

    /// The torrent is about to resume; `true` vetoes.
    fn on_resume(&self) -> bool {
        false
    }

    /// Initial file check finished.
    fn on_files_checked(&self) {}

    /// Torrent moved to a new state.
    fn on_state(&self, state: TorrentStateCode) {}

    /// Torrent is being unloaded from memory.
    fn on_unload(&self) {}

    /// Torrent was loaded back into memory.
    fn on_load(&self) {}

    /// A peer endpoint was added to the torrent's peer list.
    fn on_add_peer(&self, endpoint: SocketAddr, source: PeerSource, flags: PeerFlags) {}
}

/// Stateless torrent plugin that accepts every peer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseTorrentPlugin;

impl TorrentPlugin for BaseTorrentPlugin {}

/// Shared-ownership handle the engine holds for a torrent plugin.
#[derive(Clone)]
pub struct TorrentPluginShim {
    inner: Arc<dyn TorrentPlugin>,
}

impl fmt::Debug for TorrentPluginShim {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("TorrentPluginShim").finish_non_exhaustive()
    }
}

impl From<Box<dyn TorrentPlugin>> for TorrentPluginShim {
    fn from(plugin: Box<dyn TorrentPlugin>) -> Self {
        Self {
            inner: Arc::from(plugin),
        }
    }
}

impl TorrentPluginShim {
    /// Wrap an injected plugin implementation.
    #[must_use]
    pub const fn new(plugin: Arc<dyn TorrentPlugin>) -> Self {
        Self { inner: plugin }
    }

    /// Access the wrapped plugin.
    #[must_use]
    pub const fn plugin(&self) -> &Arc<dyn TorrentPlugin> {
        &self.inner
    }

    /// Engine entry point for a new peer connection.
    ///
    /// Returns `None` when the plugin declines the connection.
    #[must_use]
    pub fn on_peer_factory_requested(&self, peer: &PeerConnectionRef) -> Option<PeerPluginShim> {
        self.inner
            .create_peer_handler(peer)
            .map(PeerPluginShim::from)
    }

    /// Forward [`TorrentPlugin::on_piece_pass`].
    pub fn on_piece_pass(&self, index: PieceIndex) {
        self.inner.on_piece_pass(index);
    }

    /// Forward [`TorrentPlugin::on_piece_failed`].
    pub fn on_piece_failed(&self, index: PieceIndex) {
        self.inner.on_piece_failed(index);
    }

    /// Forward [`TorrentPlugin::tick`].
    pub fn tick(&self) {
        self.inner.tick();
    }

    /// Ask the plugin whether the torrent may pause.
    #[must_use]
    pub fn on_pause(&self) -> Transition {
        Transition::from_veto(self.inner.on_pause())
    }

    /// Ask the plugin whether the torrent may resume.
    #[must_use]
    pub fn on_resume(&self) -> Transition {
        Transition::from_veto(self.inner.on_resume())
    }

    /// Forward [`TorrentPlugin::on_files_checked`].
    pub fn on_files_checked(&self) {
        self.inner.on_files_checked();
    }

    /// Forward [`TorrentPlugin::on_state`].
    pub fn on_state(&self, state: TorrentStateCode) {
        self.inner.on_state(state);
    }

    /// Forward [`TorrentPlugin::on_unload`].
    pub fn on_unload(&self) {
        self.inner.on_unload();
    }

    /// Forward [`TorrentPlugin::on_load`].
    pub fn on_load(&self) {
        self.inner.on_load();
    }

    /// Forward [`TorrentPlugin::on_add_peer`].
    pub fn on_add_peer(&self, endpoint: SocketAddr, source: PeerSource, flags: PeerFlags) {
        self.inner.on_add_peer(endpoint, source, flags);
    }
}
