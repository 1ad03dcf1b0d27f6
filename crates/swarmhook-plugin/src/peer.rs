//! Peer-connection scope: the leaf of the plugin hierarchy.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::model::{
    Acceptance, Bitfield, DisconnectReason, Dispatch, PeerRequest, PieceIndex, StateMap,
};

/// Identifier reported by [`PeerPlugin::type_name`] when a plugin does not override it.
pub const DEFAULT_PEER_PLUGIN_TYPE: &str = "shim";

/// Per-connection protocol hooks.
///
/// Hooks returning `bool` report whether the plugin consumed the message; `false` leaves the
/// engine's built-in handling in place. The engine may call these from any of its threads
/// and in any order.
#[allow(unused_variables)]
pub trait PeerPlugin: Send + Sync {
    /// Identifies the plugin variant in engine diagnostics.
    fn type_name(&self) -> &str {
        DEFAULT_PEER_PLUGIN_TYPE
    }

    /// Contribute entries to the extension handshake dictionary.
    fn add_handshake(&self, handshake: &mut StateMap) {}

    /// The connection handshake completed.
    fn on_connected(&self) {}

    /// The connection was closed.
    fn on_disconnect(&self, reason: &DisconnectReason) {}

    /// Inspect the reserved bits of the peer's handshake; `false` drops the connection.
    fn on_handshake(&self, reserved: &[u8; 8]) -> bool {
        true
    }

    /// Inspect the peer's extension handshake; `false` drops the connection.
    fn on_extension_handshake(&self, handshake: &Value) -> bool {
        true
    }

    /// Peer choked us.
    fn on_choke(&self) -> bool {
        false
    }

    /// Peer unchoked us.
    fn on_unchoke(&self) -> bool {
        false
    }

    /// Peer is interested in our pieces.
    fn on_interested(&self) -> bool {
        false
    }

    /// Peer lost interest in our pieces.
    fn on_not_interested(&self) -> bool {
        false
    }

    /// Peer announced a piece.
    fn on_have(&self, index: PieceIndex) -> bool {
        false
    }

    /// Peer withdrew a piece.
    fn on_dont_have(&self, index: PieceIndex) -> bool {
        false
    }

    /// Peer sent its full bitfield.
    fn on_bitfield(&self, bitfield: &Bitfield) -> bool {
        false
    }

    /// Peer has every piece.
    fn on_have_all(&self) -> bool {
        false
    }

    /// Peer has no pieces.
    fn on_have_none(&self) -> bool {
        false
    }

    /// Peer allows us to request a piece while choked.
    fn on_allowed_fast(&self, index: PieceIndex) -> bool {
        false
    }

    /// Peer requested a block.
    fn on_request(&self, request: &PeerRequest) -> bool {
        false
    }

    /// Peer delivered a block.
    fn on_piece(&self, request: &PeerRequest, data: &[u8]) -> bool {
        false
    }

    /// Peer cancelled a request.
    fn on_cancel(&self, request: &PeerRequest) -> bool {
        false
    }

    /// Peer rejected one of our requests.
    fn on_reject(&self, request: &PeerRequest) -> bool {
        false
    }

    /// Peer suggested a piece to download.
    fn on_suggest(&self, index: PieceIndex) -> bool {
        false
    }

    /// Extension protocol message.
    fn on_extended(&self, length: u32, message: u8, body: &[u8]) -> bool {
        false
    }

    /// Message id the engine does not recognise.
    fn on_unknown_message(&self, length: u32, message: u8, body: &[u8]) -> bool {
        false
    }

    /// We sent an unchoke.
    fn sent_unchoke(&self) {}

    /// We sent payload bytes.
    fn sent_payload(&self, bytes: u32) {}

    /// `false` keeps the connection open despite the engine's wish to close it.
    fn can_disconnect(&self, reason: &DisconnectReason) -> bool {
        true
    }

    /// A piece this peer contributed to passed the hash check.
    fn on_piece_pass(&self, index: PieceIndex) {}

    /// A piece this peer contributed to failed the hash check.
    fn on_piece_failed(&self, index: PieceIndex) {}

    /// Once-per-second tick for the connection.
    fn tick(&self) {}

    /// Take over sending a request; `true` means the plugin wrote it.
    fn write_request(&self, request: &PeerRequest) -> bool {
        false
    }
}

/// Stateless peer plugin that keeps every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasePeerPlugin;

impl PeerPlugin for BasePeerPlugin {}

/// Shared-ownership handle the engine holds for a peer plugin.
#[derive(Clone)]
pub struct PeerPluginShim {
    inner: Arc<dyn PeerPlugin>,
}

impl fmt::Debug for PeerPluginShim {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PeerPluginShim")
            .field("type_name", &self.inner.type_name())
            .finish()
    }
}

impl From<Box<dyn PeerPlugin>> for PeerPluginShim {
    fn from(plugin: Box<dyn PeerPlugin>) -> Self {
        Self {
            inner: Arc::from(plugin),
        }
    }
}

impl PeerPluginShim {
    /// Wrap an injected plugin implementation.
    #[must_use]
    pub const fn new(plugin: Arc<dyn PeerPlugin>) -> Self {
        Self { inner: plugin }
    }

    /// Access the wrapped plugin.
    #[must_use]
    pub const fn plugin(&self) -> &Arc<dyn PeerPlugin> {
        &self.inner
    }

    /// Plugin identifier.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.inner.type_name()
    }

    /// Forward [`PeerPlugin::add_handshake`].
    pub fn add_handshake(&self, handshake: &mut StateMap) {
        self.inner.add_handshake(handshake);
    }

    /// Forward [`PeerPlugin::on_connected`].
    pub fn on_connected(&self) {
        self.inner.on_connected();
    }

    /// Forward [`PeerPlugin::on_disconnect`].
    pub fn on_disconnect(&self, reason: &DisconnectReason) {
        self.inner.on_disconnect(reason);
    }

    /// Forward [`PeerPlugin::on_handshake`].
    #[must_use]
    pub fn on_handshake(&self, reserved: &[u8; 8]) -> Acceptance {
        self.inner.on_handshake(reserved).into()
    }

    /// Forward [`PeerPlugin::on_extension_handshake`].
    #[must_use]
    pub fn on_extension_handshake(&self, handshake: &Value) -> Acceptance {
        self.inner.on_extension_handshake(handshake).into()
    }

    /// Forward [`PeerPlugin::on_choke`].
    #[must_use]
    pub fn on_choke(&self) -> Dispatch {
        self.inner.on_choke().into()
    }

    /// Forward [`PeerPlugin::on_unchoke`].
    #[must_use]
    pub fn on_unchoke(&self) -> Dispatch {
        self.inner.on_unchoke().into()
    }

    /// Forward [`PeerPlugin::on_interested`].
    #[must_use]
    pub fn on_interested(&self) -> Dispatch {
        self.inner.on_interested().into()
    }

    /// Forward [`PeerPlugin::on_not_interested`].
    #[must_use]
    pub fn on_not_interested(&self) -> Dispatch {
        self.inner.on_not_interested().into()
    }

    /// Forward [`PeerPlugin::on_have`].
    #[must_use]
    pub fn on_have(&self, index: PieceIndex) -> Dispatch {
        self.inner.on_have(index).into()
    }

    /// Forward [`PeerPlugin::on_dont_have`].
    #[must_use]
    pub fn on_dont_have(&self, index: PieceIndex) -> Dispatch {
        self.inner.on_dont_have(index).into()
    }

    /// Forward [`PeerPlugin::on_bitfield`].
    #[must_use]
    pub fn on_bitfield(&self, bitfield: &Bitfield) -> Dispatch {
        self.inner.on_bitfield(bitfield).into()
    }

    /// Forward [`PeerPlugin::on_have_all`].
    #[must_use]
    pub fn on_have_all(&self) -> Dispatch {
        self.inner.on_have_all().into()
    }

    /// Forward [`PeerPlugin::on_have_none`].
    #[must_use]
    pub fn on_have_none(&self) -> Dispatch {
        self.inner.on_have_none().into()
    }

    /// Forward [`PeerPlugin::on_allowed_fast`].
    #[must_use]
    pub fn on_allowed_fast(&self, index: PieceIndex) -> Dispatch {
        self.inner.on_allowed_fast(index).into()
    }

    /// Forward [`PeerPlugin::on_request`].
    #[must_use]
    pub fn on_request(&self, request: &PeerRequest) -> Dispatch {
        self.inner.on_request(request).into()
    }

    /// Forward [`PeerPlugin::on_piece`].
    #[must_use]
    pub fn on_piece(&self, request: &PeerRequest, data: &[u8]) -> Dispatch {
        self.inner.on_piece(request, data).into()
    }

    /// Forward [`PeerPlugin::on_cancel`].
    #[must_use]
    pub fn on_cancel(&self, request: &PeerRequest) -> Dispatch {
        self.inner.on_cancel(request).into()
    }

    /// Forward [`PeerPlugin::on_reject`].
    #[must_use]
    pub fn on_reject(&self, request: &PeerRequest) -> Dispatch {
        self.inner.on_reject(request).into()
    }

    /// Forward [`PeerPlugin::on_suggest`].
    #[must_use]
    pub fn on_suggest(&self, index: PieceIndex) -> Dispatch {
        self.inner.on_suggest(index).into()
    }

    /// Forward [`PeerPlugin::on_extended`].
    #[must_use]
    pub fn on_extended(&self, length: u32, message: u8, body: &[u8]) -> Dispatch {
        self.inner.on_extended(length, message, body).into()
    }

    /// Forward [`PeerPlugin::on_unknown_message`].
    #[must_use]
    pub fn on_unknown_message(&self, length: u32, message: u8, body: &[u8]) -> Dispatch {
        self.inner.on_unknown_message(length, message, body).into()
    }

    /// Forward [`PeerPlugin::sent_unchoke`].
    pub fn sent_unchoke(&self) {
        self.inner.sent_unchoke();
    }

    /// Forward [`PeerPlugin::sent_payload`].
    pub fn sent_payload(&self, bytes: u32) {
        self.inner.sent_payload(bytes);
    }

    /// Forward [`PeerPlugin::can_disconnect`].
    #[must_use]
    pub fn can_disconnect(&self, reason: &DisconnectReason) -> Acceptance {
        self.inner.can_disconnect(reason).into()
    }

    /// Forward [`PeerPlugin::on_piece_pass`].
    pub fn on_piece_pass(&self, index: PieceIndex) {
        self.inner.on_piece_pass(index);
    }

    /// Forward [`PeerPlugin::on_piece_failed`].
    pub fn on_piece_failed(&self, index: PieceIndex) {
        self.inner.on_piece_failed(index);
    }

    /// Forward [`PeerPlugin::tick`].
    pub fn tick(&self) {
        self.inner.tick();
    }

    /// Forward [`PeerPlugin::write_request`].
    #[must_use]
    pub fn write_request(&self, request: &PeerRequest) -> Dispatch {
        self.inner.write_request(request).into()
    }
}
