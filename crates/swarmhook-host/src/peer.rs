//! Per-connection plugin chain.

use serde_json::Value;
use swarmhook_events::{Event, EventBus};
use swarmhook_plugin::{
    Acceptance, Bitfield, DisconnectReason, Dispatch, PeerConnectionRef, PeerPluginShim,
    PeerRequest, PieceIndex, StateMap,
};
use tracing::{debug, trace};

/// Peer plugins built for one connection, in registration order.
pub struct PeerExtensions {
    peer: PeerConnectionRef,
    chain: Vec<PeerPluginShim>,
    events: EventBus,
}

impl PeerExtensions {
    pub(crate) const fn new(
        peer: PeerConnectionRef,
        chain: Vec<PeerPluginShim>,
        events: EventBus,
    ) -> Self {
        Self {
            peer,
            chain,
            events,
        }
    }

    /// Connection this chain belongs to.
    #[must_use]
    pub const fn peer(&self) -> &PeerConnectionRef {
        &self.peer
    }

    /// Number of plugins attached to the connection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Whether every torrent plugin declined the connection.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Type names of the attached plugins, in order.
    #[must_use]
    pub fn type_names(&self) -> Vec<&str> {
        self.chain.iter().map(PeerPluginShim::type_name).collect()
    }

    /// Let every plugin contribute to our extension handshake.
    pub fn add_handshake(&self, handshake: &mut StateMap) {
        for shim in &self.chain {
            shim.add_handshake(handshake);
        }
    }

    /// The connection handshake completed.
    pub fn on_connected(&self) {
        for shim in &self.chain {
            shim.on_connected();
        }
    }

    /// The connection closed.
    pub fn on_disconnect(&self, reason: &DisconnectReason) {
        for shim in &self.chain {
            shim.on_disconnect(reason);
        }
        self.events.publish(Event::PeerDetached {
            torrent_id: self.peer.torrent_id,
            peer_id: self.peer.id,
            code: reason.code,
        });
    }

    /// Every plugin must accept the handshake reserved bits.
    #[must_use]
    pub fn on_handshake(&self, reserved: &[u8; 8]) -> Acceptance {
        self.all_accept("handshake", |shim| shim.on_handshake(reserved))
    }

    /// Every plugin must accept the extension handshake.
    #[must_use]
    pub fn on_extension_handshake(&self, handshake: &Value) -> Acceptance {
        self.all_accept("extension_handshake", |shim| {
            shim.on_extension_handshake(handshake)
        })
    }

    /// Every plugin must agree before the engine closes the connection.
    #[must_use]
    pub fn can_disconnect(&self, reason: &DisconnectReason) -> Acceptance {
        self.all_accept("disconnect", |shim| shim.can_disconnect(reason))
    }

    /// Peer choked us.
    #[must_use]
    pub fn on_choke(&self) -> Dispatch {
        self.first_consumer("choke", PeerPluginShim::on_choke)
    }

    /// Peer unchoked us.
    #[must_use]
    pub fn on_unchoke(&self) -> Dispatch {
        self.first_consumer("unchoke", PeerPluginShim::on_unchoke)
    }

    /// Peer is interested.
    #[must_use]
    pub fn on_interested(&self) -> Dispatch {
        self.first_consumer("interested", PeerPluginShim::on_interested)
    }

    /// Peer is no longer interested.
    #[must_use]
    pub fn on_not_interested(&self) -> Dispatch {
        self.first_consumer("not_interested", PeerPluginShim::on_not_interested)
    }

    /// Peer announced a piece.
    #[must_use]
    pub fn on_have(&self, index: PieceIndex) -> Dispatch {
        self.first_consumer("have", |shim| shim.on_have(index))
    }

    /// Peer withdrew a piece.
    #[must_use]
    pub fn on_dont_have(&self, index: PieceIndex) -> Dispatch {
        self.first_consumer("dont_have", |shim| shim.on_dont_have(index))
    }

    /// Peer sent its bitfield.
    #[must_use]
    pub fn on_bitfield(&self, bitfield: &Bitfield) -> Dispatch {
        self.first_consumer("bitfield", |shim| shim.on_bitfield(bitfield))
    }

    /// Peer has every piece.
    #[must_use]
    pub fn on_have_all(&self) -> Dispatch {
        self.first_consumer("have_all", PeerPluginShim::on_have_all)
    }

    /// Peer has no pieces.
    #[must_use]
    pub fn on_have_none(&self) -> Dispatch {
        self.first_consumer("have_none", PeerPluginShim::on_have_none)
    }

    /// Peer allowed a fast request.
    #[must_use]
    pub fn on_allowed_fast(&self, index: PieceIndex) -> Dispatch {
        self.first_consumer("allowed_fast", |shim| shim.on_allowed_fast(index))
    }

    /// Peer requested a block.
    #[must_use]
    pub fn on_request(&self, request: &PeerRequest) -> Dispatch {
        self.first_consumer("request", |shim| shim.on_request(request))
    }

    /// Peer delivered a block.
    #[must_use]
    pub fn on_piece(&self, request: &PeerRequest, data: &[u8]) -> Dispatch {
        self.first_consumer("piece", |shim| shim.on_piece(request, data))
    }

    /// Peer cancelled a request.
    #[must_use]
    pub fn on_cancel(&self, request: &PeerRequest) -> Dispatch {
        self.first_consumer("cancel", |shim| shim.on_cancel(request))
    }

    /// Peer rejected one of our requests.
    #[must_use]
    pub fn on_reject(&self, request: &PeerRequest) -> Dispatch {
        self.first_consumer("reject", |shim| shim.on_reject(request))
    }

    /// Peer suggested a piece.
    #[must_use]
    pub fn on_suggest(&self, index: PieceIndex) -> Dispatch {
        self.first_consumer("suggest", |shim| shim.on_suggest(index))
    }

    /// Extension protocol message.
    #[must_use]
    pub fn on_extended(&self, length: u32, message: u8, body: &[u8]) -> Dispatch {
        self.first_consumer("extended", |shim| shim.on_extended(length, message, body))
    }

    /// Unrecognised message id.
    #[must_use]
    pub fn on_unknown_message(&self, length: u32, message: u8, body: &[u8]) -> Dispatch {
        self.first_consumer("unknown_message", |shim| {
            shim.on_unknown_message(length, message, body)
        })
    }

    /// Offer an outgoing request to the plugins; the first writer takes it over.
    #[must_use]
    pub fn write_request(&self, request: &PeerRequest) -> Dispatch {
        self.first_consumer("write_request", |shim| shim.write_request(request))
    }

    /// We sent an unchoke.
    pub fn sent_unchoke(&self) {
        for shim in &self.chain {
            shim.sent_unchoke();
        }
    }

    /// We sent payload bytes.
    pub fn sent_payload(&self, bytes: u32) {
        for shim in &self.chain {
            shim.sent_payload(bytes);
        }
    }

    /// A piece this peer contributed to passed the hash check.
    pub fn piece_passed(&self, index: PieceIndex) {
        for shim in &self.chain {
            shim.on_piece_pass(index);
        }
    }

    /// A piece this peer contributed to failed the hash check.
    pub fn piece_failed(&self, index: PieceIndex) {
        for shim in &self.chain {
            shim.on_piece_failed(index);
        }
    }

    /// Once-per-second connection tick.
    pub fn tick(&self) {
        for shim in &self.chain {
            shim.tick();
        }
    }

    fn first_consumer(
        &self,
        kind: &'static str,
        hook: impl Fn(&PeerPluginShim) -> Dispatch,
    ) -> Dispatch {
        for shim in &self.chain {
            if hook(shim).is_consumed() {
                trace!(
                    peer_id = %self.peer.id,
                    plugin = shim.type_name(),
                    kind,
                    "plugin consumed message"
                );
                return Dispatch::Consumed;
            }
        }
        Dispatch::Deferred
    }

    fn all_accept(
        &self,
        check: &'static str,
        hook: impl Fn(&PeerPluginShim) -> Acceptance,
    ) -> Acceptance {
        for shim in &self.chain {
            if !hook(shim).is_accepted() {
                debug!(
                    peer_id = %self.peer.id,
                    endpoint = %self.peer.endpoint,
                    plugin = shim.type_name(),
                    check,
                    "plugin rejected connection check"
                );
                return Acceptance::Rejected;
            }
        }
        Acceptance::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use swarmhook_config::HostConfig;
    use swarmhook_test_support::fixtures::{peer_ref, torrent_handle};
    use swarmhook_test_support::recording::{Behaviour, CallLog, RecordingSessionPlugin};

    use crate::PluginHost;

    fn chain(behaviours: &[(&str, Behaviour)], log: &CallLog) -> (PluginHost, PeerExtensions) {
        let host = PluginHost::from_config(&HostConfig::default());
        for (label, behaviour) in behaviours {
            host.add_extension(
                *label,
                Arc::new(RecordingSessionPlugin::with_behaviour(
                    *label,
                    log.clone(),
                    *behaviour,
                )),
            )
            .expect("register extension");
        }
        let handle = torrent_handle(1);
        let peer = host
            .attach_torrent(&handle, None)
            .attach_peer(&peer_ref(&handle, 1));
        log.clear();
        (host, peer)
    }

    fn reason() -> DisconnectReason {
        DisconnectReason {
            code: 2,
            message: "end of file".into(),
        }
    }

    fn request() -> PeerRequest {
        PeerRequest {
            piece: PieceIndex(6),
            start: 16_384,
            length: 16_384,
        }
    }

    #[test]
    fn consumer_stops_dispatch() {
        let log = CallLog::default();
        let consume = Behaviour {
            consume: true,
            ..Behaviour::default()
        };
        let (_host, peer) = chain(
            &[("a", Behaviour::default()), ("b", consume), ("c", consume)],
            &log,
        );

        assert_eq!(peer.on_choke(), Dispatch::Consumed);
        assert_eq!(peer.on_have(PieceIndex(3)), Dispatch::Consumed);
        assert_eq!(
            log.entries(),
            vec![
                "a/peer:on_choke",
                "b/peer:on_choke",
                "a/peer:on_have(3)",
                "b/peer:on_have(3)",
            ]
        );
    }

    #[test]
    fn unconsumed_messages_reach_every_plugin() -> anyhow::Result<()> {
        let log = CallLog::default();
        let (_host, peer) = chain(
            &[("a", Behaviour::default()), ("b", Behaviour::default())],
            &log,
        );
        let bitfield = Bitfield::from_bytes(vec![0b1100_0000], 4)?;

        assert_eq!(peer.on_bitfield(&bitfield), Dispatch::Deferred);
        assert_eq!(peer.on_request(&request()), Dispatch::Deferred);
        assert_eq!(peer.on_piece(&request(), &[0; 8]), Dispatch::Deferred);
        assert_eq!(peer.on_extended(3, 1, b"abc"), Dispatch::Deferred);
        assert_eq!(peer.on_unknown_message(3, 42, b"abc"), Dispatch::Deferred);
        assert_eq!(
            log.entries(),
            vec![
                "a/peer:on_bitfield(2)",
                "b/peer:on_bitfield(2)",
                "a/peer:on_request(6)",
                "b/peer:on_request(6)",
                "a/peer:on_piece(6)",
                "b/peer:on_piece(6)",
                "a/peer:on_extended(1)",
                "b/peer:on_extended(1)",
                "a/peer:on_unknown_message(42)",
                "b/peer:on_unknown_message(42)",
            ]
        );
        Ok(())
    }

    #[test]
    fn base_defaults_defer_every_hook() {
        let log = CallLog::default();
        let (_host, peer) = chain(&[("a", Behaviour::default())], &log);
        let index = PieceIndex(0);
        let outcomes = [
            peer.on_unchoke(),
            peer.on_interested(),
            peer.on_not_interested(),
            peer.on_dont_have(index),
            peer.on_have_all(),
            peer.on_have_none(),
            peer.on_allowed_fast(index),
            peer.on_cancel(&request()),
            peer.on_reject(&request()),
            peer.on_suggest(index),
            peer.write_request(&request()),
        ];
        assert!(outcomes.iter().all(|outcome| !outcome.is_consumed()));
    }

    #[test]
    fn one_rejection_fails_the_handshake() {
        let log = CallLog::default();
        let reject = Behaviour {
            reject_handshake: true,
            ..Behaviour::default()
        };
        let (_host, peer) = chain(
            &[("a", reject), ("b", Behaviour::default())],
            &log,
        );

        assert_eq!(peer.on_handshake(&[0; 8]), Acceptance::Rejected);
        assert_eq!(
            peer.on_extension_handshake(&json!({"m": {"ut_pex": 1}})),
            Acceptance::Rejected
        );
        assert_eq!(
            log.entries(),
            vec!["a/peer:on_handshake", "a/peer:on_extension_handshake"]
        );
    }

    #[test]
    fn held_connection_blocks_disconnect() {
        let log = CallLog::default();
        let hold = Behaviour {
            hold_connection: true,
            ..Behaviour::default()
        };
        let (_host, peer) = chain(&[("a", Behaviour::default()), ("b", hold)], &log);
        assert_eq!(peer.can_disconnect(&reason()), Acceptance::Rejected);

        let (_host, open) = chain(&[("a", Behaviour::default())], &log);
        assert_eq!(open.can_disconnect(&reason()), Acceptance::Accepted);
    }

    #[test]
    fn disconnect_notifies_and_publishes() {
        let log = CallLog::default();
        let (host, peer) = chain(&[("a", Behaviour::default())], &log);
        peer.on_disconnect(&reason());

        assert_eq!(log.entries(), vec!["a/peer:on_disconnect(2)"]);
        let last = host.events().recent().pop().map(|envelope| envelope.event);
        assert_eq!(
            last,
            Some(Event::PeerDetached {
                torrent_id: peer.peer().torrent_id,
                peer_id: peer.peer().id,
                code: 2,
            })
        );
    }

    #[test]
    fn notifications_and_handshake_contributions_fan_out() {
        let log = CallLog::default();
        let (_host, peer) = chain(
            &[("a", Behaviour::default()), ("b", Behaviour::default())],
            &log,
        );
        let mut handshake = StateMap::new();

        peer.add_handshake(&mut handshake);
        peer.on_connected();
        peer.sent_unchoke();
        peer.sent_payload(512);
        peer.piece_passed(PieceIndex(1));
        peer.piece_failed(PieceIndex(2));
        peer.tick();

        assert_eq!(handshake.len(), 2);
        assert_eq!(peer.len(), 2);
        assert!(!peer.is_empty());
        assert_eq!(log.count("a/peer:sent_payload(512)"), 1);
        assert_eq!(log.count("b/peer:on_piece_pass(1)"), 1);
        assert_eq!(log.count("a/peer:on_connected"), 1);
        assert_eq!(log.count("b/peer:tick"), 1);
    }
}
