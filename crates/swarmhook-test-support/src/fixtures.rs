//! Engine-side handles for tests.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use swarmhook_plugin::{EngineTorrent, InfoHash, PeerConnectionRef, TorrentHandle};
use uuid::Uuid;

/// Deterministic torrent handle; `n` seeds the id and the info-hash.
#[must_use]
pub fn torrent_handle(n: u8) -> TorrentHandle {
    TorrentHandle::new(Uuid::from_u128(u128::from(n) + 1), InfoHash([n; 20]))
        .with_name(format!("torrent-{n}"))
}

/// Deterministic peer connection on `torrent`; `n` seeds the id and the endpoint.
#[must_use]
pub fn peer_ref(torrent: &TorrentHandle, n: u8) -> PeerConnectionRef {
    PeerConnectionRef {
        id: Uuid::from_u128(0x1000 + u128::from(n)),
        torrent_id: torrent.id,
        endpoint: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, n)), 6881),
        outgoing: n % 2 == 0,
    }
}

/// Minimal stand-in for the engine's torrent object.
#[derive(Debug, Clone)]
pub struct FakeTorrent {
    handle: TorrentHandle,
}

impl FakeTorrent {
    /// Wrap a handle.
    #[must_use]
    pub const fn new(handle: TorrentHandle) -> Self {
        Self { handle }
    }
}

impl EngineTorrent for FakeTorrent {
    fn handle(&self) -> TorrentHandle {
        self.handle.clone()
    }
}
