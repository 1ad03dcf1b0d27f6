#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Plugin capability sets for a BitTorrent engine.
//!
//! Three scopes are exposed, leaves first:
//!
//! - [`PeerPlugin`] receives per-connection protocol events.
//! - [`TorrentPlugin`] receives per-torrent lifecycle events and creates peer plugins.
//! - [`SessionPlugin`] receives session ticks and creates torrent plugins.
//!
//! Every capability method carries a default, so an implementation only overrides the
//! hooks it cares about. The engine never talks to the traits directly: it holds the
//! shared-ownership shims ([`SessionPluginShim`], [`TorrentPluginShim`],
//! [`PeerPluginShim`]) which forward each call and turn factory results into an optional
//! shared handle.

pub mod error;
pub mod model;
pub mod peer;
pub mod session;
pub mod torrent;

pub use error::{PluginError, PluginResult};
pub use model::{
    Acceptance, Bitfield, DisconnectReason, Dispatch, EngineAlert, InfoHash, PeerConnectionRef,
    PeerFlags, PeerRequest, PeerSource, PieceIndex, StateMap, TorrentHandle, TorrentStateCode,
    Transition, UnchokeCandidate,
};
pub use peer::{BasePeerPlugin, DEFAULT_PEER_PLUGIN_TYPE, PeerPlugin, PeerPluginShim};
pub use session::{
    BaseSessionPlugin, EngineTorrent, SessionPlugin, SessionPluginShim, TorrentContext,
};
pub use torrent::{BaseTorrentPlugin, TorrentPlugin, TorrentPluginShim};
