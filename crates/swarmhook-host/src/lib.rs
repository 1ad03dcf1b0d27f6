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

//! Engine-side plugin host.
//!
//! The host owns the registered session extensions and builds one chain of torrent
//! plugins per attached torrent and one chain of peer plugins per connection. It decides
//! how the answers of several plugins combine, mirroring the engine contract:
//!
//! - consumable peer hooks stop at the first plugin that consumes the message;
//! - pause/resume stop at the first veto;
//! - handshake and disconnect checks need every plugin to agree;
//! - notifications reach every plugin in registration order.

pub mod error;
mod host;
mod peer;
mod torrent;

pub use error::{HostError, HostResult};
pub use host::{PluginHost, Registration};
pub use peer::PeerExtensions;
pub use torrent::TorrentExtensions;
