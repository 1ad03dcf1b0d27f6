//! Opaque engine handles and the small value types passed through plugin callbacks.

use std::fmt::{self, Display, Formatter};
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PluginError, PluginResult};

/// Free-form state document exchanged with plugins during save/handshake hooks.
pub type StateMap = serde_json::Map<String, serde_json::Value>;

/// Index of a piece within a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PieceIndex(pub u32);

impl Display for PieceIndex {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

impl From<u32> for PieceIndex {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// SHA-1 info-hash identifying a torrent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InfoHash(pub [u8; 20]);

impl Display for InfoHash {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(formatter, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for InfoHash {
    type Err = PluginError;

    fn from_str(value: &str) -> PluginResult<Self> {
        let invalid = || PluginError::InvalidInfoHash {
            value: value.to_string(),
        };
        if value.len() != 40 || !value.is_ascii() {
            return Err(invalid());
        }
        let mut bytes = [0_u8; 20];
        for (slot, pair) in bytes.iter_mut().zip(value.as_bytes().chunks(2)) {
            let text = std::str::from_utf8(pair).map_err(|_| invalid())?;
            *slot = u8::from_str_radix(text, 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for InfoHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Opaque handle to a torrent owned by the engine.
///
/// Plugins use it to query metadata; it carries no ownership of the torrent itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentHandle {
    /// Engine-assigned torrent identifier.
    pub id: Uuid,
    /// Info-hash of the torrent.
    pub info_hash: InfoHash,
    /// Display name when metadata is available.
    pub name: Option<String>,
}

impl TorrentHandle {
    /// Build a handle for a torrent whose metadata has not been fetched yet.
    #[must_use]
    pub const fn new(id: Uuid, info_hash: InfoHash) -> Self {
        Self {
            id,
            info_hash,
            name: None,
        }
    }

    /// Attach a display name to the handle.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Borrowed view of an engine peer connection, valid for the duration of a callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConnectionRef {
    /// Engine-assigned connection identifier.
    pub id: Uuid,
    /// Torrent the connection belongs to.
    pub torrent_id: Uuid,
    /// Remote endpoint of the connection.
    pub endpoint: SocketAddr,
    /// Whether the engine initiated the connection.
    pub outgoing: bool,
}

/// Torrent state codes reported by the engine through `on_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentStateCode {
    /// Waiting for a slot to check files.
    QueuedForChecking,
    /// Verifying existing piece data on disk.
    CheckingFiles,
    /// Fetching the info dictionary from peers.
    DownloadingMetadata,
    /// Downloading payload.
    Downloading,
    /// All wanted pieces are present but the torrent is not a full seed.
    Finished,
    /// Uploading only.
    Seeding,
    /// Pre-allocating storage.
    Allocating,
    /// Validating fast-resume data.
    CheckingResumeData,
    /// A code this layer does not know; forwarded untouched.
    Unknown(i32),
}

impl TorrentStateCode {
    /// Map a raw engine state code onto the enumeration.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::QueuedForChecking,
            1 => Self::CheckingFiles,
            2 => Self::DownloadingMetadata,
            3 => Self::Downloading,
            4 => Self::Finished,
            5 => Self::Seeding,
            6 => Self::Allocating,
            7 => Self::CheckingResumeData,
            other => Self::Unknown(other),
        }
    }

    /// Raw engine code for the state.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::QueuedForChecking => 0,
            Self::CheckingFiles => 1,
            Self::DownloadingMetadata => 2,
            Self::Downloading => 3,
            Self::Finished => 4,
            Self::Seeding => 5,
            Self::Allocating => 6,
            Self::CheckingResumeData => 7,
            Self::Unknown(code) => code,
        }
    }
}

impl From<i32> for TorrentStateCode {
    fn from(code: i32) -> Self {
        Self::from_code(code)
    }
}

/// Alert surfaced by the engine's alert system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineAlert {
    /// Alert type name as reported by the engine.
    pub kind: String,
    /// Human-readable alert message.
    pub message: String,
}

/// Block request exchanged with a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRequest {
    /// Piece containing the block.
    pub piece: PieceIndex,
    /// Byte offset of the block within the piece.
    pub start: u32,
    /// Block length in bytes.
    pub length: u32,
}

/// Reason reported when a peer connection is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectReason {
    /// Engine error code.
    pub code: i32,
    /// Error message associated with the code.
    pub message: String,
}

/// Where the engine learned about a peer endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerSource {
    /// Announced by a tracker.
    Tracker,
    /// Found through the distributed hash table.
    Dht,
    /// Learned from peer exchange.
    Pex,
    /// Found through local service discovery.
    Lsd,
    /// Restored from fast-resume data.
    ResumeData,
    /// Connected to us.
    Incoming,
}

/// Flags attached to a peer endpoint when it is added to a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeerFlags(pub u8);

impl PeerFlags {
    /// Peer supports protocol encryption.
    pub const ENCRYPTION: Self = Self(0x1);
    /// Peer is known to be a seed.
    pub const SEED: Self = Self(0x2);
    /// Peer supports uTP.
    pub const UTP: Self = Self(0x4);
    /// Peer supports hole punching.
    pub const HOLEPUNCH: Self = Self(0x8);

    /// Whether every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Peer eligible for the next optimistic unchoke round.
///
/// Plugins may reorder the candidate slice; the engine unchokes from the front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnchokeCandidate {
    /// Remote endpoint of the candidate.
    pub endpoint: SocketAddr,
    /// Session tick at which the peer was last optimistically unchoked.
    pub last_optimistic_unchoke: u32,
}

/// Have-bitfield advertised by a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bytes: Vec<u8>,
    len: usize,
}

impl Bitfield {
    /// Wrap the raw bitfield bytes, most significant bit first.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::BitfieldTooShort`] if `bytes` cannot hold `len` bits.
    pub fn from_bytes(bytes: Vec<u8>, len: usize) -> PluginResult<Self> {
        if bytes.len() * 8 < len {
            return Err(PluginError::BitfieldTooShort {
                len,
                bytes: bytes.len(),
            });
        }
        Ok(Self { bytes, len })
    }

    /// Number of pieces covered by the bitfield.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the bitfield covers no pieces.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the peer advertises the given piece.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::BitfieldIndexOutOfRange`] past the declared length.
    pub fn has(&self, index: PieceIndex) -> PluginResult<bool> {
        let position = index.0 as usize;
        if position >= self.len {
            return Err(PluginError::BitfieldIndexOutOfRange {
                index: index.0,
                len: self.len,
            });
        }
        let byte = self.bytes[position / 8];
        Ok(byte & (0x80 >> (position % 8)) != 0)
    }

    /// Number of advertised pieces.
    #[must_use]
    pub fn count(&self) -> usize {
        (0..self.len)
            .filter(|position| self.bytes[position / 8] & (0x80 >> (position % 8)) != 0)
            .count()
    }
}

/// Outcome of a protocol hook that may consume a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    /// A plugin handled the message; the engine skips its built-in handling.
    Consumed,
    /// No plugin handled the message.
    Deferred,
}

impl Dispatch {
    /// Whether a plugin consumed the message.
    #[must_use]
    pub const fn is_consumed(self) -> bool {
        matches!(self, Self::Consumed)
    }
}

impl From<bool> for Dispatch {
    fn from(consumed: bool) -> Self {
        if consumed {
            Self::Consumed
        } else {
            Self::Deferred
        }
    }
}

/// Outcome of a pause or resume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// The engine may proceed.
    Allowed,
    /// A plugin vetoed the transition.
    Vetoed,
}

impl Transition {
    /// Map a plugin's veto flag onto the outcome.
    #[must_use]
    pub const fn from_veto(vetoed: bool) -> Self {
        if vetoed { Self::Vetoed } else { Self::Allowed }
    }

    /// Whether the transition was vetoed.
    #[must_use]
    pub const fn is_vetoed(self) -> bool {
        matches!(self, Self::Vetoed)
    }
}

/// Outcome of a hook that may refuse a connection or keep it alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acceptance {
    /// The plugin agrees.
    Accepted,
    /// The plugin refuses.
    Rejected,
}

impl Acceptance {
    /// Whether the plugin agreed.
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl From<bool> for Acceptance {
    fn from(accepted: bool) -> Self {
        if accepted {
            Self::Accepted
        } else {
            Self::Rejected
        }
    }
}
