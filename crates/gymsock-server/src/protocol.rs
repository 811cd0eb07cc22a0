//! Packet table and session-terminating errors.
//!
//! After the handshake the client sends packets, each a one-byte
//! [`PacketType`] tag followed by a packet-specific body. The server answers
//! every packet except `render` with exactly one response.

use gymsock_core::error::{EnvError, SpaceError};
use thiserror::Error;

use crate::framing::{FrameError, is_disconnect_kind};

/// The only flags value this protocol revision accepts in the handshake.
pub const SUPPORTED_FLAGS: u8 = 0;

/// Observation envelope tag: compact JSON string field.
pub const OBS_JSON: u8 = 0;
/// Observation envelope tag: dims-prefixed raw `uint8` tensor.
pub const OBS_UINT8: u8 = 1;

/// Action envelope tag: JSON string field.
pub const ACTION_JSON: u8 = 0;

// ---------------------------------------------------------------------------
// PacketType
// ---------------------------------------------------------------------------

/// Command tags, fixed for this protocol revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Reset = 0,
    Step = 1,
    GetSpace = 2,
    SampleAction = 3,
    Monitor = 4,
    Render = 5,
    Upload = 6,
    Configure = 7,
    Wrap = 8,
}

impl PacketType {
    pub const ALL: [Self; 9] = [
        Self::Reset,
        Self::Step,
        Self::GetSpace,
        Self::SampleAction,
        Self::Monitor,
        Self::Render,
        Self::Upload,
        Self::Configure,
        Self::Wrap,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Step => "step",
            Self::GetSpace => "get_space",
            Self::SampleAction => "sample_action",
            Self::Monitor => "monitor",
            Self::Render => "render",
            Self::Upload => "upload",
            Self::Configure => "configure",
            Self::Wrap => "wrap",
        }
    }

    /// Whether the command operates on the session environment.
    pub const fn needs_environment(self) -> bool {
        !matches!(self, Self::Upload)
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|p| *p as u8 == tag)
            .ok_or(ProtocolError::UnknownPacketType(tag))
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// SpaceId
// ---------------------------------------------------------------------------

/// Selector byte of `get_space`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SpaceId {
    Action = 0,
    Observation = 1,
}

impl TryFrom<u8> for SpaceId {
    type Error = ProtocolError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(Self::Action),
            1 => Ok(Self::Observation),
            other => Err(ProtocolError::UnknownSpaceId(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// ProtocolError
// ---------------------------------------------------------------------------

/// Reasons a session ends. Every variant is fatal to the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("unsupported flags: {0}")]
    UnsupportedFlags(u8),

    #[error("unknown packet type: {0}")]
    UnknownPacketType(u8),

    #[error("unknown space id: {0}")]
    UnknownSpaceId(u8),

    #[error("unknown action type: {0}")]
    UnknownActionType(u8),

    #[error("invalid action: {0}")]
    InvalidAction(SpaceError),

    #[error("unknown observation type: {0}")]
    UnknownObservationType(u8),

    #[error("invalid observation: {0}")]
    InvalidObservation(SpaceError),

    #[error("invalid space descriptor: {0}")]
    InvalidSpace(SpaceError),

    #[error("{command} requires an environment")]
    NoEnvironment { command: PacketType },

    #[error("environment failure: {0}")]
    Environment(#[from] EnvError),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the session ended because the peer disconnected.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Frame(e) => e.is_eof(),
            Self::Io(e) => is_disconnect_kind(e.kind()),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
