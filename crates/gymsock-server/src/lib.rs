//! TCP server and binary protocol for remote environments.
//!
//! A client connects, names an environment, and then drives it with
//! single-byte command packets:
//!
//! - [`framing`]: little-endian primitives and length-prefixed fields
//! - [`protocol`]: packet tags, envelope tags and [`ProtocolError`]
//! - [`codec`]: space descriptors, observations, actions and step replies
//! - [`state_machine`]: [`HandshakeStateMachine`] gating commands on the
//!   handshake outcome
//! - [`session`]: [`Session`] running one connection to completion
//! - [`server`]: [`GymServer`], one session thread per connection
//! - [`client`]: [`GymClient`], the matching blocking client
//!
//! Recoverable failures are reported to the client as a non-empty error
//! string. Everything else ends the session.

pub mod client;
pub mod codec;
pub mod framing;
pub mod protocol;
pub mod server;
pub mod session;
pub mod state_machine;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use client::{ClientError, GymClient, RemoteSpaces};
pub use framing::{FrameError, MAX_FIELD_SIZE};
pub use protocol::{PacketType, ProtocolError, SpaceId};
pub use server::GymServer;
pub use session::Session;
pub use state_machine::HandshakeStateMachine;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        ClientError, FrameError, GymClient, GymServer, HandshakeStateMachine, PacketType,
        ProtocolError, Session, SpaceId, codec::StepReply,
    };
}
