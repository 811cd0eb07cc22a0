//! Handshake state machine.
//!
//! [`HandshakeStateMachine`] tracks how far a connection got through the
//! handshake and which packets the resulting session may serve. It performs
//! no IO; the session feeds it what it read and asks it what is allowed.
//!
//! ```text
//! AwaitingFlags ──flags=0──▶ AwaitingEnvironmentName ──""──────▶ NoEnvironment
//!                                     │
//!                                     ├──constructed──▶ EnvironmentReady
//!                                     └──failed───────▶ EnvironmentFailed
//! ```

use crate::protocol::{PacketType, ProtocolError, SUPPORTED_FLAGS};

/// Handshake progress of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingFlags,
    AwaitingEnvironmentName,
    /// Handshake done with an empty name; only standalone commands work.
    NoEnvironment,
    EnvironmentReady,
    /// Construction failed; the session must end.
    EnvironmentFailed,
}

/// What the session must do with the environment name it just read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameAction {
    /// Empty name: acknowledge and serve without an environment.
    SkipEnvironment,
    /// Ask the provider to construct this environment.
    Construct(String),
}

/// Tracks handshake state and enforces valid transitions.
///
/// # Example
///
/// ```
/// use gymsock_server::state_machine::{HandshakeState, HandshakeStateMachine};
///
/// let mut sm = HandshakeStateMachine::new();
/// sm.on_flags(0).unwrap();
/// assert_eq!(sm.state(), HandshakeState::AwaitingEnvironmentName);
/// ```
#[derive(Debug)]
pub struct HandshakeStateMachine {
    state: HandshakeState,
}

impl Default for HandshakeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeStateMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: HandshakeState::AwaitingFlags,
        }
    }

    #[must_use]
    pub const fn state(&self) -> HandshakeState {
        self.state
    }

    /// Whether the session may start reading packets.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(
            self.state,
            HandshakeState::NoEnvironment | HandshakeState::EnvironmentReady
        )
    }

    fn expect(&self, expected: HandshakeState, event: &str) -> Result<(), ProtocolError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ProtocolError::Handshake(format!(
                "{event} not allowed in state {:?}",
                self.state
            )))
        }
    }

    /// Record the flags byte. Only [`SUPPORTED_FLAGS`] is accepted.
    pub fn on_flags(&mut self, flags: u8) -> Result<(), ProtocolError> {
        self.expect(HandshakeState::AwaitingFlags, "flags")?;
        if flags != SUPPORTED_FLAGS {
            return Err(ProtocolError::UnsupportedFlags(flags));
        }
        self.state = HandshakeState::AwaitingEnvironmentName;
        Ok(())
    }

    /// Record the environment name.
    pub fn on_environment_name(&mut self, name: &str) -> Result<NameAction, ProtocolError> {
        self.expect(HandshakeState::AwaitingEnvironmentName, "environment name")?;
        if name.is_empty() {
            self.state = HandshakeState::NoEnvironment;
            return Ok(NameAction::SkipEnvironment);
        }
        Ok(NameAction::Construct(name.to_owned()))
    }

    /// Record the outcome of constructing the named environment.
    pub fn on_construction(&mut self, succeeded: bool) -> Result<(), ProtocolError> {
        self.expect(HandshakeState::AwaitingEnvironmentName, "construction result")?;
        self.state = if succeeded {
            HandshakeState::EnvironmentReady
        } else {
            HandshakeState::EnvironmentFailed
        };
        Ok(())
    }

    /// Check that `packet` may be served in the current state.
    pub fn allows(&self, packet: PacketType) -> Result<(), ProtocolError> {
        match self.state {
            HandshakeState::EnvironmentReady => Ok(()),
            HandshakeState::NoEnvironment if !packet.needs_environment() => Ok(()),
            HandshakeState::NoEnvironment => Err(ProtocolError::NoEnvironment { command: packet }),
            HandshakeState::AwaitingFlags
            | HandshakeState::AwaitingEnvironmentName
            | HandshakeState::EnvironmentFailed => Err(ProtocolError::Handshake(format!(
                "{packet} not allowed in state {:?}",
                self.state
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
