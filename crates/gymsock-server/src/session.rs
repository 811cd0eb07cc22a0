//! One connection: handshake, then the command loop.
//!
//! A [`Session`] reads a request, performs it, writes the response and
//! flushes, strictly one packet at a time. It owns at most one environment,
//! which is closed when the session ends for any reason.
//!
//! Failures come in two kinds:
//!
//! - recoverable: provider and hook failures travel back as a non-empty
//!   error string and the session continues;
//! - fatal: framing errors, protocol violations and environment failures in
//!   commands without an error slot end the session with a [`ProtocolError`].

use std::io::{Read, Write};
use std::path::PathBuf;

use gymsock_core::traits::{
    Environment, EnvironmentProvider, Handoff, Hooks, MonitorOptions, Options, Rejected,
    UploadRequest,
};
use rand_chacha::ChaCha8Rng;
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::codec::{read_action, write_action, write_observation, write_space, write_step};
use crate::framing::{FrameError, read_bool, read_byte, read_field_str, write_field_str};
use crate::protocol::{PacketType, ProtocolError, SpaceId};
use crate::state_machine::{HandshakeStateMachine, NameAction};

/// Parse `configure`/`wrap` options, which must be a JSON object.
pub fn parse_options(text: &str) -> Result<Options, String> {
    match serde_json::from_str::<Json>(text) {
        Ok(Json::Object(options)) => Ok(options),
        Ok(other) => Err(format!(
            "invalid options JSON: expected an object, got {other}"
        )),
        Err(e) => Err(format!("invalid options JSON: {e}")),
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Server-side state of one connection.
pub struct Session<'a, R, W> {
    reader: R,
    writer: W,
    provider: &'a dyn EnvironmentProvider,
    hooks: &'a Hooks,
    rng: ChaCha8Rng,
    sm: HandshakeStateMachine,
    env: Option<Box<dyn Environment>>,
}

impl<'a, R: Read, W: Write> Session<'a, R, W> {
    pub fn new(
        reader: R,
        writer: W,
        provider: &'a dyn EnvironmentProvider,
        hooks: &'a Hooks,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            reader,
            writer,
            provider,
            hooks,
            rng,
            sm: HandshakeStateMachine::new(),
            env: None,
        }
    }

    /// Run the handshake and the command loop until the connection ends.
    ///
    /// Returns `Ok(())` when the client disconnects between packets and the
    /// terminating error otherwise. The environment is closed either way.
    pub fn run(mut self) -> Result<(), ProtocolError> {
        let result = self.handshake().and_then(|()| self.command_loop());
        self.close_environment();

        match &result {
            Ok(()) => info!("session ended"),
            Err(e) if e.is_disconnect() => debug!(error = %e, "client disconnected"),
            Err(e) => warn!(error = %e, "session terminated"),
        }
        result
    }

    fn handshake(&mut self) -> Result<(), ProtocolError> {
        let flags = read_byte(&mut self.reader)?;
        self.sm.on_flags(flags)?;

        let name = read_field_str(&mut self.reader)?;
        match self.sm.on_environment_name(&name)? {
            NameAction::SkipEnvironment => {
                self.respond_status("")?;
                info!("session started without an environment");
            }
            NameAction::Construct(name) => match self.provider.make(&name) {
                Ok(env) => {
                    self.sm.on_construction(true)?;
                    self.env = Some(env);
                    self.respond_status("")?;
                    info!(env = %name, "session started");
                }
                Err(e) => {
                    self.sm.on_construction(false)?;
                    let message = e.to_string();
                    self.respond_status(&message)?;
                    return Err(ProtocolError::Handshake(message));
                }
            },
        }
        Ok(())
    }

    fn command_loop(&mut self) -> Result<(), ProtocolError> {
        loop {
            let tag = match read_byte(&mut self.reader) {
                Ok(tag) => tag,
                Err(FrameError::Eof) => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            let packet = PacketType::try_from(tag)?;
            debug!(%packet, "packet");
            self.sm.allows(packet)?;
            self.dispatch(packet)?;
            self.writer.flush()?;
        }
    }

    fn dispatch(&mut self, packet: PacketType) -> Result<(), ProtocolError> {
        match packet {
            PacketType::Reset => {
                let env = Self::env(&mut self.env, packet)?;
                let observation = env.reset()?;
                write_observation(&mut self.writer, env.observation_space(), &observation)?;
            }
            PacketType::Step => {
                let env = Self::env(&mut self.env, packet)?;
                let action = read_action(&mut self.reader, env.action_space())?;
                let step = env.step(action)?;
                write_step(&mut self.writer, env.observation_space(), &step)?;
            }
            PacketType::GetSpace => {
                let id = SpaceId::try_from(read_byte(&mut self.reader)?)?;
                let env = Self::env(&mut self.env, packet)?;
                let space = match id {
                    SpaceId::Action => env.action_space(),
                    SpaceId::Observation => env.observation_space(),
                };
                write_space(&mut self.writer, space)?;
            }
            PacketType::SampleAction => {
                let env = Self::env(&mut self.env, packet)?;
                let action = env.sample_action(&mut self.rng)?;
                write_action(&mut self.writer, env.action_space(), &action)?;
            }
            PacketType::Monitor => {
                let options = MonitorOptions {
                    resume: read_bool(&mut self.reader)?,
                    force: read_bool(&mut self.reader)?,
                    video: read_bool(&mut self.reader)?,
                    directory: PathBuf::from(read_field_str(&mut self.reader)?),
                };
                let env = self.take_env(packet)?;
                let handoff = self.hooks.monitor.start(env, &options);
                let status = self.install(packet, handoff);
                self.respond_status(&status)?;
            }
            PacketType::Render => {
                let env = Self::env(&mut self.env, packet)?;
                if let Err(e) = env.render() {
                    warn!(error = %e, "render failed");
                }
            }
            PacketType::Upload => {
                let directory = PathBuf::from(read_field_str(&mut self.reader)?);
                let api_key = read_field_str(&mut self.reader)?;
                let algorithm_id = Some(read_field_str(&mut self.reader)?).filter(|id| !id.is_empty());
                let request = UploadRequest {
                    directory,
                    api_key,
                    algorithm_id,
                };
                let status = match self.hooks.uploader.upload(&request) {
                    Ok(()) => String::new(),
                    Err(e) => {
                        debug!(error = %e, "upload failed");
                        e.to_string()
                    }
                };
                self.respond_status(&status)?;
            }
            PacketType::Configure => {
                let options = read_field_str(&mut self.reader)?;
                let status = match parse_options(&options) {
                    Ok(options) => {
                        let env = self.take_env(packet)?;
                        let handoff = self.hooks.extension.configure(env, &options);
                        self.install(packet, handoff)
                    }
                    Err(message) => message,
                };
                self.respond_status(&status)?;
            }
            PacketType::Wrap => {
                let name = read_field_str(&mut self.reader)?;
                let options = read_field_str(&mut self.reader)?;
                let status = match parse_options(&options) {
                    Ok(options) => {
                        let env = self.take_env(packet)?;
                        let handoff = self.hooks.extension.wrap(env, &name, &options);
                        self.install(packet, handoff)
                    }
                    Err(message) => message,
                };
                self.respond_status(&status)?;
            }
        }
        Ok(())
    }

    fn env(
        env: &mut Option<Box<dyn Environment>>,
        command: PacketType,
    ) -> Result<&mut Box<dyn Environment>, ProtocolError> {
        env.as_mut().ok_or(ProtocolError::NoEnvironment { command })
    }

    fn take_env(&mut self, command: PacketType) -> Result<Box<dyn Environment>, ProtocolError> {
        self.env.take().ok_or(ProtocolError::NoEnvironment { command })
    }

    /// Install whichever environment the hook handed back and return the
    /// status string for the client.
    fn install(&mut self, command: PacketType, handoff: Handoff) -> String {
        match handoff {
            Ok(env) => {
                debug!(%command, env = env.id(), "environment replaced");
                self.env = Some(env);
                String::new()
            }
            Err(Rejected { env, error }) => {
                debug!(%command, error = %error, "environment kept");
                self.env = Some(env);
                error.to_string()
            }
        }
    }

    fn respond_status(&mut self, status: &str) -> Result<(), ProtocolError> {
        write_field_str(&mut self.writer, status)?;
        self.writer.flush()?;
        Ok(())
    }

    fn close_environment(&mut self) {
        if let Some(mut env) = self.env.take() {
            if let Err(e) = env.close() {
                warn!(error = %e, env = env.id(), "failed to close environment");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
