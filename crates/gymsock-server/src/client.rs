//! Blocking client for the protocol, used by tools and tests.
//!
//! [`GymClient`] performs the handshake and caches both spaces so that
//! observations on the JSON path can be decoded. Recoverable failures
//! reported by the server surface as [`ClientError::Remote`].

use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;

use gymsock_core::space::Space;
use gymsock_core::value::Value;
use serde_json::Value as Json;
use thiserror::Error;

use crate::codec::{StepReply, read_observation, read_space, read_step, write_action_json};
use crate::framing::{read_byte, read_field_str, write_bool, write_byte, write_field_str};
use crate::protocol::{ACTION_JSON, PacketType, ProtocolError, SUPPORTED_FLAGS, SpaceId};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Non-empty error string returned by the server.
    #[error("server error: {0}")]
    Remote(String),
}

impl From<crate::framing::FrameError> for ClientError {
    fn from(e: crate::framing::FrameError) -> Self {
        Self::Protocol(e.into())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        Self::Protocol(e.into())
    }
}

/// Spaces of the remote environment, fetched after the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSpaces {
    pub action: Space,
    pub observation: Space,
}

/// A connected client.
#[derive(Debug)]
pub struct GymClient<R, W> {
    reader: R,
    writer: W,
    spaces: Option<RemoteSpaces>,
}

impl GymClient<BufReader<TcpStream>, BufWriter<TcpStream>> {
    /// Connect over TCP and perform the handshake for `env_name`.
    ///
    /// An empty `env_name` opens a session without an environment.
    pub fn connect(addr: impl ToSocketAddrs, env_name: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Self::handshake(reader, BufWriter::new(stream), env_name)
    }
}

impl<R: Read, W: Write> GymClient<R, W> {
    /// Perform the handshake over an existing byte stream.
    pub fn handshake(reader: R, writer: W, env_name: &str) -> Result<Self, ClientError> {
        let mut client = Self {
            reader,
            writer,
            spaces: None,
        };
        write_byte(&mut client.writer, SUPPORTED_FLAGS)?;
        write_field_str(&mut client.writer, env_name)?;
        client.writer.flush()?;
        client.status()?;

        if !env_name.is_empty() {
            let action = client.get_space(SpaceId::Action)?;
            let observation = client.get_space(SpaceId::Observation)?;
            client.spaces = Some(RemoteSpaces {
                action,
                observation,
            });
        }
        Ok(client)
    }

    /// Cached spaces, `None` in no-environment mode.
    pub const fn spaces(&self) -> Option<&RemoteSpaces> {
        self.spaces.as_ref()
    }

    fn observation_space(&self) -> Result<&Space, ClientError> {
        self.spaces
            .as_ref()
            .map(|s| &s.observation)
            .ok_or_else(|| ClientError::Remote("no environment".into()))
    }

    fn send(&mut self, packet: PacketType) -> Result<(), ClientError> {
        write_byte(&mut self.writer, packet as u8)?;
        Ok(())
    }

    fn status(&mut self) -> Result<(), ClientError> {
        let status = read_field_str(&mut self.reader)?;
        if status.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Remote(status))
        }
    }

    pub fn get_space(&mut self, id: SpaceId) -> Result<Space, ClientError> {
        self.send(PacketType::GetSpace)?;
        write_byte(&mut self.writer, id as u8)?;
        self.writer.flush()?;
        Ok(read_space(&mut self.reader)?)
    }

    pub fn reset(&mut self) -> Result<Value, ClientError> {
        self.send(PacketType::Reset)?;
        self.writer.flush()?;
        let space = self.observation_space()?.clone();
        Ok(read_observation(&mut self.reader, &space)?)
    }

    /// Step with an action given in its jsonable form.
    pub fn step(&mut self, action: &Json) -> Result<StepReply, ClientError> {
        self.send(PacketType::Step)?;
        write_action_json(&mut self.writer, action)?;
        self.writer.flush()?;
        let space = self.observation_space()?.clone();
        Ok(read_step(&mut self.reader, &space)?)
    }

    /// Ask the server for a random action, in its jsonable form.
    pub fn sample_action(&mut self) -> Result<Json, ClientError> {
        self.send(PacketType::SampleAction)?;
        self.writer.flush()?;
        let tag = read_byte(&mut self.reader)?;
        if tag != ACTION_JSON {
            return Err(ProtocolError::UnknownActionType(tag).into());
        }
        let text = read_field_str(&mut self.reader)?;
        serde_json::from_str(&text)
            .map_err(|e| ProtocolError::MalformedResponse(format!("sampled action: {e}")).into())
    }

    pub fn monitor(
        &mut self,
        directory: &Path,
        resume: bool,
        force: bool,
        video: bool,
    ) -> Result<(), ClientError> {
        self.send(PacketType::Monitor)?;
        write_bool(&mut self.writer, resume)?;
        write_bool(&mut self.writer, force)?;
        write_bool(&mut self.writer, video)?;
        write_field_str(&mut self.writer, &directory.to_string_lossy())?;
        self.writer.flush()?;
        self.status()
    }

    /// Render; the server sends no response.
    pub fn render(&mut self) -> Result<(), ClientError> {
        self.send(PacketType::Render)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn upload(
        &mut self,
        directory: &Path,
        api_key: &str,
        algorithm_id: Option<&str>,
    ) -> Result<(), ClientError> {
        self.send(PacketType::Upload)?;
        write_field_str(&mut self.writer, &directory.to_string_lossy())?;
        write_field_str(&mut self.writer, api_key)?;
        write_field_str(&mut self.writer, algorithm_id.unwrap_or(""))?;
        self.writer.flush()?;
        self.status()
    }

    /// Configure the environment, then refresh the cached spaces.
    pub fn configure(&mut self, options: &Json) -> Result<(), ClientError> {
        self.send(PacketType::Configure)?;
        write_field_str(&mut self.writer, &options.to_string())?;
        self.writer.flush()?;
        self.status()?;
        self.refresh_spaces()
    }

    /// Wrap the environment, then refresh the cached spaces.
    pub fn wrap(&mut self, name: &str, options: &Json) -> Result<(), ClientError> {
        self.send(PacketType::Wrap)?;
        write_field_str(&mut self.writer, name)?;
        write_field_str(&mut self.writer, &options.to_string())?;
        self.writer.flush()?;
        self.status()?;
        self.refresh_spaces()
    }

    fn refresh_spaces(&mut self) -> Result<(), ClientError> {
        let action = self.get_space(SpaceId::Action)?;
        let observation = self.get_space(SpaceId::Observation)?;
        self.spaces = Some(RemoteSpaces {
            action,
            observation,
        });
        Ok(())
    }
}
