//! Encoding of spaces, actions, observations and step results.
//!
//! # Observation envelope
//!
//! ```text
//! tag 0 (OBS_JSON):   field_str(compact jsonable)
//! tag 1 (OBS_UINT8):  field( dim_count:u32 | dims:[u32] | raw row-major bytes )
//! ```
//!
//! A `uint8` Box value with at least one dimension always takes tag 1;
//! everything else takes tag 0.
//!
//! # Action envelope
//!
//! ```text
//! tag 0 (ACTION_JSON): field_str(jsonable)
//! ```

use std::io::{Read, Write};

use gymsock_core::error::{EnvError, SpaceError};
use gymsock_core::space::Space;
use gymsock_core::types::{StepResult, info_to_json};
use gymsock_core::value::{Tensor, TensorData, Value};
use serde_json::Value as Json;
use tracing::warn;

use crate::framing::{
    FrameError, read_bool, read_byte, read_f64, read_field, read_field_str, write_bool,
    write_byte, write_f64, write_field, write_field_str,
};
use crate::protocol::{ACTION_JSON, OBS_JSON, OBS_UINT8, ProtocolError};

/// Metadata sent in place of step info that cannot be represented as JSON.
pub const EMPTY_INFO: &str = "{}";

fn env_space_error(e: SpaceError) -> ProtocolError {
    ProtocolError::Environment(EnvError::Space(e))
}

fn wire_u32(n: usize) -> Result<u32, FrameError> {
    u32::try_from(n).map_err(|_| FrameError::FieldTooLarge {
        size: n,
        max: u32::MAX as usize,
    })
}

// ---------------------------------------------------------------------------
// Spaces
// ---------------------------------------------------------------------------

/// Write a space as its JSON descriptor string.
pub fn write_space(writer: &mut impl Write, space: &Space) -> Result<(), ProtocolError> {
    let json = space.to_json().map_err(env_space_error)?;
    write_field_str(writer, &json)?;
    Ok(())
}

/// Read and validate a JSON descriptor string.
pub fn read_space(reader: &mut impl Read) -> Result<Space, ProtocolError> {
    let json = read_field_str(reader)?;
    Space::from_json(&json).map_err(ProtocolError::InvalidSpace)
}

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// Write an observation envelope, choosing the binary path for images.
pub fn write_observation(
    writer: &mut impl Write,
    space: &Space,
    observation: &Value,
) -> Result<(), ProtocolError> {
    if let Value::Box(tensor) = observation {
        if let (TensorData::Uint8(bytes), false) = (tensor.data(), tensor.shape().is_empty()) {
            let mut payload = Vec::with_capacity(4 * (1 + tensor.shape().len()) + bytes.len());
            payload.extend_from_slice(&wire_u32(tensor.shape().len())?.to_le_bytes());
            for dim in tensor.shape() {
                payload.extend_from_slice(&wire_u32(*dim)?.to_le_bytes());
            }
            payload.extend_from_slice(bytes);
            write_byte(writer, OBS_UINT8)?;
            write_field(writer, &payload)?;
            return Ok(());
        }
    }

    let json = space.to_jsonable(observation).map_err(env_space_error)?;
    write_byte(writer, OBS_JSON)?;
    write_field_str(writer, &json.to_string())?;
    Ok(())
}

/// Read an observation envelope against the observation space.
///
/// Binary observations must have at least one dimension and exactly as many
/// bytes as the dimensions describe.
pub fn read_observation(reader: &mut impl Read, space: &Space) -> Result<Value, ProtocolError> {
    match read_byte(reader)? {
        OBS_JSON => {
            let text = read_field_str(reader)?;
            let json: Json = serde_json::from_str(&text)
                .map_err(|e| ProtocolError::InvalidObservation(e.into()))?;
            space
                .from_jsonable(&json)
                .map_err(ProtocolError::InvalidObservation)
        }
        OBS_UINT8 => {
            let payload = read_field(reader)?;
            decode_uint8(&payload)
                .map(Value::Box)
                .map_err(ProtocolError::InvalidObservation)
        }
        other => Err(ProtocolError::UnknownObservationType(other)),
    }
}

fn decode_uint8(payload: &[u8]) -> Result<Tensor, SpaceError> {
    let short = || SpaceError::InvalidDefinition("binary observation is truncated".into());
    let word = |i: usize| -> Result<usize, SpaceError> {
        let bytes = payload.get(i * 4..i * 4 + 4).ok_or_else(short)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(buf) as usize)
    };

    let dim_count = word(0)?;
    if dim_count == 0 {
        return Err(SpaceError::InvalidDefinition(
            "binary observation has no dimensions".into(),
        ));
    }
    let shape = (1..=dim_count).map(word).collect::<Result<Vec<_>, _>>()?;
    let raw = payload.get(4 * (dim_count + 1)..).ok_or_else(short)?;

    let expected = shape
        .iter()
        .try_fold(1usize, |acc, d| acc.checked_mul(*d))
        .ok_or_else(|| SpaceError::InvalidDefinition("binary observation is too large".into()))?;
    if raw.len() != expected {
        return Err(SpaceError::LengthMismatch {
            expected,
            got: raw.len(),
        });
    }
    Tensor::uint8(shape, raw.to_vec())
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Read an action envelope and decode it against the action space.
pub fn read_action(reader: &mut impl Read, space: &Space) -> Result<Value, ProtocolError> {
    let tag = read_byte(reader)?;
    if tag != ACTION_JSON {
        return Err(ProtocolError::UnknownActionType(tag));
    }
    let text = read_field_str(reader)?;
    let json: Json =
        serde_json::from_str(&text).map_err(|e| ProtocolError::InvalidAction(e.into()))?;
    space
        .from_jsonable(&json)
        .map_err(ProtocolError::InvalidAction)
}

/// Write an action envelope.
pub fn write_action(
    writer: &mut impl Write,
    space: &Space,
    action: &Value,
) -> Result<(), ProtocolError> {
    let json = space.to_jsonable(action).map_err(env_space_error)?;
    write_action_json(writer, &json)
}

/// Write an action envelope from an already jsonable action.
pub fn write_action_json(writer: &mut impl Write, action: &Json) -> Result<(), ProtocolError> {
    write_byte(writer, ACTION_JSON)?;
    write_field_str(writer, &action.to_string())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Step results
// ---------------------------------------------------------------------------

/// Write observation, reward, done and metadata.
///
/// Metadata that cannot be represented as JSON is replaced as a whole by
/// [`EMPTY_INFO`]; the rest of the response is unaffected.
pub fn write_step(
    writer: &mut impl Write,
    space: &Space,
    step: &StepResult,
) -> Result<(), ProtocolError> {
    let info = info_to_json(&step.info).unwrap_or_else(|e| {
        warn!(error = %e, "step metadata is not representable as JSON, sending {EMPTY_INFO}");
        EMPTY_INFO.to_owned()
    });
    write_observation(writer, space, &step.observation)?;
    write_f64(writer, step.reward)?;
    write_bool(writer, step.done)?;
    write_field_str(writer, &info)?;
    Ok(())
}

/// Client view of a step response.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReply {
    pub observation: Value,
    pub reward: f64,
    pub done: bool,
    pub info: Json,
}

pub fn read_step(reader: &mut impl Read, space: &Space) -> Result<StepReply, ProtocolError> {
    let observation = read_observation(reader, space)?;
    let reward = read_f64(reader)?;
    let done = read_bool(reader)?;
    let text = read_field_str(reader)?;
    let info = serde_json::from_str(&text)
        .map_err(|e| ProtocolError::MalformedResponse(format!("step metadata: {e}")))?;
    Ok(StepReply {
        observation,
        reward,
        done,
        info,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
