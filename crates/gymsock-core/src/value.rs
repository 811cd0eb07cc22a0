//! Native values drawn from a [`Space`](crate::space::Space).
//!
//! A [`Value`] is what environments consume as actions and produce as
//! observations. Box values are dense row-major [`Tensor`]s that keep their
//! element type, so `uint8` image observations can take the binary fast path
//! on the wire.

use serde::{Deserialize, Serialize};

use crate::error::SpaceError;

// ---------------------------------------------------------------------------
// Dtype
// ---------------------------------------------------------------------------

/// Element type of a Box space or tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    #[default]
    Float64,
    Uint8,
}

impl Dtype {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float64 => "float64",
            Self::Uint8 => "uint8",
        }
    }
}

/// Number of elements described by a shape. The empty shape is a scalar.
///
/// Shapes from the wire can be arbitrary, so an overflowing product is an
/// error rather than a wrapped count.
pub fn element_count(shape: &[usize]) -> Result<usize, SpaceError> {
    if shape.contains(&0) {
        return Ok(0);
    }
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| {
            SpaceError::InvalidDefinition(format!("shape {shape:?} has too many elements"))
        })
}

// ---------------------------------------------------------------------------
// Tensor
// ---------------------------------------------------------------------------

/// Flat storage of a tensor, tagged by element type.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Float64(Vec<f64>),
    Uint8(Vec<u8>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            Self::Float64(v) => v.len(),
            Self::Uint8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn dtype(&self) -> Dtype {
        match self {
            Self::Float64(_) => Dtype::Float64,
            Self::Uint8(_) => Dtype::Uint8,
        }
    }
}

/// Dense row-major tensor with an explicit shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// Build a tensor, checking that `data` holds exactly one element per
    /// position of `shape`.
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self, SpaceError> {
        let expected = element_count(&shape)?;
        if data.len() != expected {
            return Err(SpaceError::LengthMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn float64(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, SpaceError> {
        Self::new(shape, TensorData::Float64(data))
    }

    pub fn uint8(shape: Vec<usize>, data: Vec<u8>) -> Result<Self, SpaceError> {
        Self::new(shape, TensorData::Uint8(data))
    }

    /// A zero-dimensional float tensor.
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: TensorData::Float64(vec![value]),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub const fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    pub const fn dtype(&self) -> Dtype {
        self.data.dtype()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.data {
            TensorData::Float64(v) => Some(v),
            TensorData::Uint8(_) => None,
        }
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.data {
            TensorData::Uint8(v) => Some(v),
            TensorData::Float64(_) => None,
        }
    }

    /// Element `i` widened to `f64`.
    pub fn get(&self, i: usize) -> Option<f64> {
        match &self.data {
            TensorData::Float64(v) => v.get(i).copied(),
            TensorData::Uint8(v) => v.get(i).map(|b| f64::from(*b)),
        }
    }

    /// Same shape, every element widened to `f64`.
    pub fn to_float64(&self) -> Self {
        let data = match &self.data {
            TensorData::Float64(v) => v.clone(),
            TensorData::Uint8(v) => v.iter().map(|b| f64::from(*b)).collect(),
        };
        Self {
            shape: self.shape.clone(),
            data: TensorData::Float64(data),
        }
    }

    /// Same shape with `uint8` storage. Every element must be a whole
    /// number in `0..=255`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_uint8(&self) -> Result<Self, SpaceError> {
        let data = match &self.data {
            TensorData::Uint8(v) => v.clone(),
            TensorData::Float64(v) => v
                .iter()
                .map(|x| {
                    if x.fract() == 0.0 && (0.0..=255.0).contains(x) {
                        Ok(*x as u8)
                    } else {
                        Err(SpaceError::OutOfRange(format!("{x} is not a byte")))
                    }
                })
                .collect::<Result<_, _>>()?,
        };
        Ok(Self {
            shape: self.shape.clone(),
            data: TensorData::Uint8(data),
        })
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// An element of a space: an action or an observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Box(Tensor),
    Discrete(u64),
    /// One byte per bit, each 0 or 1.
    MultiBinary(Vec<u8>),
    MultiDiscrete(Vec<i64>),
    Tuple(Vec<Value>),
}

impl Value {
    /// Name of the space kind this value belongs to.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Box(_) => "Box",
            Self::Discrete(_) => "Discrete",
            Self::MultiBinary(_) => "MultiBinary",
            Self::MultiDiscrete(_) => "MultiDiscrete",
            Self::Tuple(_) => "Tuple",
        }
    }

    pub const fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Box(t) => Some(t),
            _ => None,
        }
    }

    pub const fn as_discrete(&self) -> Option<u64> {
        match self {
            Self::Discrete(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<Tensor> for Value {
    fn from(tensor: Tensor) -> Self {
        Self::Box(tensor)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
