//! Action and observation spaces.
//!
//! [`Space`] is a closed tagged union with one case per kind. Its serde
//! representation *is* the wire descriptor:
//!
//! ```text
//! {"type":"Box","shape":[2],"low":[-1.0,-1.0],"high":[1.0,1.0]}
//! {"type":"Discrete","n":4}
//! {"type":"MultiBinary","n":3}
//! {"type":"MultiDiscrete","low":[0,0],"high":[4,1]}
//! {"type":"Tuple","subspaces":[...]}
//! ```
//!
//! Box bounds are clamped to `±MAX_BOUND` when serialized because JSON has no
//! representation for infinity. The element type of a Box is native-only and
//! is not part of the descriptor.
//!
//! Values cross the wire in their *jsonable* form (see
//! [`Space::to_jsonable`] / [`Space::from_jsonable`]), which are exact
//! inverses of each other for every kind.

use rand::Rng;
use rand_distr::{Exp1, StandardNormal};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as Json;

use crate::error::SpaceError;
use crate::value::{Dtype, Tensor, TensorData, Value, element_count};

/// Largest bound magnitude written into a descriptor.
pub const MAX_BOUND: f64 = 1e30;

/// Clamp a bound to the representable range `[-MAX_BOUND, MAX_BOUND]`.
pub fn clamp_bound(bound: f64) -> f64 {
    bound.clamp(-MAX_BOUND, MAX_BOUND)
}

fn serialize_clamped<S: Serializer>(bounds: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(bounds.iter().map(|b| clamp_bound(*b)))
}

// ---------------------------------------------------------------------------
// BoxSpace
// ---------------------------------------------------------------------------

/// Continuous (or byte-valued) space with per-element bounds.
///
/// Bounds are stored flattened in row-major order and may be infinite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    shape: Vec<usize>,
    #[serde(serialize_with = "serialize_clamped")]
    low: Vec<f64>,
    #[serde(serialize_with = "serialize_clamped")]
    high: Vec<f64>,
    #[serde(skip)]
    dtype: Dtype,
}

impl BoxSpace {
    /// A `float64` box with explicit flattened bounds.
    pub fn new(shape: Vec<usize>, low: Vec<f64>, high: Vec<f64>) -> Result<Self, SpaceError> {
        let space = Self {
            shape,
            low,
            high,
            dtype: Dtype::Float64,
        };
        space.validate()?;
        Ok(space)
    }

    /// A `float64` box where every element shares the same bounds.
    pub fn uniform(shape: Vec<usize>, low: f64, high: f64) -> Result<Self, SpaceError> {
        let len = element_count(&shape)?;
        Self::new(shape, vec![low; len], vec![high; len])
    }

    /// A `uint8` box spanning `0..=255`, typically an image.
    pub fn image(shape: Vec<usize>) -> Result<Self, SpaceError> {
        let len = element_count(&shape)?;
        Ok(Self {
            shape,
            low: vec![0.0; len],
            high: vec![255.0; len],
            dtype: Dtype::Uint8,
        })
    }

    /// Re-type the box, re-validating the bounds for the new element type.
    pub fn with_dtype(mut self, dtype: Dtype) -> Result<Self, SpaceError> {
        self.dtype = dtype;
        self.validate()?;
        Ok(self)
    }

    /// Same bounds with `float64` elements.
    pub fn to_float64(&self) -> Self {
        Self {
            dtype: Dtype::Float64,
            ..self.clone()
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn low(&self) -> &[f64] {
        &self.low
    }

    pub fn high(&self) -> &[f64] {
        &self.high
    }

    pub const fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Copy with every bound clamped to `±MAX_BOUND`, i.e. the box as a
    /// client sees it after a descriptor round trip.
    pub fn clamped(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            low: self.low.iter().map(|b| clamp_bound(*b)).collect(),
            high: self.high.iter().map(|b| clamp_bound(*b)).collect(),
            dtype: self.dtype,
        }
    }

    fn validate(&self) -> Result<(), SpaceError> {
        if self.low.len() != self.high.len() {
            return Err(SpaceError::DimensionMismatch {
                low: self.low.len(),
                high: self.high.len(),
            });
        }
        let expected = element_count(&self.shape)?;
        if self.low.len() != expected {
            return Err(SpaceError::BoundsShapeMismatch {
                shape: self.shape.clone(),
                expected,
                got: self.low.len(),
            });
        }
        for (i, (l, h)) in self.low.iter().zip(&self.high).enumerate() {
            if l.is_nan() || h.is_nan() || l > h {
                return Err(SpaceError::InvalidDefinition(format!(
                    "Box bound {i} is empty: low={l}, high={h}"
                )));
            }
            if self.dtype == Dtype::Uint8 && byte_range(*l, *h).is_none() {
                return Err(SpaceError::InvalidDefinition(format!(
                    "uint8 Box bound {i} contains no byte: low={l}, high={h}"
                )));
            }
        }
        Ok(())
    }

    fn contains(&self, tensor: &Tensor) -> bool {
        if tensor.shape() != self.shape.as_slice() {
            return false;
        }
        if self.dtype == Dtype::Uint8 && tensor.dtype() != Dtype::Uint8 {
            return false;
        }
        (0..tensor.len()).all(|i| {
            let (Some(v), Some(l), Some(h)) = (tensor.get(i), self.low.get(i), self.high.get(i))
            else {
                return false;
            };
            v >= *l && v <= *h
        })
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Tensor, SpaceError> {
        let bounds = self.low.iter().zip(&self.high);
        let data = match self.dtype {
            Dtype::Float64 => {
                TensorData::Float64(bounds.map(|(l, h)| sample_float(*l, *h, rng)).collect())
            }
            Dtype::Uint8 => TensorData::Uint8(
                bounds
                    .map(|(l, h)| {
                        let (lo, hi) = byte_range(*l, *h).ok_or_else(|| {
                            SpaceError::InvalidDefinition(format!(
                                "uint8 Box bound contains no byte: low={l}, high={h}"
                            ))
                        })?;
                        Ok(rng.gen_range(lo..=hi))
                    })
                    .collect::<Result<_, SpaceError>>()?,
            ),
        };
        Tensor::new(self.shape.clone(), data)
    }
}

/// Integer byte range `[lo, hi]` covered by float bounds, if non-empty.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn byte_range(low: f64, high: f64) -> Option<(u8, u8)> {
    let lo = low.max(0.0).ceil();
    let hi = high.min(255.0).floor();
    (lo <= hi).then(|| (lo as u8, hi as u8))
}

fn sample_float<R: Rng + ?Sized>(low: f64, high: f64, rng: &mut R) -> f64 {
    match (low.is_finite(), high.is_finite()) {
        (true, true) if (high - low).is_finite() => {
            if low < high {
                rng.gen_range(low..=high)
            } else {
                low
            }
        }
        (true, false) => low + rng.sample::<f64, _>(Exp1),
        (false, true) => high - rng.sample::<f64, _>(Exp1),
        _ => rng.sample::<f64, _>(StandardNormal).clamp(low, high),
    }
}

// ---------------------------------------------------------------------------
// Space
// ---------------------------------------------------------------------------

/// Domain of valid actions or observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Space {
    Box(BoxSpace),
    /// Single integer in `[0, n)`.
    Discrete { n: u64 },
    /// `n` independent bits.
    MultiBinary { n: usize },
    /// Integers each bounded by an inclusive `[low, high]` pair.
    MultiDiscrete { low: Vec<i64>, high: Vec<i64> },
    /// Fixed-length heterogeneous composition.
    Tuple { subspaces: Vec<Space> },
}

impl Space {
    pub const fn discrete(n: u64) -> Self {
        Self::Discrete { n }
    }

    pub const fn multi_binary(n: usize) -> Self {
        Self::MultiBinary { n }
    }

    pub fn multi_discrete(low: Vec<i64>, high: Vec<i64>) -> Result<Self, SpaceError> {
        let space = Self::MultiDiscrete { low, high };
        space.validate()?;
        Ok(space)
    }

    pub const fn tuple(subspaces: Vec<Self>) -> Self {
        Self::Tuple { subspaces }
    }

    /// Name of this kind as written in the descriptor's `type` field.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Box(_) => "Box",
            Self::Discrete { .. } => "Discrete",
            Self::MultiBinary { .. } => "MultiBinary",
            Self::MultiDiscrete { .. } => "MultiDiscrete",
            Self::Tuple { .. } => "Tuple",
        }
    }

    /// Check structural invariants, recursing into tuples.
    pub fn validate(&self) -> Result<(), SpaceError> {
        match self {
            Self::Box(b) => b.validate(),
            Self::Discrete { n } => {
                if *n == 0 {
                    return Err(SpaceError::InvalidDefinition(
                        "Discrete space needs n >= 1".into(),
                    ));
                }
                Ok(())
            }
            Self::MultiBinary { .. } => Ok(()),
            Self::MultiDiscrete { low, high } => {
                if low.len() != high.len() {
                    return Err(SpaceError::DimensionMismatch {
                        low: low.len(),
                        high: high.len(),
                    });
                }
                if let Some(i) = low.iter().zip(high).position(|(l, h)| l > h) {
                    return Err(SpaceError::InvalidDefinition(format!(
                        "MultiDiscrete element {i} is empty"
                    )));
                }
                Ok(())
            }
            Self::Tuple { subspaces } => subspaces.iter().try_for_each(Self::validate),
        }
    }

    // ---- Descriptor codec ----

    /// Compact JSON descriptor, bounds clamped to `±MAX_BOUND`.
    pub fn to_json(&self) -> Result<String, SpaceError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and validate a JSON descriptor.
    pub fn from_json(json: &str) -> Result<Self, SpaceError> {
        let space: Self = serde_json::from_str(json)?;
        space.validate()?;
        Ok(space)
    }

    /// The same space with Box bounds clamped, i.e. what
    /// `from_json(to_json(space))` yields.
    pub fn clamped(&self) -> Self {
        match self {
            Self::Box(b) => Self::Box(b.clamped()),
            Self::Tuple { subspaces } => Self::Tuple {
                subspaces: subspaces.iter().map(Self::clamped).collect(),
            },
            other => other.clone(),
        }
    }

    // ---- Value codec ----

    /// Convert a value of this space to its jsonable form.
    ///
    /// A `uint8` box only encodes byte tensors, and float elements must be
    /// finite: anything else could not be decoded again by
    /// [`Space::from_jsonable`].
    pub fn to_jsonable(&self, value: &Value) -> Result<Json, SpaceError> {
        match (self, value) {
            (Self::Box(space), Value::Box(tensor)) => {
                if tensor.shape() != space.shape() {
                    return Err(SpaceError::ShapeMismatch {
                        expected: space.shape().to_vec(),
                        got: tensor.shape().to_vec(),
                    });
                }
                if space.dtype() == Dtype::Uint8 && tensor.dtype() != Dtype::Uint8 {
                    return Err(SpaceError::TypeMismatch {
                        expected: "uint8 tensor".into(),
                        got: format!("{} tensor", tensor.dtype().name()),
                    });
                }
                match tensor.data() {
                    TensorData::Float64(v) => {
                        if let Some((i, x)) = v.iter().enumerate().find(|(_, x)| !x.is_finite()) {
                            return Err(SpaceError::OutOfRange(format!(
                                "Box element {i} is {x}, which JSON cannot represent"
                            )));
                        }
                        Ok(nest(tensor.shape(), 0, &|i| float_json(v[i])))
                    }
                    TensorData::Uint8(v) => Ok(nest(tensor.shape(), 0, &|i| Json::from(v[i]))),
                }
            }
            (Self::Discrete { .. }, Value::Discrete(v)) => Ok(Json::from(*v)),
            (Self::MultiBinary { n }, Value::MultiBinary(bits)) => {
                check_len(*n, bits.len())?;
                Ok(Json::Array(bits.iter().map(|b| Json::from(*b)).collect()))
            }
            (Self::MultiDiscrete { low, .. }, Value::MultiDiscrete(v)) => {
                check_len(low.len(), v.len())?;
                Ok(Json::Array(v.iter().map(|x| Json::from(*x)).collect()))
            }
            (Self::Tuple { subspaces }, Value::Tuple(items)) => {
                check_len(subspaces.len(), items.len())?;
                subspaces
                    .iter()
                    .zip(items)
                    .map(|(space, item)| space.to_jsonable(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Json::Array)
            }
            _ => Err(SpaceError::TypeMismatch {
                expected: self.kind().into(),
                got: value.kind().into(),
            }),
        }
    }

    /// Decode a jsonable value into a native value of this space.
    ///
    /// Checks structure (kind, shape, length) and integer domains. Float box
    /// elements are not bounds-checked.
    pub fn from_jsonable(&self, json: &Json) -> Result<Value, SpaceError> {
        match self {
            Self::Box(space) => {
                let mut leaves = Vec::with_capacity(element_count(space.shape()).unwrap_or(0));
                flatten(space.shape(), json, &mut leaves).map_err(|_| {
                    SpaceError::ShapeMismatch {
                        expected: space.shape().to_vec(),
                        got: json_shape(json),
                    }
                })?;
                let data = match space.dtype() {
                    Dtype::Float64 => TensorData::Float64(
                        leaves
                            .iter()
                            .map(|leaf| {
                                leaf.as_f64()
                                    .ok_or_else(|| SpaceError::type_mismatch("number", leaf))
                            })
                            .collect::<Result<_, _>>()?,
                    ),
                    Dtype::Uint8 => TensorData::Uint8(
                        leaves.iter().map(|leaf| json_byte(leaf)).collect::<Result<_, _>>()?,
                    ),
                };
                Ok(Value::Box(Tensor::new(space.shape().to_vec(), data)?))
            }
            Self::Discrete { n } => {
                let v = json_integer(json)?;
                u64::try_from(v)
                    .ok()
                    .filter(|v| v < n)
                    .map(Value::Discrete)
                    .ok_or_else(|| SpaceError::OutOfRange(format!("{v} not in [0, {n})")))
            }
            Self::MultiBinary { n } => {
                let items = json_array(json, *n)?;
                items
                    .iter()
                    .map(|item| match json_integer(item)? {
                        0 => Ok(0),
                        1 => Ok(1),
                        other => Err(SpaceError::OutOfRange(format!("{other} is not a bit"))),
                    })
                    .collect::<Result<_, _>>()
                    .map(Value::MultiBinary)
            }
            Self::MultiDiscrete { low, high } => {
                let items = json_array(json, low.len())?;
                items
                    .iter()
                    .zip(low.iter().zip(high))
                    .map(|(item, (l, h))| {
                        let v = json_integer(item)?;
                        if v < *l || v > *h {
                            return Err(SpaceError::OutOfRange(format!(
                                "{v} not in [{l}, {h}]"
                            )));
                        }
                        Ok(v)
                    })
                    .collect::<Result<_, _>>()
                    .map(Value::MultiDiscrete)
            }
            Self::Tuple { subspaces } => {
                let items = json_array(json, subspaces.len())?;
                subspaces
                    .iter()
                    .zip(items)
                    .map(|(space, item)| space.from_jsonable(item))
                    .collect::<Result<_, _>>()
                    .map(Value::Tuple)
            }
        }
    }

    // ---- Membership and sampling ----

    /// Whether `value` is an element of this space, bounds included.
    pub fn contains(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Box(space), Value::Box(tensor)) => space.contains(tensor),
            (Self::Discrete { n }, Value::Discrete(v)) => v < n,
            (Self::MultiBinary { n }, Value::MultiBinary(bits)) => {
                bits.len() == *n && bits.iter().all(|b| *b <= 1)
            }
            (Self::MultiDiscrete { low, high }, Value::MultiDiscrete(v)) => {
                v.len() == low.len()
                    && v.iter()
                        .zip(low.iter().zip(high))
                        .all(|(x, (l, h))| x >= l && x <= h)
            }
            (Self::Tuple { subspaces }, Value::Tuple(items)) => {
                subspaces.len() == items.len()
                    && subspaces.iter().zip(items).all(|(s, v)| s.contains(v))
            }
            _ => false,
        }
    }

    /// Draw a random element. Takes `&mut impl Rng` for determinism.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Value, SpaceError> {
        match self {
            Self::Box(space) => space.sample(rng).map(Value::Box),
            Self::Discrete { n } => {
                if *n == 0 {
                    return Err(SpaceError::InvalidDefinition(
                        "cannot sample from Discrete(0)".into(),
                    ));
                }
                Ok(Value::Discrete(rng.gen_range(0..*n)))
            }
            Self::MultiBinary { n } => Ok(Value::MultiBinary(
                (0..*n).map(|_| u8::from(rng.gen_bool(0.5))).collect(),
            )),
            Self::MultiDiscrete { low, high } => low
                .iter()
                .zip(high)
                .map(|(l, h)| {
                    if l > h {
                        return Err(SpaceError::InvalidDefinition(format!(
                            "cannot sample from empty range [{l}, {h}]"
                        )));
                    }
                    Ok(rng.gen_range(*l..=*h))
                })
                .collect::<Result<_, _>>()
                .map(Value::MultiDiscrete),
            Self::Tuple { subspaces } => subspaces
                .iter()
                .map(|s| s.sample(rng))
                .collect::<Result<_, _>>()
                .map(Value::Tuple),
        }
    }
}

impl From<BoxSpace> for Space {
    fn from(space: BoxSpace) -> Self {
        Self::Box(space)
    }
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

/// Build nested arrays following `shape`, reading leaves by flat index.
fn nest(shape: &[usize], offset: usize, leaf: &dyn Fn(usize) -> Json) -> Json {
    match shape.split_first() {
        None => leaf(offset),
        Some((&dim, rest)) => {
            // only reached for shapes whose full count fits
            let stride = element_count(rest).unwrap_or(0);
            Json::Array(
                (0..dim)
                    .map(|i| nest(rest, offset + i * stride, leaf))
                    .collect(),
            )
        }
    }
}

/// Collect leaves of nested arrays that exactly follow `shape`.
fn flatten<'a>(shape: &[usize], json: &'a Json, out: &mut Vec<&'a Json>) -> Result<(), ()> {
    match shape.split_first() {
        None => {
            if json.is_array() {
                return Err(());
            }
            out.push(json);
            Ok(())
        }
        Some((&dim, rest)) => match json {
            Json::Array(items) if items.len() == dim => {
                items.iter().try_for_each(|item| flatten(rest, item, out))
            }
            _ => Err(()),
        },
    }
}

/// Shape of a nested array, following first elements.
fn json_shape(json: &Json) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut cursor = json;
    while let Json::Array(items) = cursor {
        shape.push(items.len());
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }
    shape
}

fn float_json(v: f64) -> Json {
    serde_json::Number::from_f64(v).map_or(Json::Null, Json::Number)
}

fn json_integer(json: &Json) -> Result<i64, SpaceError> {
    json.as_i64()
        .ok_or_else(|| SpaceError::type_mismatch("integer", json))
}

fn json_byte(json: &Json) -> Result<u8, SpaceError> {
    let v = json_integer(json)?;
    u8::try_from(v).map_err(|_| SpaceError::OutOfRange(format!("{v} is not a byte")))
}

fn json_array(json: &Json, expected: usize) -> Result<&[Json], SpaceError> {
    let items = json
        .as_array()
        .ok_or_else(|| SpaceError::type_mismatch("array", json))?;
    check_len(expected, items.len())?;
    Ok(items)
}

const fn check_len(expected: usize, got: usize) -> Result<(), SpaceError> {
    if expected == got {
        Ok(())
    } else {
        Err(SpaceError::LengthMismatch { expected, got })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    use super::*;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    fn nested_space() -> Space {
        Space::tuple(vec![
            Space::discrete(3),
            BoxSpace::uniform(vec![2, 2], -1.0, 1.0).unwrap().into(),
            Space::tuple(vec![
                Space::multi_binary(4),
                Space::multi_discrete(vec![0, -2], vec![4, 2]).unwrap(),
            ]),
        ])
    }

    // ---- Descriptor codec ----

    #[test]
    fn discrete_descriptor_is_type_first() {
        assert_eq!(
            Space::discrete(4).to_json().unwrap(),
            r#"{"type":"Discrete","n":4}"#
        );
    }

    #[test]
    fn box_descriptor_clamps_infinite_bounds() {
        let space: Space = BoxSpace::new(vec![2], vec![f64::NEG_INFINITY, 0.0], vec![1.0, f64::INFINITY])
            .unwrap()
            .into();
        let json: Json = serde_json::from_str(&space.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            json!({"type": "Box", "shape": [2], "low": [-1e30, 0.0], "high": [1.0, 1e30]})
        );
    }

    #[test]
    fn descriptor_roundtrip_matches_clamped_space() {
        let space = Space::tuple(vec![
            BoxSpace::uniform(vec![3], f64::NEG_INFINITY, f64::INFINITY)
                .unwrap()
                .into(),
            nested_space(),
        ]);
        let parsed = Space::from_json(&space.to_json().unwrap()).unwrap();
        assert_eq!(parsed, space.clamped());
    }

    #[test]
    fn tuple_descriptor_is_element_wise() {
        let space = Space::tuple(vec![Space::discrete(2), Space::multi_binary(3)]);
        let json: Json = serde_json::from_str(&space.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            json!({"type": "Tuple", "subspaces": [
                {"type": "Discrete", "n": 2},
                {"type": "MultiBinary", "n": 3}
            ]})
        );
    }

    #[test]
    fn multi_discrete_descriptor() {
        let space = Space::multi_discrete(vec![0, 1], vec![4, 2]).unwrap();
        assert_eq!(
            space.to_json().unwrap(),
            r#"{"type":"MultiDiscrete","low":[0,1],"high":[4,2]}"#
        );
    }

    #[test]
    fn parsed_box_defaults_to_float64() {
        let space = Space::from_json(r#"{"type":"Box","shape":[1],"low":[0],"high":[255]}"#).unwrap();
        let Space::Box(b) = space else {
            panic!("expected Box");
        };
        assert_eq!(b.dtype(), Dtype::Float64);
        assert_eq!(b.high(), &[255.0]);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = Space::from_json(r#"{"type":"Dict","spaces":{}}"#).unwrap_err();
        assert!(matches!(err, SpaceError::Json(_)));
    }

    #[test]
    fn box_bounds_must_match_shape() {
        let err = Space::from_json(r#"{"type":"Box","shape":[2,2],"low":[0,0],"high":[1,1]}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            SpaceError::BoundsShapeMismatch {
                expected: 4,
                got: 2,
                ..
            }
        ));
    }

    #[test]
    fn validation_rejects_empty_domains() {
        assert!(Space::discrete(0).validate().is_err());
        assert!(Space::multi_discrete(vec![3], vec![1]).is_err());
        assert!(BoxSpace::new(vec![1], vec![2.0], vec![1.0]).is_err());
        assert!(
            BoxSpace::uniform(vec![1], 0.2, 0.8)
                .unwrap()
                .with_dtype(Dtype::Uint8)
                .is_err()
        );
    }

    // ---- Value codec ----

    #[test]
    fn box_jsonable_is_nested() {
        let space: Space = BoxSpace::uniform(vec![2, 3], 0.0, 10.0).unwrap().into();
        let value = Value::Box(
            Tensor::float64(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
        );
        assert_eq!(
            space.to_jsonable(&value).unwrap(),
            json!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]])
        );
    }

    #[test]
    fn scalar_box_jsonable_is_a_number() {
        let space: Space = BoxSpace::uniform(vec![], -1.0, 1.0).unwrap().into();
        let value = Value::Box(Tensor::scalar(0.25));
        let json = space.to_jsonable(&value).unwrap();
        assert_eq!(json, json!(0.25));
        assert_eq!(space.from_jsonable(&json).unwrap(), value);
    }

    #[test]
    fn nested_tuple_jsonable_roundtrip() {
        let space = nested_space();
        let json = json!([2, [[0.5, -0.5], [0.0, 1.0]], [[1, 0, 0, 1], [3, -2]]]);
        let value = space.from_jsonable(&json).unwrap();
        assert_eq!(space.to_jsonable(&value).unwrap(), json);
    }

    #[test]
    fn sampled_values_roundtrip_through_jsonable() {
        let space = Space::tuple(vec![
            nested_space(),
            BoxSpace::image(vec![2, 2, 3]).unwrap().into(),
        ]);
        let mut rng = rng();
        for _ in 0..20 {
            let value = space.sample(&mut rng).unwrap();
            let json = space.to_jsonable(&value).unwrap();
            assert_eq!(space.from_jsonable(&json).unwrap(), value);
        }
    }

    #[test]
    fn wrong_box_shape_is_rejected() {
        let space: Space = BoxSpace::uniform(vec![2, 2], -1.0, 1.0).unwrap().into();
        let err = space.from_jsonable(&json!([1.0, 2.0, 3.0, 4.0])).unwrap_err();
        assert!(matches!(
            err,
            SpaceError::ShapeMismatch { ref expected, ref got } if expected == &[2, 2] && got == &[4]
        ));
    }

    #[test]
    fn discrete_out_of_range_is_rejected() {
        let space = Space::discrete(4);
        assert!(matches!(
            space.from_jsonable(&json!(4)).unwrap_err(),
            SpaceError::OutOfRange(_)
        ));
        assert!(matches!(
            space.from_jsonable(&json!(-1)).unwrap_err(),
            SpaceError::OutOfRange(_)
        ));
        assert!(matches!(
            space.from_jsonable(&json!("1")).unwrap_err(),
            SpaceError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn image_elements_must_be_bytes() {
        let space: Space = BoxSpace::image(vec![2]).unwrap().into();
        assert!(space.from_jsonable(&json!([0, 256])).is_err());
        assert!(space.from_jsonable(&json!([0.5, 1])).is_err());
        assert_eq!(
            space.from_jsonable(&json!([0, 255])).unwrap(),
            Value::Box(Tensor::uint8(vec![2], vec![0, 255]).unwrap())
        );
    }

    #[test]
    fn multi_binary_rejects_non_bits() {
        let space = Space::multi_binary(2);
        assert!(space.from_jsonable(&json!([0, 2])).is_err());
        assert!(space.from_jsonable(&json!([0])).is_err());
    }

    #[test]
    fn float_tensor_does_not_encode_as_image() {
        let space: Space = BoxSpace::image(vec![2]).unwrap().into();
        let floats = Value::Box(Tensor::float64(vec![2], vec![3.0, 4.0]).unwrap());
        assert!(matches!(
            space.to_jsonable(&floats).unwrap_err(),
            SpaceError::TypeMismatch { .. }
        ));

        // widening the other way is fine
        let wide: Space = BoxSpace::uniform(vec![2], 0.0, 255.0).unwrap().into();
        let bytes = Value::Box(Tensor::uint8(vec![2], vec![3, 4]).unwrap());
        assert_eq!(wide.to_jsonable(&bytes).unwrap(), json!([3, 4]));
    }

    #[test]
    fn non_finite_elements_are_not_encoded() {
        let space: Space = BoxSpace::uniform(vec![2], f64::NEG_INFINITY, f64::INFINITY)
            .unwrap()
            .into();
        for bad in [f64::NAN, f64::INFINITY] {
            let value = Value::Box(Tensor::float64(vec![2], vec![0.0, bad]).unwrap());
            assert!(matches!(
                space.to_jsonable(&value).unwrap_err(),
                SpaceError::OutOfRange(_)
            ));
        }
    }

    #[test]
    fn overflowing_box_descriptor_is_rejected() {
        let err = Space::from_json(
            r#"{"type":"Box","shape":[4294967296,4294967296],"low":[],"high":[]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SpaceError::InvalidDefinition(_)));
    }

    #[test]
    fn to_jsonable_rejects_kind_mismatch() {
        let err = Space::discrete(2)
            .to_jsonable(&Value::MultiBinary(vec![1]))
            .unwrap_err();
        assert!(matches!(err, SpaceError::TypeMismatch { .. }));
    }

    // ---- Sampling ----

    #[test]
    fn samples_are_contained() {
        let space = Space::tuple(vec![
            nested_space(),
            BoxSpace::image(vec![4, 4, 3]).unwrap().into(),
            BoxSpace::new(
                vec![3],
                vec![f64::NEG_INFINITY, 0.0, f64::NEG_INFINITY],
                vec![f64::INFINITY, f64::INFINITY, 0.0],
            )
            .unwrap()
            .into(),
        ]);
        let mut rng = rng();
        for _ in 0..100 {
            let value = space.sample(&mut rng).unwrap();
            assert!(space.contains(&value), "{value:?} not in space");
        }
    }

    #[test]
    fn discrete_sample_in_range() {
        let space = Space::discrete(4);
        let mut rng = rng();
        for _ in 0..50 {
            let v = space.sample(&mut rng).unwrap().as_discrete().unwrap();
            assert!(v < 4);
        }
    }

    #[test]
    fn sampling_degenerate_discrete_is_an_error() {
        assert!(Space::Discrete { n: 0 }.sample(&mut rng()).is_err());
    }

    #[test]
    fn contains_checks_bounds() {
        let space: Space = BoxSpace::uniform(vec![2], -1.0, 1.0).unwrap().into();
        let inside = Value::Box(Tensor::float64(vec![2], vec![0.0, 1.0]).unwrap());
        let outside = Value::Box(Tensor::float64(vec![2], vec![0.0, 1.5]).unwrap());
        assert!(space.contains(&inside));
        assert!(!space.contains(&outside));
        assert!(!space.contains(&Value::Discrete(0)));
    }
}
