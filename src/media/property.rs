use std::str::FromStr;

use crate::foundation::error::{VnmarkError, VnmarkResult};

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
/// Value of an element property as the script layer sees it.
pub enum PropertyValue {
    /// Scalar such as a volume or alpha.
    Number(f64),
    /// Flag such as `loop`.
    Bool(bool),
}

impl PropertyValue {
    /// Interpret as a finite number, failing for flags, NaN and infinities.
    pub fn as_number(self, name: &str) -> VnmarkResult<f64> {
        match self {
            Self::Number(v) if v.is_finite() => Ok(v),
            Self::Number(v) => Err(VnmarkError::property(format!(
                "property \"{name}\" expects a finite number, got {v}"
            ))),
            Self::Bool(_) => Err(VnmarkError::property(format!(
                "property \"{name}\" expects a number"
            ))),
        }
    }

    /// Interpret as a flag, failing for numbers.
    pub fn as_bool(self, name: &str) -> VnmarkResult<bool> {
        match self {
            Self::Bool(v) => Ok(v),
            Self::Number(_) => Err(VnmarkError::property(format!(
                "property \"{name}\" expects a boolean"
            ))),
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

fn unknown(name: &str) -> VnmarkError {
    VnmarkError::property(format!("unknown property \"{name}\""))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Properties of an audio element.
pub enum AudioProperty {
    /// Script-driven volume factor.
    Value,
    /// Property-layer volume factor.
    Volume,
    /// Loop flag.
    Loop,
}

impl FromStr for AudioProperty {
    type Err = VnmarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(Self::Value),
            "volume" => Ok(Self::Volume),
            "loop" => Ok(Self::Loop),
            other => Err(unknown(other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Properties of a video element.
pub enum VideoProperty {
    /// Script-driven factor applied to both opacity and volume.
    Value,
    /// Property-layer opacity factor.
    Alpha,
    /// Property-layer volume factor.
    Volume,
    /// Loop flag.
    Loop,
}

impl FromStr for VideoProperty {
    type Err = VnmarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(Self::Value),
            "alpha" => Ok(Self::Alpha),
            "volume" => Ok(Self::Volume),
            "loop" => Ok(Self::Loop),
            other => Err(unknown(other)),
        }
    }
}
