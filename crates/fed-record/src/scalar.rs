// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scalar value universe and the restricted per-record value sets.

use crate::RecordError;
use serde::{Deserialize, Serialize};

/// The universe of primitive values carried by records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    /// Boolean value.
    Bool(bool),
    /// Signed integer (up to 64-bit).
    Int(i64),
    /// Unsigned integer (up to 64-bit).
    UInt(u64),
    /// Double-precision float.
    Double(f64),
    /// UTF-8 string.
    Str(String),
    /// Opaque byte sequence.
    Bytes(Vec<u8>),
}

impl Scalar {
    /// Short tag describing the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Double(_) => "double",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}
impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}
impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}
impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}
impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}
impl From<Vec<u8>> for Scalar {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// Values admitted by a [`MetricsRecord`](crate::MetricsRecord): numeric
/// scalars and sequences thereof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsValue {
    /// Signed integer metric.
    Int(i64),
    /// Float metric.
    Double(f64),
    /// Sequence of integer metrics.
    IntList(Vec<i64>),
    /// Sequence of float metrics.
    DoubleList(Vec<f64>),
}

impl TryFrom<Scalar> for MetricsValue {
    type Error = RecordError;

    fn try_from(value: Scalar) -> Result<Self, Self::Error> {
        let found = value.kind();
        match value {
            Scalar::Int(v) => Ok(Self::Int(v)),
            Scalar::UInt(v) => i64::try_from(v).map(Self::Int).map_err(|_| {
                RecordError::TypeViolation {
                    key: String::new(),
                    expected: "numeric value representable as i64",
                    found,
                }
            }),
            Scalar::Double(v) => Ok(Self::Double(v)),
            Scalar::Bool(_) | Scalar::Str(_) | Scalar::Bytes(_) => {
                Err(RecordError::TypeViolation {
                    key: String::new(),
                    expected: "int, double, or a sequence thereof",
                    found,
                })
            }
        }
    }
}

impl From<i64> for MetricsValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}
impl From<f64> for MetricsValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}
impl From<Vec<i64>> for MetricsValue {
    fn from(v: Vec<i64>) -> Self {
        Self::IntList(v)
    }
}
impl From<Vec<f64>> for MetricsValue {
    fn from(v: Vec<f64>) -> Self {
        Self::DoubleList(v)
    }
}

/// Values admitted by a [`ConfigsRecord`](crate::ConfigsRecord): the metrics
/// set plus strings, bytes, booleans, and their list forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigValue {
    /// Boolean config.
    Bool(bool),
    /// Signed integer config.
    Int(i64),
    /// Float config.
    Double(f64),
    /// String config.
    Str(String),
    /// Raw bytes config.
    Bytes(Vec<u8>),
    /// Sequence of booleans.
    BoolList(Vec<bool>),
    /// Sequence of integers.
    IntList(Vec<i64>),
    /// Sequence of floats.
    DoubleList(Vec<f64>),
    /// Sequence of strings.
    StrList(Vec<String>),
}

impl TryFrom<Scalar> for ConfigValue {
    type Error = RecordError;

    fn try_from(value: Scalar) -> Result<Self, Self::Error> {
        let found = value.kind();
        match value {
            Scalar::Bool(v) => Ok(Self::Bool(v)),
            Scalar::Int(v) => Ok(Self::Int(v)),
            Scalar::UInt(v) => i64::try_from(v).map(Self::Int).map_err(|_| {
                RecordError::TypeViolation {
                    key: String::new(),
                    expected: "config value representable as i64",
                    found,
                }
            }),
            Scalar::Double(v) => Ok(Self::Double(v)),
            Scalar::Str(v) => Ok(Self::Str(v)),
            Scalar::Bytes(v) => Ok(Self::Bytes(v)),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}
impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}
impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}
impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_value_accepts_numerics() {
        assert_eq!(
            MetricsValue::try_from(Scalar::Int(3)).unwrap(),
            MetricsValue::Int(3)
        );
        assert_eq!(
            MetricsValue::try_from(Scalar::UInt(7)).unwrap(),
            MetricsValue::Int(7)
        );
        assert_eq!(
            MetricsValue::try_from(Scalar::Double(0.5)).unwrap(),
            MetricsValue::Double(0.5)
        );
    }

    #[test]
    fn metrics_value_rejects_non_numerics() {
        for scalar in [
            Scalar::Bool(true),
            Scalar::Str("nope".into()),
            Scalar::Bytes(vec![1]),
        ] {
            let err = MetricsValue::try_from(scalar).unwrap_err();
            assert!(matches!(err, RecordError::TypeViolation { .. }));
        }
    }

    #[test]
    fn metrics_value_rejects_uint_overflow() {
        let err = MetricsValue::try_from(Scalar::UInt(u64::MAX)).unwrap_err();
        assert!(matches!(err, RecordError::TypeViolation { .. }));
    }

    #[test]
    fn config_value_accepts_every_scalar() {
        for scalar in [
            Scalar::Bool(true),
            Scalar::Int(-1),
            Scalar::UInt(1),
            Scalar::Double(2.0),
            Scalar::Str("s".into()),
            Scalar::Bytes(vec![0xff]),
        ] {
            ConfigValue::try_from(scalar).unwrap();
        }
    }
}
