//! Point values

use serde::{Deserialize, Serialize};
use std::fmt;

/// A decoded or raw point value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl PointValue {
    /// Numeric view of the value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PointValue::Int(v) => Some(*v as f64),
            PointValue::Float(v) => Some(*v),
            PointValue::Text(_) => None,
        }
    }

    /// Integral view of the value; floats qualify only when they have no
    /// fractional part
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PointValue::Int(v) => Some(*v),
            PointValue::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PointValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value is numerically zero
    pub fn is_zero(&self) -> bool {
        self.as_f64() == Some(0.0)
    }

    /// JSON form used in state attributes
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PointValue::Int(v) => serde_json::Value::from(*v),
            PointValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PointValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointValue::Int(v) => write!(f, "{}", v),
            PointValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.0}", v),
            PointValue::Float(v) => write!(f, "{}", v),
            PointValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PointValue {
    fn from(v: i64) -> Self {
        PointValue::Int(v)
    }
}

impl From<f64> for PointValue {
    fn from(v: f64) -> Self {
        PointValue::Float(v)
    }
}

impl From<&str> for PointValue {
    fn from(v: &str) -> Self {
        PointValue::Text(v.to_string())
    }
}

impl From<String> for PointValue {
    fn from(v: String) -> Self {
        PointValue::Text(v)
    }
}
