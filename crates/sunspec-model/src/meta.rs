//! Point and group metadata
//!
//! Field names follow the SunSpec JSON model definitions so metadata can be
//! deserialised straight from them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared data type of a point
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PointType {
    Int16,
    Uint16,
    Acc16,
    Enum16,
    Bitfield16,
    Pad,
    Int32,
    Uint32,
    Acc32,
    Enum32,
    Bitfield32,
    Ipaddr,
    Int64,
    Uint64,
    Acc64,
    Ipv6addr,
    Float32,
    Float64,
    String,
    Sunssf,
    Eui48,
    Count,
    /// A type name this crate does not know about, kept verbatim
    Other(std::string::String),
}

impl PointType {
    /// The SunSpec type name
    pub fn as_str(&self) -> &str {
        match self {
            PointType::Int16 => "int16",
            PointType::Uint16 => "uint16",
            PointType::Acc16 => "acc16",
            PointType::Enum16 => "enum16",
            PointType::Bitfield16 => "bitfield16",
            PointType::Pad => "pad",
            PointType::Int32 => "int32",
            PointType::Uint32 => "uint32",
            PointType::Acc32 => "acc32",
            PointType::Enum32 => "enum32",
            PointType::Bitfield32 => "bitfield32",
            PointType::Ipaddr => "ipaddr",
            PointType::Int64 => "int64",
            PointType::Uint64 => "uint64",
            PointType::Acc64 => "acc64",
            PointType::Ipv6addr => "ipv6addr",
            PointType::Float32 => "float32",
            PointType::Float64 => "float64",
            PointType::String => "string",
            PointType::Sunssf => "sunssf",
            PointType::Eui48 => "eui48",
            PointType::Count => "count",
            PointType::Other(name) => name,
        }
    }

    /// Whether values of this type are text
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            PointType::String | PointType::Ipaddr | PointType::Ipv6addr | PointType::Eui48
        )
    }

    /// Range of implemented raw values
    ///
    /// The all-ones / most-negative encodings mean "not implemented" on
    /// SunSpec devices and are excluded.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let range = match self {
            PointType::Int16 | PointType::Sunssf => (-32767.0, 32767.0),
            PointType::Uint16 | PointType::Enum16 | PointType::Bitfield16 | PointType::Count => {
                (0.0, 65534.0)
            }
            PointType::Acc16 => (0.0, 65535.0),
            PointType::Int32 => (-2_147_483_647.0, 2_147_483_647.0),
            PointType::Uint32 | PointType::Enum32 | PointType::Bitfield32 => (0.0, 4_294_967_294.0),
            PointType::Acc32 => (0.0, 4_294_967_295.0),
            PointType::Int64 => (-9_223_372_036_854_775_807.0, 9_223_372_036_854_775_807.0),
            PointType::Uint64 | PointType::Acc64 => (0.0, 18_446_744_073_709_551_615.0),
            PointType::Float32 => (f32::MIN as f64, f32::MAX as f64),
            PointType::Float64 => (f64::MIN, f64::MAX),
            _ => return None,
        };
        Some(range)
    }
}

impl From<std::string::String> for PointType {
    fn from(s: std::string::String) -> Self {
        match s.as_str() {
            "int16" => PointType::Int16,
            "uint16" => PointType::Uint16,
            "acc16" => PointType::Acc16,
            "enum16" => PointType::Enum16,
            "bitfield16" => PointType::Bitfield16,
            "pad" => PointType::Pad,
            "int32" => PointType::Int32,
            "uint32" => PointType::Uint32,
            "acc32" => PointType::Acc32,
            "enum32" => PointType::Enum32,
            "bitfield32" => PointType::Bitfield32,
            "ipaddr" => PointType::Ipaddr,
            "int64" => PointType::Int64,
            "uint64" => PointType::Uint64,
            "acc64" => PointType::Acc64,
            "ipv6addr" => PointType::Ipv6addr,
            "float32" => PointType::Float32,
            "float64" => PointType::Float64,
            "string" => PointType::String,
            "sunssf" => PointType::Sunssf,
            "eui48" => PointType::Eui48,
            "count" => PointType::Count,
            _ => PointType::Other(s),
        }
    }
}

impl From<&str> for PointType {
    fn from(s: &str) -> Self {
        PointType::from(s.to_string())
    }
}

impl From<PointType> for std::string::String {
    fn from(t: PointType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point access mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    /// Read-only
    #[default]
    R,
    /// Read-write
    RW,
}

/// One named value of an enumerated or bitfield point
///
/// For `enum16` points `value` is the enumerated value; for bitfields it is
/// the bit index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

/// Reference to a point's scale factor: a fixed exponent or the name of a
/// `sunssf` point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScaleFactorRef {
    Fixed(i32),
    Point(String),
}

/// Metadata describing a single point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub point_type: PointType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default)]
    pub access: Access,
    #[serde(default = "default_size")]
    pub size: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sf: Option<ScaleFactorRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<Symbol>>,
    /// `"M"` when devices must implement the point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mandatory: Option<String>,
    /// `"S"` when the value never changes
    #[serde(rename = "static", default, skip_serializing_if = "Option::is_none")]
    pub static_value: Option<String>,
}

fn default_size() -> u16 {
    1
}

impl PointMeta {
    /// Create metadata for a read-only point of the given type
    pub fn new(name: impl Into<String>, point_type: impl Into<PointType>) -> Self {
        Self {
            name: name.into(),
            point_type: point_type.into(),
            label: None,
            desc: None,
            units: None,
            access: Access::R,
            size: 1,
            sf: None,
            symbols: None,
            mandatory: None,
            static_value: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn with_symbols(mut self, symbols: Vec<Symbol>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    /// Whether the point is writable
    pub fn is_writable(&self) -> bool {
        self.access == Access::RW
    }

    /// Symbol names in declaration order
    pub fn symbol_names(&self) -> Option<Vec<String>> {
        self.symbols
            .as_ref()
            .map(|symbols| symbols.iter().map(|s| s.name.clone()).collect())
    }
}

impl Symbol {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
            label: None,
            desc: None,
        }
    }
}

/// Metadata describing a model (a group of points)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

/// Identity values read from the SunSpec common model (model 1)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonModel {
    /// Manufacturer
    #[serde(rename = "Mn", default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Model name
    #[serde(rename = "Md", default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Options
    #[serde(rename = "Opt", default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
    /// Firmware version
    #[serde(rename = "Vr", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Serial number
    #[serde(rename = "SN", default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_point_meta_from_sunspec_json() {
        let meta: PointMeta = serde_json::from_value(json!({
            "access": "RW",
            "mandatory": "M",
            "desc": "Commands to PCS. Enumerated value.",
            "label": "Set Operation",
            "name": "OpCtl",
            "size": 1,
            "symbols": [
                {"label": "Stop the DER", "name": "STOP", "value": 0},
                {"label": "Start the DER", "name": "START", "value": 1}
            ],
            "type": "enum16"
        }))
        .unwrap();

        assert_eq!(meta.point_type, PointType::Enum16);
        assert!(meta.is_writable());
        assert_eq!(meta.mandatory.as_deref(), Some("M"));
        assert_eq!(meta.static_value, None);
        assert_eq!(meta.label.as_deref(), Some("Set Operation"));
        assert_eq!(
            meta.symbol_names(),
            Some(vec!["STOP".to_string(), "START".to_string()])
        );
    }

    #[test]
    fn test_point_meta_defaults() {
        let meta: PointMeta =
            serde_json::from_value(json!({"name": "W", "type": "int16", "units": "W", "sf": "W_SF"}))
                .unwrap();
        assert_eq!(meta.access, Access::R);
        assert_eq!(meta.size, 1);
        assert_eq!(meta.sf, Some(ScaleFactorRef::Point("W_SF".to_string())));
        assert!(meta.symbols.is_none());
    }

    #[test]
    fn test_unknown_point_type_is_preserved() {
        let t = PointType::from("bitfield64");
        assert_eq!(t, PointType::Other("bitfield64".to_string()));
        assert_eq!(t.as_str(), "bitfield64");
        assert!(t.value_range().is_none());
    }

    #[test]
    fn test_value_ranges() {
        assert_eq!(PointType::Int16.value_range(), Some((-32767.0, 32767.0)));
        assert_eq!(PointType::Uint16.value_range(), Some((0.0, 65534.0)));
        assert!(PointType::String.value_range().is_none());
        assert_eq!(PointType::Bitfield32.value_range(), Some((0.0, 4_294_967_294.0)));
        assert!(PointType::Ipaddr.is_text());
    }

    #[test]
    fn test_common_model_from_sunspec_names() {
        let common: CommonModel = serde_json::from_value(json!({
            "Mn": "Fronius", "Md": "Symo 8.2-3-M", "Vr": "1.14.1-2"
        }))
        .unwrap();
        assert_eq!(common.manufacturer.as_deref(), Some("Fronius"));
        assert_eq!(common.model.as_deref(), Some("Symo 8.2-3-M"));
        assert_eq!(common.version.as_deref(), Some("1.14.1-2"));
        assert_eq!(common.serial_number, None);
    }
}
