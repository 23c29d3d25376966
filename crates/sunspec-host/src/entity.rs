//! Entity traits implemented by integrations
//!
//! An integration implements [`Entity`] plus one of the per-domain traits
//! ([`SensorEntity`], [`SelectEntity`], [`NumberEntity`]). The host turns
//! those into a state string and attribute map through [`PlatformEntity`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sunspec_core::{domains, State, STATE_UNAVAILABLE, STATE_UNKNOWN};
use thiserror::Error;
use tracing::warn;

use crate::device_registry::DeviceInfo;

/// State attributes
pub type Attributes = HashMap<String, Value>;

/// Device classes a sensor can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorDeviceClass {
    Current,
    Energy,
    Enum,
    Power,
    Temperature,
    Voltage,
}

impl SensorDeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorDeviceClass::Current => "current",
            SensorDeviceClass::Energy => "energy",
            SensorDeviceClass::Enum => "enum",
            SensorDeviceClass::Power => "power",
            SensorDeviceClass::Temperature => "temperature",
            SensorDeviceClass::Voltage => "voltage",
        }
    }
}

impl fmt::Display for SensorDeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a sensor's values relate over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStateClass {
    Measurement,
    TotalIncreasing,
}

impl SensorStateClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStateClass::Measurement => "measurement",
            SensorStateClass::TotalIncreasing => "total_increasing",
        }
    }
}

/// Input widget hint for number entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberMode {
    #[default]
    Auto,
    Box,
    Slider,
}

impl NumberMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumberMode::Auto => "auto",
            NumberMode::Box => "box",
            NumberMode::Slider => "slider",
        }
    }
}

/// Errors raised by entity actions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntityError {
    #[error("option '{option}' is not one of {options:?}")]
    InvalidOption { option: String, options: Vec<String> },

    #[error("value {value} is outside [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

pub type EntityResult<T> = Result<T, EntityError>;

/// Behaviour shared by every entity
#[async_trait]
pub trait Entity: Send + Sync {
    /// Stable identifier used by the entity registry
    fn unique_id(&self) -> String;

    /// Display name, also used to suggest the entity id
    fn name(&self) -> Option<String>;

    fn icon(&self) -> Option<String> {
        None
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }

    fn available(&self) -> bool {
        true
    }

    /// Whether the state is a guess rather than a reading
    fn assumed_state(&self) -> bool {
        false
    }

    fn extra_state_attributes(&self) -> Attributes {
        Attributes::new()
    }

    /// Whether a change between two written states is worth reporting
    fn significant_change(&self, old_state: &State, new_state: &State) -> bool {
        old_state.state != new_state.state || old_state.attributes != new_state.attributes
    }

    /// Called once the entity is registered, with its state from the last run
    async fn added_to_hass(&self, _last_state: Option<State>) {}
}

/// Read-only measurement
pub trait SensorEntity: Entity {
    fn native_value(&self) -> Option<Value>;

    fn native_unit_of_measurement(&self) -> Option<String> {
        None
    }

    fn device_class(&self) -> Option<SensorDeviceClass> {
        None
    }

    fn state_class(&self) -> Option<SensorStateClass> {
        None
    }

    /// Possible values, for [`SensorDeviceClass::Enum`] sensors
    fn options(&self) -> Option<Vec<String>> {
        None
    }
}

/// Choice among a fixed list of options
#[async_trait]
pub trait SelectEntity: Entity {
    fn options(&self) -> Vec<String>;

    fn current_option(&self) -> Option<String>;

    async fn select_option(&self, option: &str) -> EntityResult<()>;
}

/// Writable numeric value
#[async_trait]
pub trait NumberEntity: Entity {
    fn native_value(&self) -> Option<f64>;

    fn native_min_value(&self) -> f64 {
        0.0
    }

    fn native_max_value(&self) -> f64 {
        100.0
    }

    fn native_step(&self) -> f64 {
        1.0
    }

    fn mode(&self) -> NumberMode {
        NumberMode::Auto
    }

    fn native_unit_of_measurement(&self) -> Option<String> {
        None
    }

    async fn set_native_value(&self, value: f64) -> EntityResult<()>;
}

/// An entity of one of the supported domains
#[derive(Clone)]
pub enum PlatformEntity {
    Sensor(Arc<dyn SensorEntity>),
    Select(Arc<dyn SelectEntity>),
    Number(Arc<dyn NumberEntity>),
}

macro_rules! with_entity {
    ($self:expr, $e:ident => $body:expr) => {
        match $self {
            PlatformEntity::Sensor($e) => $body,
            PlatformEntity::Select($e) => $body,
            PlatformEntity::Number($e) => $body,
        }
    };
}

impl PlatformEntity {
    pub fn domain(&self) -> &'static str {
        match self {
            PlatformEntity::Sensor(_) => domains::SENSOR,
            PlatformEntity::Select(_) => domains::SELECT,
            PlatformEntity::Number(_) => domains::NUMBER,
        }
    }

    pub fn unique_id(&self) -> String {
        with_entity!(self, e => e.unique_id())
    }

    pub fn name(&self) -> Option<String> {
        with_entity!(self, e => e.name())
    }

    pub fn icon(&self) -> Option<String> {
        with_entity!(self, e => e.icon())
    }

    pub fn device_info(&self) -> Option<DeviceInfo> {
        with_entity!(self, e => e.device_info())
    }

    pub fn significant_change(&self, old_state: &State, new_state: &State) -> bool {
        with_entity!(self, e => e.significant_change(old_state, new_state))
    }

    pub async fn added_to_hass(&self, last_state: Option<State>) {
        with_entity!(self, e => e.added_to_hass(last_state).await)
    }

    /// Compose the state string and attributes to write
    pub fn render(&self) -> (String, Attributes) {
        let mut attributes = with_entity!(self, e => e.extra_state_attributes());

        let available = with_entity!(self, e => e.available());
        let state = if available {
            match self {
                PlatformEntity::Sensor(sensor) => sensor_state(sensor.as_ref(), &mut attributes),
                PlatformEntity::Select(select) => {
                    attributes.insert("options".into(), json!(select.options()));
                    select
                        .current_option()
                        .unwrap_or_else(|| STATE_UNKNOWN.to_string())
                }
                PlatformEntity::Number(number) => number_state(number.as_ref(), &mut attributes),
            }
        } else {
            STATE_UNAVAILABLE.to_string()
        };

        if let Some(name) = self.name() {
            attributes.insert("friendly_name".into(), json!(name));
        }
        if let Some(icon) = self.icon() {
            attributes.insert("icon".into(), json!(icon));
        }
        if with_entity!(self, e => e.assumed_state()) {
            attributes.insert("assumed_state".into(), json!(true));
        }

        (state, attributes)
    }
}

fn sensor_state(sensor: &dyn SensorEntity, attributes: &mut Attributes) -> String {
    let device_class = sensor.device_class();

    if let Some(unit) = sensor.native_unit_of_measurement() {
        attributes.insert("unit_of_measurement".into(), json!(unit));
    }
    if let Some(class) = device_class {
        attributes.insert("device_class".into(), json!(class.as_str()));
    }
    if let Some(class) = sensor.state_class() {
        attributes.insert("state_class".into(), json!(class.as_str()));
    }

    let state = sensor
        .native_value()
        .map(|v| format_state_value(&v))
        .unwrap_or_else(|| STATE_UNKNOWN.to_string());

    if device_class != Some(SensorDeviceClass::Enum) {
        return state;
    }

    let options = sensor.options().unwrap_or_default();
    attributes.insert("options".into(), json!(options));
    if state != STATE_UNKNOWN && !options.contains(&state) {
        warn!(
            unique_id = %sensor.unique_id(),
            value = %state,
            "Enum sensor value is not one of its options"
        );
        return STATE_UNKNOWN.to_string();
    }
    state
}

fn number_state(number: &dyn NumberEntity, attributes: &mut Attributes) -> String {
    attributes.insert("min".into(), json!(number.native_min_value()));
    attributes.insert("max".into(), json!(number.native_max_value()));
    attributes.insert("step".into(), json!(number.native_step()));
    attributes.insert("mode".into(), json!(number.mode().as_str()));
    if let Some(unit) = number.native_unit_of_measurement() {
        attributes.insert("unit_of_measurement".into(), json!(unit));
    }

    number
        .native_value()
        .map(format_number)
        .unwrap_or_else(|| STATE_UNKNOWN.to_string())
}

/// Format a number for state display, dropping a zero fraction
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Render a native value as a state string
pub fn format_state_value(value: &Value) -> String {
    match value {
        Value::Null => STATE_UNKNOWN.to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "on".to_string(),
        Value::Bool(false) => "off".to_string(),
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}
