//! Sensor platform
//!
//! Read-only points become sensors. Enumerated points report the matching
//! symbol name, bitfields the names of their set bits. Energy counters hold
//! on to their last non-zero reading, since a counter dropping to zero would
//! be taken as a reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use sunspec_core::{truncate_chars, State, STATE_UNAVAILABLE, STATE_UNKNOWN};
use sunspec_host::{
    Attributes, DeviceInfo, Entity, PlatformEntity, SensorDeviceClass, SensorEntity,
    SensorStateClass,
};
use sunspec_model::{PointType, PointValue, Symbol};
use tracing::debug;

use crate::constants::MAX_SYMBOL_STATE;
use crate::entity::SunSpecEntity;

/// Build the sensor for a point, if the point belongs on this platform
pub fn create(base: SunSpecEntity) -> Option<PlatformEntity> {
    if base.meta().is_writable() {
        return None;
    }
    let energy = base.device_class() == Some(SensorDeviceClass::Energy);
    Some(PlatformEntity::Sensor(Arc::new(SunSpecSensor::new(
        base, energy,
    ))))
}

/// A read-only point
pub struct SunSpecSensor {
    base: SunSpecEntity,
    unit: Option<String>,
    device_class: Option<SensorDeviceClass>,
    /// Symbol names plus `""`, for enum and bitfield points
    options: Vec<String>,
    energy: bool,
    /// Last non-zero energy reading
    last_known: Mutex<Option<Value>>,
    assumed: AtomicBool,
}

impl SunSpecSensor {
    pub fn new(base: SunSpecEntity, energy: bool) -> Self {
        let mut unit = base.unit();
        let mut device_class = base.device_class();
        let mut options = Vec::new();

        match base.meta().point_type {
            PointType::String => {
                unit = None;
                device_class = None;
            }
            PointType::Enum16 | PointType::Bitfield32 => match base.meta().symbol_names() {
                Some(mut names) => {
                    names.push(String::new());
                    options = names;
                }
                None => device_class = None,
            },
            _ => {}
        }

        debug!(
            key = base.key(),
            device_class = ?device_class,
            unit = ?unit,
            "Created sensor entity"
        );

        Self {
            base,
            unit,
            device_class,
            options,
            energy,
            last_known: Mutex::new(None),
            assumed: AtomicBool::new(false),
        }
    }

    fn symbols(&self) -> Option<&[Symbol]> {
        self.base.meta().symbols.as_deref()
    }

    /// Point value with enum and bitfield symbols resolved
    fn decode(&self, value: Option<PointValue>) -> Option<Value> {
        let value = value?;

        let symbols = match (&self.base.meta().point_type, self.symbols()) {
            (PointType::Enum16 | PointType::Bitfield32, Some(symbols)) => symbols,
            _ => return Some(value.to_json()),
        };

        if self.base.meta().point_type == PointType::Enum16 {
            return enum_name(&value, symbols).map(|name| json!(name));
        }
        Some(json!(bitfield_names(&value, symbols)))
    }

    fn guard_energy(&self, value: Option<PointValue>) -> Option<Value> {
        let zero = value.as_ref().is_some_and(PointValue::is_zero);
        let value = self.decode(value);
        let Ok(mut last_known) = self.last_known.lock() else {
            return value;
        };

        if zero {
            debug!(
                key = self.base.key(),
                "Returning last known value instead of 0 to avoid resetting total_increasing counter"
            );
            self.assumed.store(true, Ordering::SeqCst);
            return last_known.clone();
        }

        if value.is_some() {
            *last_known = value.clone();
        }
        self.assumed.store(false, Ordering::SeqCst);
        value
    }
}

/// The one symbol matching a predicate; `None` when no symbol or several do
pub fn unique_symbol<'a>(
    symbols: &'a [Symbol],
    matches: impl Fn(&Symbol) -> bool,
) -> Option<&'a Symbol> {
    let mut found = symbols.iter().filter(|s| matches(s));
    match (found.next(), found.next()) {
        (Some(symbol), None) => Some(symbol),
        _ => None,
    }
}

/// Name of the symbol whose value equals the point value
///
/// Ambiguous symbol tables, with several symbols sharing the value, give
/// `None`.
pub fn enum_name(value: &PointValue, symbols: &[Symbol]) -> Option<String> {
    let value = value.as_i64()?;
    unique_symbol(symbols, |s| s.value == value).map(|s| truncate_chars(&s.name, MAX_SYMBOL_STATE))
}

/// Comma-separated names of the symbols whose bit is set
pub fn bitfield_names(value: &PointValue, symbols: &[Symbol]) -> String {
    let Some(bits) = value.as_i64() else {
        return String::new();
    };
    let names: Vec<&str> = symbols
        .iter()
        .filter(|s| (0..64).contains(&s.value) && (bits >> s.value) & 1 == 1)
        .map(|s| s.name.as_str())
        .collect();
    truncate_chars(&names.join(","), MAX_SYMBOL_STATE)
}

fn restored_number(state: &State) -> Option<Value> {
    if state.state == STATE_UNKNOWN || state.state == STATE_UNAVAILABLE {
        return None;
    }
    if let Ok(int) = state.state.parse::<i64>() {
        return Some(json!(int));
    }
    state
        .state
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| json!(v))
}

#[async_trait]
impl Entity for SunSpecSensor {
    fn unique_id(&self) -> String {
        self.base.unique_id()
    }

    fn name(&self) -> Option<String> {
        Some(self.base.name())
    }

    fn icon(&self) -> Option<String> {
        Some(self.base.icon().to_string())
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(self.base.device_info())
    }

    fn available(&self) -> bool {
        self.base.available()
    }

    fn assumed_state(&self) -> bool {
        self.assumed.load(Ordering::SeqCst)
    }

    fn extra_state_attributes(&self) -> Attributes {
        let mut attrs = self.base.base_attributes();
        if !self.options.is_empty() {
            attrs.insert("options".into(), json!(self.options));
        }
        attrs
    }

    async fn added_to_hass(&self, last_state: Option<State>) {
        if !self.energy {
            return;
        }
        match last_state.as_ref().and_then(restored_number) {
            Some(value) => {
                debug!(key = self.base.key(), value = %value, "Got last known value from state");
                if let Ok(mut last_known) = self.last_known.lock() {
                    *last_known = Some(value);
                }
            }
            None => debug!(key = self.base.key(), "No previous state was found"),
        }
    }
}

impl SensorEntity for SunSpecSensor {
    fn native_value(&self) -> Option<Value> {
        let value = self.base.value();
        if self.energy {
            self.guard_energy(value)
        } else {
            self.decode(value)
        }
    }

    fn native_unit_of_measurement(&self) -> Option<String> {
        self.unit.clone()
    }

    fn device_class(&self) -> Option<SensorDeviceClass> {
        self.device_class
    }

    fn state_class(&self) -> Option<SensorStateClass> {
        match self.unit.as_deref() {
            None | Some("") => None,
            _ if self.device_class == Some(SensorDeviceClass::Energy) => {
                Some(SensorStateClass::TotalIncreasing)
            }
            _ => Some(SensorStateClass::Measurement),
        }
    }

    fn options(&self) -> Option<Vec<String>> {
        (self.device_class == Some(SensorDeviceClass::Enum)).then(|| self.options.clone())
    }
}
