//! SunSpec unit symbols mapped to host units, icons and device classes

use sunspec_host::SensorDeviceClass;

use crate::constants::{
    ICON_AC_AMPS, ICON_DEFAULT, ICON_ENERGY, ICON_FREQ, ICON_POWER, ICON_TEMP, ICON_VOLT,
};

/// Host presentation of a SunSpec unit symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaMeta {
    pub unit: Option<String>,
    pub icon: &'static str,
    pub device_class: Option<SensorDeviceClass>,
}

type Row = (
    &'static str,
    Option<&'static str>,
    &'static str,
    Option<SensorDeviceClass>,
);

const HA_META: &[Row] = &[
    ("A", Some("A"), ICON_AC_AMPS, Some(SensorDeviceClass::Current)),
    ("HPa", Some("hPa"), ICON_DEFAULT, None),
    ("Hz", Some("Hz"), ICON_FREQ, None),
    ("Mbps", Some("Mbit/s"), ICON_DEFAULT, None),
    ("V", Some("V"), ICON_VOLT, Some(SensorDeviceClass::Voltage)),
    ("VA", Some("VA"), ICON_POWER, None),
    ("VAr", Some("var"), ICON_POWER, None),
    ("W", Some("W"), ICON_POWER, Some(SensorDeviceClass::Power)),
    ("kW", Some("kW"), ICON_POWER, Some(SensorDeviceClass::Power)),
    ("W/m2", Some("W/m²"), ICON_DEFAULT, None),
    ("Wh", Some("Wh"), ICON_ENERGY, Some(SensorDeviceClass::Energy)),
    ("WH", Some("Wh"), ICON_ENERGY, Some(SensorDeviceClass::Energy)),
    ("bps", Some("bit/s"), ICON_DEFAULT, None),
    ("deg", Some("°"), ICON_TEMP, Some(SensorDeviceClass::Temperature)),
    ("Degrees", Some("°"), ICON_TEMP, Some(SensorDeviceClass::Temperature)),
    ("C", Some("°C"), ICON_TEMP, Some(SensorDeviceClass::Temperature)),
    ("kWh", Some("kWh"), ICON_ENERGY, Some(SensorDeviceClass::Energy)),
    ("m/s", Some("m/s"), ICON_DEFAULT, None),
    ("mSecs", Some("ms"), ICON_DEFAULT, None),
    ("meters", Some("m"), ICON_DEFAULT, None),
    ("mm", Some("mm"), ICON_DEFAULT, None),
    ("%", Some("%"), ICON_DEFAULT, None),
    ("Secs", Some("s"), ICON_DEFAULT, None),
    ("enum16", None, ICON_DEFAULT, Some(SensorDeviceClass::Enum)),
    ("bitfield32", None, ICON_DEFAULT, None),
];

/// Look a symbol up in the unit table
pub fn lookup(symbol: &str) -> Option<HaMeta> {
    HA_META
        .iter()
        .find(|(s, ..)| *s == symbol)
        .map(|&(_, unit, icon, device_class)| HaMeta {
            unit: unit.map(String::from),
            icon,
            device_class,
        })
}

/// Presentation of a point with the given declared units and type name
///
/// Units are looked up first; unknown units are shown verbatim. Points
/// without units are looked up by type name, and get no unit when the type
/// is not in the table.
pub fn for_point(units: Option<&str>, type_name: &str) -> HaMeta {
    match units.filter(|u| !u.is_empty()) {
        Some(units) => lookup(units).unwrap_or_else(|| HaMeta {
            unit: Some(units.to_string()),
            icon: ICON_DEFAULT,
            device_class: None,
        }),
        None => lookup(type_name).unwrap_or(HaMeta {
            unit: None,
            icon: ICON_DEFAULT,
            device_class: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_units() {
        let watts = for_point(Some("W"), "int16");
        assert_eq!(watts.unit.as_deref(), Some("W"));
        assert_eq!(watts.icon, ICON_POWER);
        assert_eq!(watts.device_class, Some(SensorDeviceClass::Power));

        assert_eq!(for_point(Some("VAr"), "int16").unit.as_deref(), Some("var"));
        assert_eq!(for_point(Some("W/m2"), "uint16").unit.as_deref(), Some("W/m²"));
        assert_eq!(
            for_point(Some("WH"), "acc32").device_class,
            Some(SensorDeviceClass::Energy)
        );
        assert_eq!(for_point(Some("C"), "int16").unit.as_deref(), Some("°C"));
    }

    #[test]
    fn test_unknown_units_are_kept() {
        let meta = for_point(Some("Ah"), "uint16");
        assert_eq!(meta.unit.as_deref(), Some("Ah"));
        assert_eq!(meta.icon, ICON_DEFAULT);
        assert_eq!(meta.device_class, None);
    }

    #[test]
    fn test_type_fallback() {
        let status = for_point(None, "enum16");
        assert_eq!(status.unit, None);
        assert_eq!(status.device_class, Some(SensorDeviceClass::Enum));

        assert_eq!(for_point(None, "bitfield32").device_class, None);
        assert_eq!(for_point(Some(""), "uint16"), for_point(None, "uint16"));
        assert_eq!(for_point(None, "uint16").unit, None);
    }
}
