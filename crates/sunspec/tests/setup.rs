//! Config entry setup and unload

mod common;

use std::collections::HashMap;

use common::{load_device, TestSunSpec};
use serde_json::json;
use sunspec::{SetupError, DOMAIN};
use sunspec_core::domains;
use sunspec_host::ConfigEntryState;
use tempfile::TempDir;

#[tokio::test]
async fn test_setup_creates_entities_per_platform() {
    let mut t = TestSunSpec::new(HashMap::new());
    let loaded = t.setup().await.unwrap();

    assert_eq!(t.entry.state, ConfigEntryState::Loaded);
    assert_eq!(t.entry.reason, None);

    assert_eq!(
        loaded.entity_ids(domains::SENSOR).len(),
        7,
        "five inverter points and two mppt instances"
    );
    assert_eq!(
        t.hass.states.entity_ids(domains::SELECT),
        vec!["select.controls_connection_control"]
    );
    assert_eq!(
        t.hass.states.entity_ids(domains::NUMBER),
        vec!["number.controls_set_power_output"]
    );
    assert!(t.hass.states.get("sensor.controls_connection_control").is_none());
}

#[tokio::test]
async fn test_sensor_states_and_attributes() {
    let mut t = TestSunSpec::new(HashMap::new());
    let _loaded = t.setup().await.unwrap();

    let watts = t.state("sensor.inverter_watts");
    assert_eq!(watts.state, "1520");
    assert_eq!(watts.attributes["unit_of_measurement"], json!("W"));
    assert_eq!(watts.attributes["device_class"], json!("power"));
    assert_eq!(watts.attributes["state_class"], json!("measurement"));
    assert_eq!(watts.attributes["friendly_name"], json!("Inverter Watts"));
    assert_eq!(watts.attributes["icon"], json!("mdi:solar-power"));
    assert_eq!(watts.attributes["integration"], json!("sunspec"));
    assert_eq!(watts.attributes["sunspec_key"], json!("W"));
    assert_eq!(watts.attributes["label"], json!("Watts"));
    assert_eq!(watts.attributes["raw"], json!(152));

    let energy = t.state("sensor.inverter_watthours");
    assert_eq!(energy.state, "120000");
    assert_eq!(energy.attributes["state_class"], json!("total_increasing"));
    assert_eq!(energy.attributes["device_class"], json!("energy"));
    assert!(!energy.attributes.contains_key("assumed_state"));

    let status = t.state("sensor.inverter_operating_state");
    assert_eq!(status.state, "MPPT");
    assert_eq!(status.attributes["device_class"], json!("enum"));
    assert_eq!(
        status.attributes["options"],
        json!(["OFF", "SLEEPING", "MPPT", ""])
    );
    assert!(!status.attributes.contains_key("unit_of_measurement"));

    let events = t.state("sensor.inverter_event1");
    assert_eq!(events.state, "GROUND_FAULT,OVER_TEMP");
    assert!(!events.attributes.contains_key("device_class"));

    let amps: f64 = t.state("sensor.inverter_amps").state.parse().unwrap();
    assert!((amps - 12.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_repeating_model_instances() {
    let mut t = TestSunSpec::new(HashMap::new());
    let _loaded = t.setup().await.unwrap();

    let first = t.state("sensor.mppt_module_0_dc_current");
    let second = t.state("sensor.mppt_1_module_0_dc_current");
    assert_eq!(
        second.attributes["friendly_name"],
        json!("Mppt 1 module 0 DC Current")
    );
    assert_eq!(first.attributes["icon"], json!("mdi:current-dc"));

    let amps: f64 = second.state.parse().unwrap();
    assert!((amps - 4.98).abs() < 1e-9);

    let entry = t
        .hass
        .entities
        .get("sensor.mppt_1_module_0_dc_current")
        .unwrap();
    assert_eq!(
        entry.unique_id,
        format!("{}_module:0:DCA-160-1", t.entry.entry_id)
    );
}

#[tokio::test]
async fn test_devices_grouped_by_model() {
    let mut t = TestSunSpec::new(HashMap::new());
    let _loaded = t.setup().await.unwrap();

    let inverter = t
        .hass
        .devices
        .get_by_identifier(DOMAIN, &format!("{}_inverter", t.entry.entry_id))
        .unwrap();
    assert_eq!(inverter.name.as_deref(), Some("Inverter (Three Phase)"));
    assert_eq!(inverter.manufacturer.as_deref(), Some("SunSpecTest"));
    assert_eq!(inverter.model.as_deref(), Some("TestInverter-1"));
    assert_eq!(inverter.sw_version.as_deref(), Some("1.2.3"));

    assert_eq!(
        t.hass.devices.get_by_config_entry_id(&t.entry.entry_id).len(),
        3
    );

    let watts = t.hass.entities.get("sensor.inverter_watts").unwrap();
    assert_eq!(watts.device_id.as_deref(), Some(inverter.id.as_str()));
}

#[tokio::test]
async fn test_prefix_and_model_filter() {
    let mut t = TestSunSpec::new(HashMap::from([
        ("prefix".to_string(), json!("Roof")),
        ("models".to_string(), json!([103])),
    ]));
    let loaded = t.setup().await.unwrap();

    t.assert_state("sensor.roof_inverter_watts", "1520");
    assert_eq!(
        t.state("sensor.roof_inverter_watts").attributes["friendly_name"],
        json!("Roof inverter Watts")
    );
    assert_eq!(loaded.entity_ids(domains::SENSOR).len(), 5);
    assert!(loaded.entity_ids(domains::SELECT).is_empty());
    assert!(loaded.entity_ids(domains::NUMBER).is_empty());
}

#[tokio::test]
async fn test_offline_device_fails_setup() {
    let mut t = TestSunSpec::new(HashMap::new());
    t.api.set_online(false);

    let err = t.setup().await.unwrap_err();
    assert!(matches!(err, SetupError::NotReady(_)));
    assert_eq!(t.entry.state, ConfigEntryState::SetupError);
    assert!(t.entry.reason.is_some());
    assert!(t.hass.states.is_empty());

    t.api.set_online(true);
    let _loaded = t.setup().await.unwrap();
    assert_eq!(t.entry.state, ConfigEntryState::Loaded);
}

#[tokio::test]
async fn test_empty_device_fails_setup() {
    let dir = TempDir::new().unwrap();
    let api = std::sync::Arc::new(sunspec_model::MemoryApi::new(Default::default()));
    let mut t = TestSunSpec::with_dir(dir, api, HashMap::new());

    assert!(matches!(t.setup().await, Err(SetupError::NotReady(_))));
    assert_eq!(t.entry.state, ConfigEntryState::SetupError);
}

#[tokio::test]
async fn test_invalid_options_fail_setup() {
    let mut t = TestSunSpec::new(HashMap::from([("scan_interval".to_string(), json!("often"))]));

    assert!(matches!(t.setup().await, Err(SetupError::InvalidOptions(_))));
    assert_eq!(t.entry.state, ConfigEntryState::SetupError);
}

#[tokio::test]
async fn test_setup_twice_is_rejected() {
    let mut t = TestSunSpec::new(HashMap::new());
    let _loaded = t.setup().await.unwrap();

    assert!(matches!(t.setup().await, Err(SetupError::AlreadyLoaded(_))));
    assert_eq!(t.entry.state, ConfigEntryState::Loaded);
}

#[tokio::test]
async fn test_unload_removes_states_and_keeps_registry() {
    let mut t = TestSunSpec::new(HashMap::new());
    let loaded = t.setup().await.unwrap();
    let registered = t.hass.entities.len();

    assert!(t.unload(loaded).await);
    assert_eq!(t.entry.state, ConfigEntryState::NotLoaded);
    assert!(t.hass.states.is_empty());
    assert_eq!(t.hass.entities.len(), registered);

    // Refreshes after unload no longer write states
    t.coordinator.async_refresh().await.unwrap();
    tokio::task::yield_now().await;
    assert!(t.hass.states.is_empty());

    let _loaded = t.setup().await.unwrap();
    t.assert_state("sensor.inverter_watts", "1520");
    assert_eq!(t.hass.entities.len(), registered);
}

#[tokio::test]
async fn test_same_device_in_two_directories() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let api = load_device("inverter.yaml");

    let mut a = TestSunSpec::with_dir(first, api.clone(), HashMap::new());
    let mut b = TestSunSpec::with_dir(second, api, HashMap::new());
    let _a = a.setup().await.unwrap();
    let _b = b.setup().await.unwrap();

    a.assert_state("sensor.inverter_watts", "1520");
    b.assert_state("sensor.inverter_watts", "1520");
}
