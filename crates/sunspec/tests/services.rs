//! select.select_option and number.set_value against a device

mod common;

use std::collections::HashMap;

use common::TestSunSpec;
use serde_json::json;
use sunspec_core::{domains, Context, State};
use sunspec_host::{ServiceError, SERVICE_SELECT_OPTION, SERVICE_SET_VALUE};
use sunspec_model::{ModelWrapper, PointValue};

const CONNECTION: &str = "select.controls_connection_control";
const POWER_LIMIT: &str = "number.controls_set_power_output";

#[tokio::test]
async fn test_select_option_writes_device() {
    let mut t = TestSunSpec::new(HashMap::new());
    let _loaded = t.setup().await.unwrap();

    let select = t.state(CONNECTION);
    assert_eq!(select.state, "CONNECT");
    assert_eq!(select.attributes["options"], json!(["DISCONNECT", "CONNECT"]));
    assert_eq!(select.attributes["icon"], json!("mdi:dip-switch"));
    assert_eq!(select.attributes["raw"], json!(1));

    t.hass
        .services
        .call(
            domains::SELECT,
            SERVICE_SELECT_OPTION,
            json!({"entity_id": CONNECTION, "option": "DISCONNECT"}),
            Context::new(),
        )
        .await
        .unwrap();

    assert_eq!(t.api.writes(), vec![(123, 0)]);
    assert_eq!(
        t.model(123).raw_value("Conn", 0).unwrap(),
        Some(PointValue::Int(0))
    );
    let select = t.state(CONNECTION);
    assert_eq!(select.state, "DISCONNECT");
    assert_eq!(select.attributes["raw"], json!(0));
}

#[tokio::test]
async fn test_select_rejects_unknown_option() {
    let mut t = TestSunSpec::new(HashMap::new());
    let _loaded = t.setup().await.unwrap();

    let err = t
        .hass
        .services
        .call(
            domains::SELECT,
            SERVICE_SELECT_OPTION,
            json!({"entity_id": CONNECTION, "option": "REBOOT"}),
            Context::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::InvalidData(_)));
    assert!(t.api.writes().is_empty());
    t.assert_state(CONNECTION, "CONNECT");
}

#[tokio::test]
async fn test_set_value_writes_device() {
    let mut t = TestSunSpec::new(HashMap::new());
    let _loaded = t.setup().await.unwrap();

    let number = t.state(POWER_LIMIT);
    assert_eq!(number.state, "100");
    assert_eq!(number.attributes["mode"], json!("box"));
    assert_eq!(number.attributes["step"], json!(1.0));
    assert_eq!(number.attributes["min"], json!(0.0));
    assert_eq!(number.attributes["unit_of_measurement"], json!("%"));

    t.hass
        .services
        .call(
            domains::NUMBER,
            SERVICE_SET_VALUE,
            json!({"entity_id": POWER_LIMIT, "value": 50}),
            Context::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        t.model(123).raw_value("WMaxLimPct", 0).unwrap(),
        Some(PointValue::Int(500))
    );
    t.assert_state(POWER_LIMIT, "50");
}

#[tokio::test]
async fn test_set_value_out_of_range() {
    let mut t = TestSunSpec::new(HashMap::new());
    let _loaded = t.setup().await.unwrap();

    for value in [json!(-1), json!(1_000_000)] {
        let err = t
            .hass
            .services
            .call(
                domains::NUMBER,
                SERVICE_SET_VALUE,
                json!({"entity_id": POWER_LIMIT, "value": value}),
                Context::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidData(_)));
    }
    assert!(t.api.writes().is_empty());
}

#[tokio::test]
async fn test_write_to_offline_device_fails() {
    let mut t = TestSunSpec::new(HashMap::new());
    let _loaded = t.setup().await.unwrap();
    t.api.set_online(false);

    let err = t
        .hass
        .services
        .call(
            domains::NUMBER,
            SERVICE_SET_VALUE,
            json!({"entity_id": POWER_LIMIT, "value": 40}),
            Context::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::CallFailed(_)));
    t.assert_state(POWER_LIMIT, "100");
}

#[tokio::test]
async fn test_services_need_a_known_entity() {
    let mut t = TestSunSpec::new(HashMap::new());
    let _loaded = t.setup().await.unwrap();

    let missing = t
        .hass
        .services
        .call(
            domains::SELECT,
            SERVICE_SELECT_OPTION,
            json!({"option": "CONNECT"}),
            Context::new(),
        )
        .await;
    assert!(matches!(missing, Err(ServiceError::InvalidData(_))));

    let unknown = t
        .hass
        .services
        .call(
            domains::SELECT,
            SERVICE_SELECT_OPTION,
            json!({"entity_id": "select.nope", "option": "CONNECT"}),
            Context::new(),
        )
        .await;
    assert!(matches!(unknown, Err(ServiceError::InvalidData(_))));
}

#[tokio::test]
async fn test_select_change_significance() {
    let mut t = TestSunSpec::new(HashMap::new());
    let _loaded = t.setup().await.unwrap();
    let mut changes = t.hass.states.subscribe();

    t.hass
        .services
        .call(
            domains::SELECT,
            SERVICE_SELECT_OPTION,
            json!({"entity_id": CONNECTION, "option": "DISCONNECT"}),
            Context::new(),
        )
        .await
        .unwrap();

    let change = loop {
        let change = changes.recv().await.unwrap();
        let disconnected = change
            .new_state
            .as_ref()
            .is_some_and(|s| s.state == "DISCONNECT");
        if change.entity_id.to_string() == CONNECTION && disconnected {
            break change;
        }
    };
    assert_eq!(change.old_state.as_ref().unwrap().state, "CONNECT");
    assert!(t.hass.is_significant(&change));

    // Same option, different raw value
    let current = change.new_state.clone().unwrap();
    let mut attributes = current.attributes.clone();
    attributes.insert("raw".into(), json!(5));
    let mut raw_only = change.clone();
    raw_only.old_state = Some(current.clone());
    raw_only.new_state = Some(State::new(
        current.entity_id.clone(),
        current.state.clone(),
        attributes,
        Context::new(),
    ));
    assert!(!t.hass.is_significant(&raw_only));
    assert!(!raw_only.is_significant());
}
