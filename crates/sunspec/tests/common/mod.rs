//! Test harness for SunSpec integration tests
//!
//! Sets up a host in a temporary config directory against an in-memory
//! device loaded from `tests/fixtures/`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sunspec::{async_setup_entry, async_unload_entry, SetupResult, SunSpecEntry, DOMAIN};
use sunspec_core::State;
use sunspec_host::{ConfigEntry, Hass};
use sunspec_model::{Coordinator, DeviceFixture, MemoryApi, MemoryModel};
use tempfile::TempDir;

/// Load a fixture file as a string
pub fn load_fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);

    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to load fixture '{}' from {:?}: {}", name, path, e))
}

/// In-memory device described by a YAML fixture
pub fn load_device(name: &str) -> Arc<MemoryApi> {
    let fixture = DeviceFixture::from_yaml(&load_fixture(name))
        .unwrap_or_else(|e| panic!("Failed to parse fixture '{}': {}", name, e));
    Arc::new(fixture.into_api())
}

/// A host with one SunSpec config entry
pub struct TestSunSpec {
    pub dir: TempDir,
    pub hass: Hass,
    pub api: Arc<MemoryApi>,
    pub coordinator: Arc<Coordinator>,
    pub entry: ConfigEntry,
}

impl TestSunSpec {
    /// Host for the default inverter fixture with an entry built from `data`
    pub fn new(data: HashMap<String, Value>) -> Self {
        Self::with_dir(TempDir::new().unwrap(), load_device("inverter.yaml"), data)
    }

    pub fn with_dir(dir: TempDir, api: Arc<MemoryApi>, data: HashMap<String, Value>) -> Self {
        let hass = Hass::new(dir.path());
        let coordinator = Arc::new(Coordinator::new("inverter", api.clone()));
        let entry = ConfigEntry::new(DOMAIN, "Test inverter").with_data(data);
        Self {
            dir,
            hass,
            api,
            coordinator,
            entry,
        }
    }

    pub async fn setup(&mut self) -> SetupResult<SunSpecEntry> {
        async_setup_entry(&self.hass, &mut self.entry, self.coordinator.clone()).await
    }

    pub async fn unload(&mut self, loaded: SunSpecEntry) -> bool {
        async_unload_entry(&self.hass, &mut self.entry, loaded).await
    }

    pub fn model(&self, model_id: u16) -> Arc<MemoryModel> {
        self.api
            .model(model_id)
            .unwrap_or_else(|| panic!("fixture has no model {}", model_id))
    }

    pub fn state(&self, entity_id: &str) -> State {
        self.hass
            .states
            .get(entity_id)
            .unwrap_or_else(|| panic!("no state for {}", entity_id))
    }

    pub fn assert_state(&self, entity_id: &str, expected: &str) {
        assert_eq!(
            self.state(entity_id).state,
            expected,
            "unexpected state for {}",
            entity_id
        );
    }

    /// Wait for the refresh listener to write an expected state
    pub async fn wait_for_state(&self, entity_id: &str, expected: &str) {
        let result = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if self.hass.states.get_state(entity_id).as_deref() == Some(expected) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        if result.is_err() {
            panic!(
                "{} never became '{}', last state {:?}",
                entity_id,
                expected,
                self.hass.states.get_state(entity_id)
            );
        }
    }
}
