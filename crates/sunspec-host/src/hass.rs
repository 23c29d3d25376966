//! Host container
//!
//! Bundles the state store, service registry, registries and restore store
//! for one config directory, and routes entity services to the platform
//! that owns the targeted entity.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use sunspec_core::{domains, EntityId, ServiceCall, StateChangedData};
use tracing::{debug, info};

use crate::device_registry::DeviceRegistry;
use crate::entity::{EntityError, PlatformEntity};
use crate::entity_registry::EntityRegistry;
use crate::platform::{EntityPlatform, PlatformHost};
use crate::restore_state::RestoreStateStore;
use crate::services::{ServiceError, ServiceRegistry, ServiceResult};
use crate::state_store::StateStore;
use crate::storage::{Storage, StorageResult};

/// Service name for choosing a select option
pub const SERVICE_SELECT_OPTION: &str = "select_option";

/// Service name for setting a number value
pub const SERVICE_SET_VALUE: &str = "set_value";

type PlatformIndex = Arc<DashMap<String, Arc<EntityPlatform>>>;

/// The host instance
pub struct Hass {
    config_dir: PathBuf,
    pub storage: Arc<Storage>,
    pub states: Arc<StateStore>,
    pub services: Arc<ServiceRegistry>,
    pub entities: Arc<EntityRegistry>,
    pub devices: Arc<DeviceRegistry>,
    pub restore: Arc<RestoreStateStore>,
    /// entity_id -> owning platform
    platforms: PlatformIndex,
}

impl Hass {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        let config_dir = config_dir.as_ref().to_path_buf();
        let storage = Arc::new(Storage::new(&config_dir));

        Self {
            entities: Arc::new(EntityRegistry::new(storage.clone())),
            devices: Arc::new(DeviceRegistry::new(storage.clone())),
            restore: Arc::new(RestoreStateStore::new(storage.clone())),
            states: Arc::new(StateStore::new()),
            services: Arc::new(ServiceRegistry::new()),
            platforms: Arc::new(DashMap::new()),
            storage,
            config_dir,
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Load registries and restore states from storage
    pub async fn load(&self) -> StorageResult<()> {
        self.entities.load().await?;
        self.devices.load().await?;
        self.restore.load().await?;
        info!(config_dir = %self.config_dir.display(), "Loaded host storage");
        Ok(())
    }

    /// Persist registries and the latest entity states
    pub async fn save(&self) -> StorageResult<()> {
        self.entities.save().await?;
        self.devices.save().await?;
        self.restore.save().await?;
        Ok(())
    }

    /// Create an empty platform for an integration and config entry
    pub fn platform(
        &self,
        integration: &str,
        domain: &'static str,
        config_entry_id: &str,
    ) -> Arc<EntityPlatform> {
        Arc::new(EntityPlatform::new(
            integration,
            domain,
            config_entry_id,
            PlatformHost {
                states: self.states.clone(),
                entities: self.entities.clone(),
                devices: self.devices.clone(),
                restore: self.restore.clone(),
            },
        ))
    }

    /// Add entities to a platform and make them reachable through services
    pub async fn async_add_entities(
        &self,
        platform: &Arc<EntityPlatform>,
        entities: Vec<PlatformEntity>,
    ) -> Vec<EntityId> {
        self.ensure_services(platform.domain());

        let added = platform.add_entities(entities).await;
        for entity_id in &added {
            self.platforms
                .insert(entity_id.to_string(), Arc::clone(platform));
        }
        added
    }

    /// Remove a platform's entity states and service routes
    pub fn remove_platform(&self, platform: &EntityPlatform) {
        for entity_id in platform.remove_all() {
            self.platforms.remove(&entity_id.to_string());
        }
    }

    /// Platform owning an entity
    pub fn platform_for(&self, entity_id: &str) -> Option<Arc<EntityPlatform>> {
        self.platforms.get(entity_id).map(|p| Arc::clone(&p))
    }

    /// Whether a state change is worth reporting, as judged by the entity
    ///
    /// Entities that are no longer loaded fall back to comparing the state
    /// strings.
    pub fn is_significant(&self, change: &StateChangedData) -> bool {
        let (Some(old_state), Some(new_state)) = (&change.old_state, &change.new_state) else {
            return true;
        };
        let entity_id = change.entity_id.to_string();
        match self
            .platform_for(&entity_id)
            .and_then(|platform| platform.entity(&entity_id))
        {
            Some(entity) => entity.significant_change(old_state, new_state),
            None => change.is_significant(),
        }
    }

    fn ensure_services(&self, domain: &str) {
        match domain {
            domains::SELECT if !self.services.has_service(domain, SERVICE_SELECT_OPTION) => {
                let platforms = self.platforms.clone();
                self.services
                    .register(domains::SELECT, SERVICE_SELECT_OPTION, move |call| {
                        handle_select_option(platforms.clone(), call)
                    });
            }
            domains::NUMBER if !self.services.has_service(domain, SERVICE_SET_VALUE) => {
                let platforms = self.platforms.clone();
                self.services
                    .register(domains::NUMBER, SERVICE_SET_VALUE, move |call| {
                        handle_set_value(platforms.clone(), call)
                    });
            }
            _ => {}
        }
    }
}

fn target_platforms(
    platforms: &PlatformIndex,
    call: &ServiceCall,
) -> Result<Vec<(String, Arc<EntityPlatform>)>, ServiceError> {
    let entity_ids = call.entity_ids();
    if entity_ids.is_empty() {
        return Err(ServiceError::InvalidData("entity_id required".into()));
    }

    entity_ids
        .into_iter()
        .map(|entity_id| {
            let platform = platforms
                .get(&entity_id)
                .map(|p| Arc::clone(&p))
                .ok_or_else(|| ServiceError::InvalidData(format!("unknown entity {}", entity_id)))?;
            Ok((entity_id, platform))
        })
        .collect()
}

async fn handle_select_option(platforms: PlatformIndex, call: ServiceCall) -> ServiceResult {
    let option: String = call
        .get("option")
        .ok_or_else(|| ServiceError::InvalidData("option required".into()))?;

    for (entity_id, platform) in target_platforms(&platforms, &call)? {
        debug!(entity_id = %entity_id, option = %option, "select_option");
        platform
            .select_option(&entity_id, &option, call.context.child())
            .await
            .map_err(service_error)?;
    }
    Ok(())
}

async fn handle_set_value(platforms: PlatformIndex, call: ServiceCall) -> ServiceResult {
    let value: f64 = call
        .get("value")
        .ok_or_else(|| ServiceError::InvalidData("numeric value required".into()))?;

    for (entity_id, platform) in target_platforms(&platforms, &call)? {
        debug!(entity_id = %entity_id, value, "set_value");
        platform
            .set_value(&entity_id, value, call.context.child())
            .await
            .map_err(service_error)?;
    }
    Ok(())
}

fn service_error(err: EntityError) -> ServiceError {
    match err {
        EntityError::Failed(reason) => ServiceError::CallFailed(reason),
        other => ServiceError::InvalidData(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_registry::DeviceInfo;
    use crate::entity::{Entity, EntityResult, SelectEntity};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use sunspec_core::{Context, State};
    use tempfile::TempDir;

    struct Mode {
        current: Mutex<String>,
        restored: Mutex<Option<String>>,
    }

    impl Mode {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                current: Mutex::new("AUTO".into()),
                restored: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Entity for Mode {
        fn unique_id(&self) -> String {
            "entry_mode".into()
        }
        fn name(&self) -> Option<String> {
            Some("Storage Mode".into())
        }
        fn device_info(&self) -> Option<DeviceInfo> {
            Some(DeviceInfo {
                identifiers: vec![("sunspec".into(), "entry_storage".into())],
                name: Some("Storage".into()),
                ..Default::default()
            })
        }
        async fn added_to_hass(&self, last_state: Option<State>) {
            *self.restored.lock().unwrap() = last_state.map(|s| s.state);
        }
    }

    #[async_trait]
    impl SelectEntity for Mode {
        fn options(&self) -> Vec<String> {
            vec!["AUTO".into(), "MANUAL".into()]
        }
        fn current_option(&self) -> Option<String> {
            Some(self.current.lock().unwrap().clone())
        }
        async fn select_option(&self, option: &str) -> EntityResult<()> {
            *self.current.lock().unwrap() = option.to_string();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_select_service_round_trip() {
        let dir = TempDir::new().unwrap();
        let hass = Hass::new(dir.path());
        let platform = hass.platform("sunspec", domains::SELECT, "entry");

        let added = hass
            .async_add_entities(&platform, vec![PlatformEntity::Select(Mode::new())])
            .await;
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].to_string(), "select.storage_mode");
        assert_eq!(hass.devices.len(), 1);

        let state = hass.states.get("select.storage_mode").unwrap();
        assert_eq!(state.state, "AUTO");
        assert_eq!(state.attributes["options"], json!(["AUTO", "MANUAL"]));

        hass.services
            .call(
                "select",
                "select_option",
                json!({"entity_id": "select.storage_mode", "option": "MANUAL"}),
                Context::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            hass.states.get_state("select.storage_mode").as_deref(),
            Some("MANUAL")
        );

        let err = hass
            .services
            .call(
                "select",
                "select_option",
                json!({"entity_id": "select.storage_mode", "option": "TURBO"}),
                Context::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidData(_)));
        assert_eq!(
            hass.states.get_state("select.storage_mode").as_deref(),
            Some("MANUAL")
        );
    }

    #[tokio::test]
    async fn test_duplicate_unique_id_is_skipped() {
        let dir = TempDir::new().unwrap();
        let hass = Hass::new(dir.path());
        let platform = hass.platform("sunspec", domains::SELECT, "entry");

        hass.async_add_entities(&platform, vec![PlatformEntity::Select(Mode::new())])
            .await;
        let again = hass
            .async_add_entities(&platform, vec![PlatformEntity::Select(Mode::new())])
            .await;
        assert!(again.is_empty());
        assert_eq!(platform.entity_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_restart_restores_state_and_entity_id() {
        let dir = TempDir::new().unwrap();

        let hass = Hass::new(dir.path());
        let platform = hass.platform("sunspec", domains::SELECT, "entry");
        let mode = Mode::new();
        hass.async_add_entities(&platform, vec![PlatformEntity::Select(mode.clone())])
            .await;
        platform
            .select_option("select.storage_mode", "MANUAL", Context::new())
            .await
            .unwrap();
        hass.save().await.unwrap();

        let hass = Hass::new(dir.path());
        hass.load().await.unwrap();
        let platform = hass.platform("sunspec", domains::SELECT, "entry");
        let mode = Mode::new();
        let added = hass
            .async_add_entities(&platform, vec![PlatformEntity::Select(mode.clone())])
            .await;

        assert_eq!(added[0].to_string(), "select.storage_mode");
        assert_eq!(mode.restored.lock().unwrap().as_deref(), Some("MANUAL"));
    }

    #[tokio::test]
    async fn test_remove_platform() {
        let dir = TempDir::new().unwrap();
        let hass = Hass::new(dir.path());
        let platform = hass.platform("sunspec", domains::SELECT, "entry");
        hass.async_add_entities(&platform, vec![PlatformEntity::Select(Mode::new())])
            .await;

        hass.remove_platform(&platform);
        assert!(hass.states.get("select.storage_mode").is_none());
        assert!(hass.platform_for("select.storage_mode").is_none());
        assert!(hass.entities.get("select.storage_mode").is_some());

        let err = hass
            .services
            .call(
                "select",
                "select_option",
                json!({"entity_id": "select.storage_mode", "option": "AUTO"}),
                Context::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidData(_)));
    }
}
