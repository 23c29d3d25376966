//! Entity platform
//!
//! One [`EntityPlatform`] exists per (integration, domain, config entry). It
//! registers entities and their devices, resolves entity ids, writes states
//! and routes entity actions after validating them.

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use sunspec_core::{slugify, Context, EntityId, State};
use tracing::{debug, info, instrument, warn};

use crate::device_registry::DeviceRegistry;
use crate::entity::{EntityError, EntityResult, PlatformEntity};
use crate::entity_registry::{EntityRegistration, EntityRegistry};
use crate::restore_state::RestoreStateStore;
use crate::state_store::StateStore;

/// Host services a platform writes into
#[derive(Clone)]
pub struct PlatformHost {
    pub states: Arc<StateStore>,
    pub entities: Arc<EntityRegistry>,
    pub devices: Arc<DeviceRegistry>,
    pub restore: Arc<RestoreStateStore>,
}

/// Entities of one domain added by one config entry
pub struct EntityPlatform {
    /// Integration providing the entities
    platform: String,
    domain: &'static str,
    config_entry_id: String,
    host: PlatformHost,
    entities: RwLock<IndexMap<EntityId, PlatformEntity>>,
}

impl EntityPlatform {
    pub fn new(
        platform: impl Into<String>,
        domain: &'static str,
        config_entry_id: impl Into<String>,
        host: PlatformHost,
    ) -> Self {
        Self {
            platform: platform.into(),
            domain,
            config_entry_id: config_entry_id.into(),
            host,
            entities: RwLock::new(IndexMap::new()),
        }
    }

    pub fn domain(&self) -> &'static str {
        self.domain
    }

    pub fn config_entry_id(&self) -> &str {
        &self.config_entry_id
    }

    /// Register entities, hand them their restored state and write their
    /// initial state
    ///
    /// Entities whose unique id is already present on this platform are
    /// skipped. Returns the entity ids that were added.
    #[instrument(skip(self, entities), fields(platform = %self.platform, domain = self.domain))]
    pub async fn add_entities(&self, entities: Vec<PlatformEntity>) -> Vec<EntityId> {
        let mut added = Vec::with_capacity(entities.len());

        for entity in entities {
            if entity.domain() != self.domain {
                warn!(
                    unique_id = %entity.unique_id(),
                    "Entity of domain {} offered to {} platform",
                    entity.domain(),
                    self.domain
                );
                continue;
            }

            let unique_id = entity.unique_id();
            if let Some(existing) = self
                .host
                .entities
                .get_by_unique_id(&self.platform, &unique_id)
            {
                if self.contains(&existing.entity_id) {
                    warn!(
                        unique_id = %unique_id,
                        "Platform {} does not generate unique IDs. ID {} already exists",
                        self.platform,
                        unique_id
                    );
                    continue;
                }
            }

            let device_id = entity.device_info().map(|info| {
                self.host
                    .devices
                    .get_or_create(&self.config_entry_id, &info)
                    .id
                    .clone()
            });

            let name = entity.name();
            let icon = entity.icon();
            let suggested_object_id = slugify(name.as_deref().unwrap_or(&unique_id));
            let entry = self.host.entities.get_or_create(EntityRegistration {
                platform: &self.platform,
                domain: self.domain,
                unique_id: &unique_id,
                suggested_object_id: &suggested_object_id,
                config_entry_id: Some(&self.config_entry_id),
                device_id: device_id.as_deref(),
                original_name: name.as_deref(),
                original_icon: icon.as_deref(),
            });

            let entity_id: EntityId = match entry.entity_id.parse() {
                Ok(id) => id,
                Err(err) => {
                    warn!(entity_id = %entry.entity_id, "Invalid registered entity id: {}", err);
                    continue;
                }
            };

            let last_state = self.host.restore.last_state(&entry.entity_id);
            entity.added_to_hass(last_state).await;

            if let Ok(mut map) = self.entities.write() {
                map.insert(entity_id.clone(), entity);
            }
            self.write_ha_state(&entity_id, Context::new());
            debug!(entity_id = %entity_id, "Added entity");
            added.push(entity_id);
        }

        info!(count = added.len(), "Added {} entities", self.domain);
        added
    }

    fn contains(&self, entity_id: &str) -> bool {
        self.entities
            .read()
            .map(|m| m.keys().any(|id| id.to_string() == entity_id))
            .unwrap_or(false)
    }

    pub fn entity(&self, entity_id: &str) -> Option<PlatformEntity> {
        let id: EntityId = entity_id.parse().ok()?;
        self.entities.read().ok().and_then(|m| m.get(&id).cloned())
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Write an entity's current state to the state store
    pub fn write_ha_state(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let entity = self
            .entities
            .read()
            .ok()
            .and_then(|m| m.get(entity_id).cloned())?;

        let (state, attributes) = entity.render();
        let written = self
            .host
            .states
            .set(entity_id.clone(), state, attributes, context);
        self.host.restore.record(&written);
        Some(written)
    }

    /// Rewrite the state of every entity
    pub fn update_all(&self) {
        let context = Context::new();
        for entity_id in self.entity_ids() {
            self.write_ha_state(&entity_id, context.clone());
        }
    }

    /// Select an option on a select entity
    #[instrument(skip(self, context))]
    pub async fn select_option(
        &self,
        entity_id: &str,
        option: &str,
        context: Context,
    ) -> EntityResult<()> {
        let Some(PlatformEntity::Select(select)) = self.entity(entity_id) else {
            return Err(EntityError::NotFound(entity_id.to_string()));
        };

        let options = select.options();
        if !options.iter().any(|o| o == option) {
            return Err(EntityError::InvalidOption {
                option: option.to_string(),
                options,
            });
        }

        select.select_option(option).await?;
        self.write_parsed(entity_id, context);
        Ok(())
    }

    /// Set the value of a number entity
    #[instrument(skip(self, context))]
    pub async fn set_value(&self, entity_id: &str, value: f64, context: Context) -> EntityResult<()> {
        let Some(PlatformEntity::Number(number)) = self.entity(entity_id) else {
            return Err(EntityError::NotFound(entity_id.to_string()));
        };

        let (min, max) = (number.native_min_value(), number.native_max_value());
        if !value.is_finite() || value < min || value > max {
            return Err(EntityError::OutOfRange { value, min, max });
        }

        number.set_native_value(value).await?;
        self.write_parsed(entity_id, context);
        Ok(())
    }

    fn write_parsed(&self, entity_id: &str, context: Context) {
        if let Ok(id) = entity_id.parse::<EntityId>() {
            self.write_ha_state(&id, context);
        }
    }

    /// Remove every entity's state; registry entries are kept
    pub fn remove_all(&self) -> Vec<EntityId> {
        let removed: Vec<EntityId> = self
            .entities
            .write()
            .map(|mut m| m.drain(..).map(|(id, _)| id).collect())
            .unwrap_or_default();

        let context = Context::new();
        for entity_id in &removed {
            self.host.states.remove(entity_id, context.clone());
        }
        debug!(count = removed.len(), "Removed {} entities", self.domain);
        removed
    }
}
