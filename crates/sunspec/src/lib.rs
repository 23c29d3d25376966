//! SunSpec integration
//!
//! Turns the points of a SunSpec device into host entities. Read-only points
//! become sensors, writable enumerated points become selects and other
//! writable numeric points become numbers. All three platforms of an entry
//! share one [`Coordinator`]; every refresh rewrites their states.

pub mod config;
pub mod constants;
pub mod entity;
pub mod error;
pub mod number;
pub mod select;
pub mod sensor;
pub mod units;

use std::sync::Arc;

use sunspec_core::EntityId;
use sunspec_host::{ConfigEntry, ConfigEntryState, EntityPlatform, Hass, PlatformEntity};
use sunspec_model::{Coordinator, ModelData};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use config::SunSpecOptions;
pub use constants::DOMAIN;
pub use entity::{EntryContext, SunSpecEntity};
pub use error::{SetupError, SetupResult};
pub use number::SunSpecNumber;
pub use select::SunSpecSelect;
pub use sensor::SunSpecSensor;

/// A set up config entry
pub struct SunSpecEntry {
    pub options: SunSpecOptions,
    pub coordinator: Arc<Coordinator>,
    platforms: Vec<Arc<EntityPlatform>>,
    listener: JoinHandle<()>,
}

impl std::fmt::Debug for SunSpecEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SunSpecEntry")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SunSpecEntry {
    /// Entity platforms in sensor, select, number order
    pub fn platforms(&self) -> &[Arc<EntityPlatform>] {
        &self.platforms
    }

    /// Entity ids of one platform domain
    pub fn entity_ids(&self, domain: &str) -> Vec<EntityId> {
        self.platforms
            .iter()
            .filter(|p| p.domain() == domain)
            .flat_map(|p| p.entity_ids())
            .collect()
    }
}

type Factory = fn(SunSpecEntity) -> Option<PlatformEntity>;

/// Set up a config entry against a device
///
/// The entry ends up `Loaded` on success and `SetupError` (with the error
/// as reason) on failure.
pub async fn async_setup_entry(
    hass: &Hass,
    entry: &mut ConfigEntry,
    coordinator: Arc<Coordinator>,
) -> SetupResult<SunSpecEntry> {
    if entry.is_loaded() {
        return Err(SetupError::AlreadyLoaded(entry.entry_id.clone()));
    }

    match setup(hass, entry, coordinator).await {
        Ok(loaded) => {
            entry.set_state(ConfigEntryState::Loaded, None);
            info!(
                "Setup completed for entry: {} ({})",
                entry.title, entry.entry_id
            );
            Ok(loaded)
        }
        Err(err) => {
            warn!("Setup failed for entry {}: {}", entry.entry_id, err);
            entry.set_state(ConfigEntryState::SetupError, Some(err.to_string()));
            Err(err)
        }
    }
}

async fn setup(
    hass: &Hass,
    entry: &ConfigEntry,
    coordinator: Arc<Coordinator>,
) -> SetupResult<SunSpecEntry> {
    let options = SunSpecOptions::from_entry(entry)?;

    if coordinator.data().is_empty() {
        coordinator.async_config_entry_first_refresh().await?;
    }
    let device = coordinator.device_info().await?;

    let ctx = EntryContext {
        entry_id: entry.entry_id.clone(),
        prefix: options.prefix.clone(),
        coordinator: Arc::clone(&coordinator),
        device: Arc::new(device),
    };
    let data = coordinator.data();

    let [sensors, selects, numbers] =
        constants::PLATFORMS.map(|domain| hass.platform(DOMAIN, domain, &entry.entry_id));

    // Subscribe before adding so no refresh is missed
    let updates = coordinator.subscribe();

    let (sensor_ids, select_ids, number_ids) = futures::join!(
        hass.async_add_entities(&sensors, build(&ctx, &data, &options, sensor::create)),
        hass.async_add_entities(&selects, build(&ctx, &data, &options, select::create)),
        hass.async_add_entities(&numbers, build(&ctx, &data, &options, number::create)),
    );
    info!(
        entry_id = %entry.entry_id,
        unit_id = options.unit_id,
        sensors = sensor_ids.len(),
        selects = select_ids.len(),
        numbers = number_ids.len(),
        "Added SunSpec entities"
    );

    let platforms = vec![sensors, selects, numbers];
    let listener = tokio::spawn(refresh_listener(updates, platforms.clone()));

    Ok(SunSpecEntry {
        options,
        coordinator,
        platforms,
        listener,
    })
}

/// Create one platform's entities for every selected model, point and
/// instance
fn build(
    ctx: &EntryContext,
    data: &ModelData,
    options: &SunSpecOptions,
    create: Factory,
) -> Vec<PlatformEntity> {
    let mut entities = Vec::new();
    for (model_id, model) in data {
        if !options.includes_model(*model_id) {
            debug!(model_id, "Skipping model excluded by options");
            continue;
        }
        for key in model.keys() {
            for index in 0..model.num_models() {
                let Some(base) = SunSpecEntity::new(ctx, model.as_ref(), &key, index) else {
                    continue;
                };
                match create(base) {
                    Some(entity) => {
                        debug!(model_id, key = %key, index, "Adding {}", entity.domain());
                        entities.push(entity);
                    }
                    None => debug!(model_id, key = %key, index, "Skipping entity"),
                }
            }
        }
    }
    entities
}

async fn refresh_listener(mut updates: watch::Receiver<u64>, platforms: Vec<Arc<EntityPlatform>>) {
    while updates.changed().await.is_ok() {
        let generation = *updates.borrow_and_update();
        debug!(generation, "Coordinator refreshed, updating states");
        for platform in &platforms {
            platform.update_all();
        }
    }
}

/// Unload a config entry: stop listening for refreshes and remove its states
///
/// Registry entries are kept so a later setup reuses the same entity ids.
pub async fn async_unload_entry(hass: &Hass, entry: &mut ConfigEntry, loaded: SunSpecEntry) -> bool {
    loaded.listener.abort();
    if let Err(err) = loaded.listener.await {
        if !err.is_cancelled() {
            warn!("Refresh listener for {} failed: {}", entry.entry_id, err);
        }
    }

    for platform in &loaded.platforms {
        hass.remove_platform(platform);
    }

    entry.set_state(ConfigEntryState::NotLoaded, None);
    info!("Unloaded entry: {} ({})", entry.title, entry.entry_id);
    true
}
