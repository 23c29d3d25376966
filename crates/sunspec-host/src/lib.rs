//! Host platform slice for the SunSpec integration
//!
//! The parts of a home-automation host that an entity integration touches:
//!
//! - [`StateStore`] - current entity states and change notifications
//! - [`ServiceRegistry`] - async service handlers
//! - [`EntityRegistry`] / [`DeviceRegistry`] - stable ids and device grouping
//! - [`RestoreStateStore`] - last states from the previous run
//! - [`EntityPlatform`] - registers entities and writes their states
//! - [`Hass`] - bundles all of the above for one config directory

pub mod config_entry;
pub mod device_registry;
pub mod entity;
pub mod entity_registry;
pub mod hass;
pub mod platform;
pub mod restore_state;
pub mod services;
pub mod state_store;
pub mod storage;

pub use config_entry::{ConfigEntry, ConfigEntryState};
pub use device_registry::{DeviceEntry, DeviceInfo, DeviceRegistry};
pub use entity::{
    format_number, format_state_value, Attributes, Entity, EntityError, EntityResult,
    NumberEntity, NumberMode, PlatformEntity, SelectEntity, SensorDeviceClass, SensorEntity,
    SensorStateClass,
};
pub use entity_registry::{EntityEntry, EntityRegistration, EntityRegistry};
pub use hass::{Hass, SERVICE_SELECT_OPTION, SERVICE_SET_VALUE};
pub use platform::{EntityPlatform, PlatformHost};
pub use restore_state::RestoreStateStore;
pub use services::{ServiceError, ServiceRegistry, ServiceResult};
pub use state_store::StateStore;
pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};
