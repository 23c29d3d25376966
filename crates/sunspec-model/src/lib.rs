//! SunSpec model data interface
//!
//! The integration never talks to a device directly. It reads decoded point
//! values and their metadata through [`ModelWrapper`], asks the device to
//! persist staged values through [`SunSpecApi`], and observes refreshed
//! snapshots through the [`Coordinator`].
//!
//! # Key Types
//!
//! - [`PointMeta`] / [`GroupMeta`] - Point and model metadata
//! - [`PointValue`] - A decoded or raw point value
//! - [`ModelWrapper`] - Access to one model's points across its instances
//! - [`SunSpecApi`] - Device reads and writes
//! - [`Coordinator`] - Latest data snapshot and refresh notifications
//! - [`MemoryApi`] / [`MemoryModel`] - In-memory device used by tests and fixtures

pub mod api;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod meta;
pub mod value;
pub mod wrapper;

pub use api::SunSpecApi;
pub use coordinator::Coordinator;
pub use error::{ModelError, ModelResult};
pub use memory::{
    DeviceFixture, MemoryApi, MemoryModel, MemoryModelBuilder, ModelFixture, PointFixture,
};
pub use meta::{Access, CommonModel, GroupMeta, PointMeta, PointType, ScaleFactorRef, Symbol};
pub use value::PointValue;
pub use wrapper::{ModelData, ModelWrapper};
