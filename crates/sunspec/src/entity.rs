//! Base for SunSpec entities
//!
//! Every entity is bound to one point (`key`) of one instance
//! (`model_index`) of one model (`model_id`). The base works out naming,
//! unit, icon and device grouping from the point metadata and reads values
//! from the coordinator's latest snapshot.

use std::sync::Arc;

use serde_json::json;
use sunspec_host::{Attributes, DeviceInfo, EntityError, EntityResult, SensorDeviceClass};
use sunspec_model::{
    CommonModel, Coordinator, GroupMeta, ModelWrapper, PointMeta, PointValue, ScaleFactorRef,
};
use tracing::{debug, warn};

use crate::constants::{DOMAIN, ICON_DC_AMPS};
use crate::units;

/// What every entity of one config entry shares
#[derive(Clone)]
pub struct EntryContext {
    pub entry_id: String,
    pub prefix: String,
    pub coordinator: Arc<Coordinator>,
    pub device: Arc<CommonModel>,
}

/// Point-bound state shared by sensors, selects and numbers
pub struct SunSpecEntity {
    coordinator: Arc<Coordinator>,
    device: Arc<CommonModel>,
    entry_id: String,
    model_id: u16,
    model_index: usize,
    key: String,
    meta: PointMeta,
    group: GroupMeta,
    unique_id: String,
    name: String,
    unit: Option<String>,
    icon: &'static str,
    device_class: Option<SensorDeviceClass>,
}

/// `{entry_id}_{key}-{model_id}-{model_index}`
pub fn unique_id(entry_id: &str, key: &str, model_id: u16, model_index: usize) -> String {
    format!("{}_{}-{}-{}", entry_id, key, model_id, model_index)
}

/// First character upper case, the rest lower case
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

impl SunSpecEntity {
    /// Bind an entity to a point; `None` when the model has no such point
    pub fn new(
        ctx: &EntryContext,
        model: &dyn ModelWrapper,
        key: &str,
        model_index: usize,
    ) -> Option<Self> {
        let meta = model.meta(key)?.clone();
        let group = model.group_meta().clone();
        let model_id = model.model_id();

        let presentation = units::for_point(meta.units.as_deref(), meta.point_type.as_str());

        let mut name = group
            .name
            .clone()
            .unwrap_or_else(|| model_id.to_string());
        if model_index > 0 {
            name = format!("{} {}", name, model_index);
        }
        let key_parts: Vec<&str> = key.split(':').collect();
        if key_parts.len() > 1 {
            name = format!("{} {} {}", name, key_parts[0], key_parts[1]);
        }
        if !ctx.prefix.is_empty() {
            name = format!("{} {}", ctx.prefix, name);
        }
        let label = meta.label.clone().unwrap_or_else(|| key.to_string());
        let name = format!("{} {}", capitalize(&name), label);

        let icon = if presentation.unit.as_deref() == Some("A") && name.contains("DC") {
            ICON_DC_AMPS
        } else {
            presentation.icon
        };

        let unique_id = unique_id(&ctx.entry_id, key, model_id, model_index);
        debug!(
            key,
            model_id,
            prefix = %ctx.prefix,
            name = %name,
            unique_id = %unique_id,
            "Created entity"
        );

        Some(Self {
            coordinator: ctx.coordinator.clone(),
            device: ctx.device.clone(),
            entry_id: ctx.entry_id.clone(),
            model_id,
            model_index,
            key: key.to_string(),
            meta,
            group,
            unique_id,
            name,
            unit: presentation.unit,
            icon,
            device_class: presentation.device_class,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn model_id(&self) -> u16 {
        self.model_id
    }

    pub fn model_index(&self) -> usize {
        self.model_index
    }

    pub fn meta(&self) -> &PointMeta {
        &self.meta
    }

    pub fn unique_id(&self) -> String {
        self.unique_id.clone()
    }

    pub fn name(&self) -> String {
        self.name.clone()
    }

    pub fn unit(&self) -> Option<String> {
        self.unit.clone()
    }

    pub fn icon(&self) -> &'static str {
        self.icon
    }

    pub fn device_class(&self) -> Option<SensorDeviceClass> {
        self.device_class
    }

    /// Entities are available while the last refresh succeeded
    pub fn available(&self) -> bool {
        self.coordinator.last_update_success()
    }

    /// The model group this entity's device is named after
    pub fn device_info(&self) -> DeviceInfo {
        let group_name = self
            .group
            .name
            .clone()
            .unwrap_or_else(|| self.model_id.to_string());

        DeviceInfo {
            identifiers: vec![(
                DOMAIN.to_string(),
                format!("{}_{}", self.entry_id, group_name),
            )],
            name: self.group.label.clone().or(Some(group_name)),
            manufacturer: self.device.manufacturer.clone(),
            model: self.device.model.clone(),
            sw_version: self.device.version.clone(),
        }
    }

    fn model(&self) -> Option<Arc<dyn ModelWrapper>> {
        match self.coordinator.model(self.model_id) {
            Ok(model) => Some(model),
            Err(err) => {
                warn!(key = %self.key, "Model {} not found: {}", self.model_id, err);
                None
            }
        }
    }

    /// Decoded value from the latest snapshot
    ///
    /// Lookup and decode errors are logged and reported as no value.
    pub fn value(&self) -> Option<PointValue> {
        match self.model()?.value(&self.key, self.model_index) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    key = %self.key,
                    model_id = self.model_id,
                    "Error retrieving calculated value: {}",
                    err
                );
                None
            }
        }
    }

    /// Raw value from the latest snapshot
    pub fn raw_value(&self) -> Option<PointValue> {
        self.model()?
            .raw_value(&self.key, self.model_index)
            .ok()
            .flatten()
    }

    /// Scale factor exponent applied to this point's raw values
    pub fn scale(&self) -> i32 {
        match &self.meta.sf {
            Some(ScaleFactorRef::Fixed(exponent)) => *exponent,
            Some(ScaleFactorRef::Point(name)) => self
                .model()
                .and_then(|model| model.value(name, self.model_index).ok().flatten())
                .and_then(|v| v.as_i64())
                .and_then(|v| i32::try_from(v).ok())
                .unwrap_or(0),
            None => 0,
        }
    }

    /// Attributes every SunSpec entity carries
    pub fn base_attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("integration".into(), json!(DOMAIN));
        attrs.insert("sunspec_key".into(), json!(self.key));
        if let Some(label) = &self.meta.label {
            attrs.insert("label".into(), json!(label));
        }
        attrs.insert(
            "raw".into(),
            self.raw_value()
                .map(|v| v.to_json())
                .unwrap_or(serde_json::Value::Null),
        );
        if let Some(desc) = &self.meta.desc {
            attrs.insert("description".into(), json!(desc));
        }
        attrs
    }

    /// Stage a value, write the model instance to the device and refresh
    pub async fn write(&self, value: PointValue) -> EntityResult<()> {
        let model = self
            .coordinator
            .model(self.model_id)
            .map_err(|e| EntityError::Failed(e.to_string()))?;

        debug!(key = %self.key, value = %value, "Writing");
        model
            .set_value(&self.key, value, self.model_index)
            .map_err(|e| EntityError::Failed(e.to_string()))?;
        self.coordinator
            .api()
            .write(self.model_id, self.model_index)
            .await
            .map_err(|e| EntityError::Failed(e.to_string()))?;

        if let Err(err) = self.coordinator.async_refresh().await {
            debug!(key = %self.key, "Refresh after write failed: {}", err);
        }
        debug!(key = %self.key, value = ?self.value(), "Value after write");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use sunspec_model::{
        Access, MemoryApi, MemoryModel, ModelData, ModelError, ModelResult, SunSpecApi,
    };
    use tokio_test::{assert_err, assert_ok};

    fn context(prefix: &str, api: MemoryApi) -> EntryContext {
        let device = CommonModel {
            manufacturer: Some("SunSpecTest".into()),
            model: Some("TestInverter-1".into()),
            version: Some("1.2.3".into()),
            ..Default::default()
        };
        EntryContext {
            entry_id: "entry1".into(),
            prefix: prefix.into(),
            coordinator: Arc::new(Coordinator::new("test", Arc::new(api))),
            device: Arc::new(device),
        }
    }

    fn mppt() -> MemoryModel {
        MemoryModel::builder(160, "mppt")
            .label("Multiple MPPT")
            .instances(2)
            .scaled_point(
                PointMeta::new("module:0:DCA", "uint16")
                    .with_units("A")
                    .with_label("DC Current")
                    .with_desc("Module DC current"),
                -2,
                vec![Some(PointValue::Int(512)), Some(PointValue::Int(498))],
            )
            .point(
                PointMeta::new("Evt", "bitfield32"),
                vec![Some(PointValue::Int(0)), None],
            )
            .build()
    }

    async fn ready(prefix: &str) -> (EntryContext, Arc<dyn ModelWrapper>) {
        let ctx = context(prefix, MemoryApi::new(CommonModel::default()).with_model(mppt()));
        ctx.coordinator.async_refresh().await.unwrap();
        let model = ctx.coordinator.model(160).unwrap();
        (ctx, model)
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("roof inverter"), "Roof inverter");
        assert_eq!(capitalize("MPPT Module"), "Mppt module");
        assert_eq!(capitalize(""), "");
    }

    #[tokio::test]
    async fn test_naming_and_ids() {
        let (ctx, model) = ready("Roof").await;

        let first = SunSpecEntity::new(&ctx, model.as_ref(), "module:0:DCA", 0).unwrap();
        assert_eq!(first.name(), "Roof mppt module 0 DC Current");
        assert_eq!(first.unique_id(), "entry1_module:0:DCA-160-0");
        assert_eq!(first.icon(), ICON_DC_AMPS);
        assert_eq!(first.unit().as_deref(), Some("A"));
        assert_eq!(first.device_class(), Some(SensorDeviceClass::Current));

        let second = SunSpecEntity::new(&ctx, model.as_ref(), "module:0:DCA", 1).unwrap();
        assert_eq!(second.name(), "Roof mppt 1 module 0 DC Current");
        assert_eq!(second.unique_id(), "entry1_module:0:DCA-160-1");

        let (ctx, model) = ready("").await;
        let events = SunSpecEntity::new(&ctx, model.as_ref(), "Evt", 0).unwrap();
        assert_eq!(events.name(), "Mppt Evt");
        assert!(SunSpecEntity::new(&ctx, model.as_ref(), "Missing", 0).is_none());
    }

    #[tokio::test]
    async fn test_device_info_and_attributes() {
        let (ctx, model) = ready("").await;
        let entity = SunSpecEntity::new(&ctx, model.as_ref(), "module:0:DCA", 1).unwrap();

        let info = entity.device_info();
        assert_eq!(
            info.identifiers,
            vec![("sunspec".to_string(), "entry1_mppt".to_string())]
        );
        assert_eq!(info.name.as_deref(), Some("Multiple MPPT"));
        assert_eq!(info.manufacturer.as_deref(), Some("SunSpecTest"));
        assert_eq!(info.model.as_deref(), Some("TestInverter-1"));
        assert_eq!(info.sw_version.as_deref(), Some("1.2.3"));

        let attrs = entity.base_attributes();
        assert_eq!(attrs["integration"], json!("sunspec"));
        assert_eq!(attrs["sunspec_key"], json!("module:0:DCA"));
        assert_eq!(attrs["label"], json!("DC Current"));
        assert_eq!(attrs["raw"], json!(498));
        assert_eq!(attrs["description"], json!("Module DC current"));
        assert_eq!(entity.scale(), -2);

        let value = entity.value().and_then(|v| v.as_f64()).unwrap();
        assert!((value - 4.98).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_model_yields_no_value() {
        let (ctx, model) = ready("").await;
        let entity = SunSpecEntity::new(&ctx, model.as_ref(), "Evt", 1).unwrap();
        assert_eq!(entity.value(), None);

        // Device stops reporting the model
        let empty = EntryContext {
            coordinator: Arc::new(Coordinator::new(
                "empty",
                Arc::new(MemoryApi::new(CommonModel::default())),
            )),
            ..ctx
        };
        let orphan = SunSpecEntity::new(&empty, model.as_ref(), "Evt", 0).unwrap();
        assert_eq!(orphan.value(), None);
        assert_eq!(orphan.raw_value(), None);
        assert!(!orphan.available());
    }

    #[tokio::test]
    async fn test_write_goes_through_device() {
        let api = Arc::new(
            MemoryApi::new(CommonModel::default()).with_model(
                MemoryModel::builder(123, "controls")
                    .point(
                        PointMeta::new("WMaxLimPct", "uint16")
                            .with_units("%")
                            .with_access(Access::RW),
                        vec![Some(PointValue::Int(100))],
                    )
                    .build(),
            ),
        );
        let coordinator = Arc::new(Coordinator::new("test", api.clone()));
        coordinator.async_refresh().await.unwrap();
        let ctx = EntryContext {
            entry_id: "entry1".into(),
            prefix: String::new(),
            coordinator: coordinator.clone(),
            device: Arc::new(CommonModel::default()),
        };
        let model = coordinator.model(123).unwrap();
        let entity = SunSpecEntity::new(&ctx, model.as_ref(), "WMaxLimPct", 0).unwrap();

        entity.write(PointValue::Int(60)).await.unwrap();
        assert_eq!(api.writes(), vec![(123, 0)]);
        assert_eq!(entity.value(), Some(PointValue::Int(60)));

        let err = entity.write(PointValue::Int(70_000)).await.unwrap_err();
        assert!(matches!(err, EntityError::Failed(_)));
        assert_eq!(api.writes().len(), 1);
    }

    /// Device that accepts writes while its reads time out
    struct FailingReads {
        inner: MemoryApi,
        failing: AtomicBool,
    }

    #[async_trait]
    impl SunSpecApi for FailingReads {
        async fn device_info(&self) -> ModelResult<CommonModel> {
            self.inner.device_info().await
        }

        async fn read(&self) -> ModelResult<ModelData> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ModelError::Device("read timed out".into()));
            }
            self.inner.read().await
        }

        async fn write(&self, model_id: u16, index: usize) -> ModelResult<()> {
            self.inner.write(model_id, index).await
        }
    }

    #[tokio::test]
    async fn test_write_survives_failed_refresh() {
        let api = Arc::new(FailingReads {
            inner: MemoryApi::new(CommonModel::default()).with_model(
                MemoryModel::builder(123, "controls")
                    .point(
                        PointMeta::new("WMaxLimPct", "uint16").with_access(Access::RW),
                        vec![Some(PointValue::Int(100))],
                    )
                    .build(),
            ),
            failing: AtomicBool::new(false),
        });
        let coordinator = Arc::new(Coordinator::new("test", api.clone()));
        assert_ok!(coordinator.async_refresh().await);
        let ctx = EntryContext {
            entry_id: "entry1".into(),
            prefix: String::new(),
            coordinator: coordinator.clone(),
            device: Arc::new(CommonModel::default()),
        };
        let model = coordinator.model(123).unwrap();
        let entity = SunSpecEntity::new(&ctx, model.as_ref(), "WMaxLimPct", 0).unwrap();

        api.failing.store(true, Ordering::SeqCst);
        assert_ok!(entity.write(PointValue::Int(40)).await);

        assert_eq!(api.inner.writes(), vec![(123, 0)]);
        assert!(!entity.available());
        assert_err!(coordinator.async_refresh().await);

        api.failing.store(false, Ordering::SeqCst);
        assert_ok!(coordinator.async_refresh().await);
        assert_eq!(entity.value(), Some(PointValue::Int(40)));
    }
}
