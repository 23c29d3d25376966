//! In-memory device
//!
//! A device whose register values live in memory. Used by tests and by the
//! CLI to exercise the integration against YAML fixtures without hardware.
//! Values set through [`ModelWrapper::set_value`] are staged until the API
//! writes the model instance, the same way a real device only changes after
//! a register write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    CommonModel, GroupMeta, ModelData, ModelError, ModelResult, ModelWrapper, PointMeta,
    PointType, PointValue, ScaleFactorRef, SunSpecApi,
};

type Slot = (String, usize);

/// One SunSpec model held in memory
pub struct MemoryModel {
    model_id: u16,
    group: GroupMeta,
    instances: usize,
    points: IndexMap<String, PointMeta>,
    /// Raw values as the device holds them
    device: RwLock<HashMap<Slot, PointValue>>,
    /// Raw values waiting for the next write
    staged: RwLock<HashMap<Slot, PointValue>>,
}

/// Builder for [`MemoryModel`]
pub struct MemoryModelBuilder {
    model: MemoryModel,
    device: HashMap<Slot, PointValue>,
}

impl MemoryModelBuilder {
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.model.group.label = Some(label.into());
        self
    }

    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.model.group.desc = Some(desc.into());
        self
    }

    /// Number of repeating instances of the model
    pub fn instances(mut self, instances: usize) -> Self {
        self.model.instances = instances.max(1);
        self
    }

    /// Add an unscaled point with one raw value per instance
    pub fn point(self, meta: PointMeta, raw: Vec<Option<PointValue>>) -> Self {
        self.scaled_point(meta, 0, raw)
    }

    /// Add a point whose decoded value is `raw * 10^scale`
    ///
    /// The exponent is recorded as the point's fixed scale factor when the
    /// metadata does not already carry one. A metadata `sf` naming a
    /// `sunssf` point takes precedence over `scale`.
    pub fn scaled_point(mut self, mut meta: PointMeta, scale: i32, raw: Vec<Option<PointValue>>) -> Self {
        if scale != 0 && meta.sf.is_none() {
            meta.sf = Some(ScaleFactorRef::Fixed(scale));
        }
        let key = meta.name.clone();
        for (index, value) in raw.into_iter().enumerate() {
            if let Some(value) = value {
                self.device.insert((key.clone(), index), value);
            }
        }
        self.model.points.insert(key, meta);
        self
    }

    pub fn build(mut self) -> MemoryModel {
        self.model.device = RwLock::new(self.device);
        self.model
    }
}

impl MemoryModel {
    /// Start building a model with the given id and group name
    pub fn builder(model_id: u16, name: impl Into<String>) -> MemoryModelBuilder {
        MemoryModelBuilder {
            model: MemoryModel {
                model_id,
                group: GroupMeta {
                    name: Some(name.into()),
                    label: None,
                    desc: None,
                },
                instances: 1,
                points: IndexMap::new(),
                device: RwLock::new(HashMap::new()),
                staged: RwLock::new(HashMap::new()),
            },
            device: HashMap::new(),
        }
    }

    fn point(&self, key: &str, index: usize) -> ModelResult<&PointMeta> {
        let point = self
            .points
            .get(key)
            .ok_or_else(|| ModelError::PointNotFound(key.to_string()))?;
        if index >= self.instances {
            return Err(ModelError::InstanceOutOfRange {
                key: key.to_string(),
                index,
                count: self.instances,
            });
        }
        Ok(point)
    }

    /// Change a raw value as if the device itself had changed it
    pub fn set_device_value(&self, key: &str, index: usize, raw: Option<PointValue>) -> ModelResult<()> {
        self.point(key, index)?;
        if let Ok(mut device) = self.device.write() {
            match raw {
                Some(raw) => device.insert((key.to_string(), index), raw),
                None => device.remove(&(key.to_string(), index)),
            };
        }
        Ok(())
    }

    /// Apply every staged value of one instance to the device values
    ///
    /// Returns the number of points written.
    pub fn commit(&self, index: usize) -> usize {
        let pending: Vec<(Slot, PointValue)> = match self.staged.write() {
            Ok(mut staged) => {
                let keys: Vec<Slot> = staged.keys().filter(|(_, i)| *i == index).cloned().collect();
                keys.into_iter()
                    .filter_map(|slot| staged.remove(&slot).map(|v| (slot, v)))
                    .collect()
            }
            Err(_) => return 0,
        };

        let count = pending.len();
        if let Ok(mut device) = self.device.write() {
            device.extend(pending);
        }
        count
    }

    /// Scale factor exponent of a point in one instance
    ///
    /// A named factor is read from the device value of its `sunssf` point;
    /// an unimplemented factor counts as 0.
    fn scale(&self, meta: &PointMeta, index: usize) -> i32 {
        match &meta.sf {
            Some(ScaleFactorRef::Fixed(exponent)) => *exponent,
            Some(ScaleFactorRef::Point(name)) => self
                .device
                .read()
                .ok()
                .and_then(|device| device.get(&(name.clone(), index)).and_then(PointValue::as_i64))
                .and_then(|v| i32::try_from(v).ok())
                .unwrap_or(0),
            None => 0,
        }
    }

    fn decode(key: &str, scale: i32, raw: &PointValue) -> ModelResult<PointValue> {
        let value = match raw {
            PointValue::Text(_) => return Ok(raw.clone()),
            PointValue::Int(v) if scale == 0 => return Ok(PointValue::Int(*v)),
            PointValue::Int(v) => *v as f64 * 10f64.powi(scale),
            PointValue::Float(v) => *v * 10f64.powi(scale),
        };
        if !value.is_finite() {
            return Err(ModelError::Overflow(key.to_string()));
        }
        Ok(PointValue::Float(value))
    }

    fn encode(key: &str, meta: &PointMeta, scale: i32, value: PointValue) -> ModelResult<PointValue> {
        let invalid = |reason: String| ModelError::InvalidValue {
            key: key.to_string(),
            reason,
        };

        if meta.point_type.is_text() {
            return match value {
                PointValue::Text(_) => Ok(value),
                other => Err(invalid(format!("expected text, got {}", other))),
            };
        }

        let (min, max) = meta
            .point_type
            .value_range()
            .ok_or_else(|| invalid(format!("type {} is not writable", meta.point_type)))?;
        let number = value
            .as_f64()
            .ok_or_else(|| invalid(format!("expected a number, got '{}'", value)))?;
        let raw = number / 10f64.powi(scale);
        if !raw.is_finite() {
            return Err(ModelError::Overflow(key.to_string()));
        }

        match meta.point_type {
            PointType::Float32 | PointType::Float64 => Ok(PointValue::Float(raw)),
            _ => {
                let raw = raw.round();
                if raw < min || raw > max {
                    return Err(invalid(format!("{} outside {}..={}", number, min, max)));
                }
                Ok(PointValue::Int(raw as i64))
            }
        }
    }
}

impl ModelWrapper for MemoryModel {
    fn model_id(&self) -> u16 {
        self.model_id
    }

    fn keys(&self) -> Vec<String> {
        self.points.keys().cloned().collect()
    }

    fn num_models(&self) -> usize {
        self.instances
    }

    fn group_meta(&self) -> &GroupMeta {
        &self.group
    }

    fn meta(&self, key: &str) -> Option<&PointMeta> {
        self.points.get(key)
    }

    fn value(&self, key: &str, index: usize) -> ModelResult<Option<PointValue>> {
        let meta = self.point(key, index)?;
        match self.raw_value(key, index)? {
            Some(raw) => Self::decode(key, self.scale(meta, index), &raw).map(Some),
            None => Ok(None),
        }
    }

    fn raw_value(&self, key: &str, index: usize) -> ModelResult<Option<PointValue>> {
        self.point(key, index)?;
        Ok(self
            .device
            .read()
            .ok()
            .and_then(|device| device.get(&(key.to_string(), index)).cloned()))
    }

    fn set_value(&self, key: &str, value: PointValue, index: usize) -> ModelResult<()> {
        let meta = self.point(key, index)?;
        let raw = Self::encode(key, meta, self.scale(meta, index), value)?;
        debug!(model = self.model_id, key, index, raw = %raw, "Staged value");
        if let Ok(mut staged) = self.staged.write() {
            staged.insert((key.to_string(), index), raw);
        }
        Ok(())
    }
}

/// A device API backed by [`MemoryModel`]s
pub struct MemoryApi {
    common: CommonModel,
    models: IndexMap<u16, Arc<MemoryModel>>,
    writes: Mutex<Vec<(u16, usize)>>,
    online: AtomicBool,
}

impl MemoryApi {
    pub fn new(common: CommonModel) -> Self {
        Self {
            common,
            models: IndexMap::new(),
            writes: Mutex::new(Vec::new()),
            online: AtomicBool::new(true),
        }
    }

    pub fn with_model(mut self, model: MemoryModel) -> Self {
        self.models.insert(model.model_id, Arc::new(model));
        self
    }

    /// Get a model to inspect or change device values
    pub fn model(&self, model_id: u16) -> Option<Arc<MemoryModel>> {
        self.models.get(&model_id).cloned()
    }

    /// Simulate the device going offline or coming back
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Every (model id, instance) written so far
    pub fn writes(&self) -> Vec<(u16, usize)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    fn ensure_online(&self) -> ModelResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ModelError::Device("device is offline".to_string()))
        }
    }
}

#[async_trait]
impl SunSpecApi for MemoryApi {
    async fn device_info(&self) -> ModelResult<CommonModel> {
        self.ensure_online()?;
        Ok(self.common.clone())
    }

    async fn read(&self) -> ModelResult<ModelData> {
        self.ensure_online()?;
        Ok(self
            .models
            .iter()
            .map(|(id, model)| (*id, Arc::clone(model) as Arc<dyn ModelWrapper>))
            .collect())
    }

    async fn write(&self, model_id: u16, index: usize) -> ModelResult<()> {
        self.ensure_online()?;
        let model = self
            .models
            .get(&model_id)
            .ok_or(ModelError::ModelNotFound(model_id))?;
        let written = model.commit(index);
        debug!(model = model_id, index, points = written, "Wrote model instance");
        if let Ok(mut writes) = self.writes.lock() {
            writes.push((model_id, index));
        }
        Ok(())
    }
}

/// A device described in YAML
///
/// ```yaml
/// common:
///   Mn: SunSpecTest
///   Md: Test-1
///   Vr: "1.0"
/// models:
///   - id: 103
///     name: inverter
///     label: Inverter (Three Phase)
///     points:
///       - name: W
///         type: int16
///         units: W
///         scale: 1
///         values: [152]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceFixture {
    #[serde(default)]
    pub common: CommonModel,
    #[serde(default)]
    pub models: Vec<ModelFixture>,
}

/// A model in a [`DeviceFixture`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFixture {
    pub id: u16,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default = "default_instances")]
    pub instances: usize,
    #[serde(default)]
    pub points: Vec<PointFixture>,
}

fn default_instances() -> usize {
    1
}

/// A point in a [`ModelFixture`]: metadata plus raw values per instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointFixture {
    #[serde(flatten)]
    pub meta: PointMeta,
    /// Scale factor exponent applied to raw values
    #[serde(default)]
    pub scale: i32,
    #[serde(default)]
    pub values: Vec<Option<PointValue>>,
}

impl DeviceFixture {
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Build the in-memory device described by the fixture
    pub fn into_api(self) -> MemoryApi {
        let mut api = MemoryApi::new(self.common);
        for fixture in self.models {
            let mut builder = MemoryModel::builder(fixture.id, fixture.name).instances(fixture.instances);
            if let Some(label) = fixture.label {
                builder = builder.label(label);
            }
            if let Some(desc) = fixture.desc {
                builder = builder.desc(desc);
            }
            for point in fixture.points {
                builder = builder.scaled_point(point.meta, point.scale, point.values);
            }
            api = api.with_model(builder.build());
        }
        api
    }
}
