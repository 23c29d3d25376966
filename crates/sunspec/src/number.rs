//! Number platform: writable numeric points

use std::sync::Arc;

use async_trait::async_trait;
use sunspec_host::{
    Attributes, DeviceInfo, Entity, EntityResult, NumberEntity, NumberMode, PlatformEntity,
};
use sunspec_model::{PointType, PointValue};
use tracing::debug;

use crate::entity::SunSpecEntity;

const DEFAULT_MIN: f64 = 0.0;
const DEFAULT_MAX: f64 = 100.0;

/// Build the number for a point, if the point belongs on this platform
pub fn create(base: SunSpecEntity) -> Option<PlatformEntity> {
    let meta = base.meta();
    if !meta.is_writable()
        || matches!(meta.point_type, PointType::Enum16 | PointType::Bitfield32)
        || meta.point_type.is_text()
    {
        return None;
    }
    Some(PlatformEntity::Number(Arc::new(SunSpecNumber::new(base))))
}

/// A writable numeric point
pub struct SunSpecNumber {
    base: SunSpecEntity,
}

impl SunSpecNumber {
    pub fn new(base: SunSpecEntity) -> Self {
        debug!(key = base.key(), unit = ?base.unit(), "Created number entity");
        Self { base }
    }

    /// Raw type range in display units
    fn bounds(&self) -> (f64, f64) {
        let Some((min, max)) = self.base.meta().point_type.value_range() else {
            return (DEFAULT_MIN, DEFAULT_MAX);
        };
        let factor = 10f64.powi(self.base.scale());
        let (scaled_min, scaled_max) = (min * factor, max * factor);
        if scaled_min.is_finite() && scaled_max.is_finite() {
            (scaled_min, scaled_max)
        } else {
            (min, max)
        }
    }
}

#[async_trait]
impl Entity for SunSpecNumber {
    fn unique_id(&self) -> String {
        self.base.unique_id()
    }

    fn name(&self) -> Option<String> {
        Some(self.base.name())
    }

    fn icon(&self) -> Option<String> {
        Some(self.base.icon().to_string())
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(self.base.device_info())
    }

    fn available(&self) -> bool {
        self.base.available()
    }

    fn extra_state_attributes(&self) -> Attributes {
        self.base.base_attributes()
    }
}

#[async_trait]
impl NumberEntity for SunSpecNumber {
    fn native_value(&self) -> Option<f64> {
        self.base.value().and_then(|v| v.as_f64())
    }

    fn native_min_value(&self) -> f64 {
        self.bounds().0
    }

    fn native_max_value(&self) -> f64 {
        self.bounds().1
    }

    fn native_step(&self) -> f64 {
        1.0
    }

    fn mode(&self) -> NumberMode {
        NumberMode::Box
    }

    fn native_unit_of_measurement(&self) -> Option<String> {
        self.base.unit()
    }

    async fn set_native_value(&self, value: f64) -> EntityResult<()> {
        let value = if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            PointValue::Int(value as i64)
        } else {
            PointValue::Float(value)
        };
        self.base.write(value).await
    }
}
