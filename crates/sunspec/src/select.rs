//! Select platform: writable enumerated points

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use sunspec_core::State;
use sunspec_host::{
    Attributes, DeviceInfo, Entity, EntityError, EntityResult, PlatformEntity, SelectEntity,
};
use sunspec_model::{PointType, PointValue, Symbol};
use tracing::{debug, warn};

use crate::constants::{DOMAIN, ICON_SELECT};
use crate::entity::SunSpecEntity;
use crate::sensor::{enum_name, unique_symbol};

/// Build the select for a point, if the point belongs on this platform
pub fn create(base: SunSpecEntity) -> Option<PlatformEntity> {
    let meta = base.meta();
    let has_symbols = meta.symbols.as_ref().is_some_and(|s| !s.is_empty());
    if meta.point_type != PointType::Enum16 || !meta.is_writable() || !has_symbols {
        return None;
    }
    Some(PlatformEntity::Select(Arc::new(SunSpecSelect::new(base))))
}

/// A writable `enum16` point; options are its symbol names
pub struct SunSpecSelect {
    base: SunSpecEntity,
    options: Vec<String>,
}

impl SunSpecSelect {
    pub fn new(base: SunSpecEntity) -> Self {
        let options = base.meta().symbol_names().unwrap_or_default();
        debug!(key = base.key(), options = ?options, "Created select entity");
        Self { base, options }
    }

    fn symbols(&self) -> &[Symbol] {
        self.base.meta().symbols.as_deref().unwrap_or_default()
    }
}

#[async_trait]
impl Entity for SunSpecSelect {
    fn unique_id(&self) -> String {
        self.base.unique_id()
    }

    fn name(&self) -> Option<String> {
        Some(self.base.name())
    }

    fn icon(&self) -> Option<String> {
        Some(ICON_SELECT.to_string())
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(self.base.device_info())
    }

    fn available(&self) -> bool {
        self.base.available()
    }

    fn extra_state_attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("integration".into(), json!(DOMAIN));
        attrs.insert("sunspec_key".into(), json!(self.base.key()));
        attrs.insert(
            "raw".into(),
            self.base
                .value()
                .map(|v| v.to_json())
                .unwrap_or(serde_json::Value::Null),
        );
        if let Some(label) = &self.base.meta().label {
            attrs.insert("label".into(), json!(label));
        }
        attrs
    }

    /// Only a different option counts; `raw` follows the option
    fn significant_change(&self, old_state: &State, new_state: &State) -> bool {
        old_state.state != new_state.state
    }
}

#[async_trait]
impl SelectEntity for SunSpecSelect {
    fn options(&self) -> Vec<String> {
        self.options.clone()
    }

    fn current_option(&self) -> Option<String> {
        let value = self.base.value()?;
        enum_name(&value, self.symbols())
    }

    async fn select_option(&self, option: &str) -> EntityResult<()> {
        let Some(symbol) = unique_symbol(self.symbols(), |s| s.name == option) else {
            warn!(key = self.base.key(), option, "Invalid option selected");
            return Err(EntityError::InvalidOption {
                option: option.to_string(),
                options: self.options.clone(),
            });
        };

        debug!(key = self.base.key(), option, value = symbol.value, "Selecting option");
        self.base.write(PointValue::Int(symbol.value)).await
    }
}
