//! Integration constants

use sunspec_core::domains;

/// Integration domain
pub const DOMAIN: &str = "sunspec";

/// Config key for the entity name prefix
pub const CONF_PREFIX: &str = "prefix";

/// Config key for the refresh interval in seconds
pub const CONF_SCAN_INTERVAL: &str = "scan_interval";

/// Config key for the Modbus unit id
pub const CONF_UNIT_ID: &str = "unit_id";

/// Config key for the model ids to expose
pub const CONF_MODELS: &str = "models";

/// Entity platforms set up for every entry
pub const PLATFORMS: [&str; 3] = [domains::SENSOR, domains::SELECT, domains::NUMBER];

pub const ICON_DEFAULT: &str = "mdi:information-outline";
pub const ICON_AC_AMPS: &str = "mdi:current-ac";
pub const ICON_DC_AMPS: &str = "mdi:current-dc";
pub const ICON_VOLT: &str = "mdi:lightning-bolt";
pub const ICON_POWER: &str = "mdi:solar-power";
pub const ICON_FREQ: &str = "mdi:sine-wave";
pub const ICON_ENERGY: &str = "mdi:solar-panel";
pub const ICON_TEMP: &str = "mdi:thermometer";
pub const ICON_SELECT: &str = "mdi:dip-switch";

/// Longest string an enum or bitfield state may render to
pub const MAX_SYMBOL_STATE: usize = 255;
