//! SunSpec CLI
//!
//! Sets the integration up against a device described in YAML and prints
//! the resulting entity states. Registries and last states are kept in the
//! config directory between runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sunspec::{async_setup_entry, async_unload_entry, SunSpecEntry, DOMAIN};
use sunspec_core::{domains, Context, StateChangedData};
use sunspec_host::{ConfigEntry, Hass, Storable, SERVICE_SELECT_OPTION, SERVICE_SET_VALUE};
use sunspec_model::{Coordinator, DeviceFixture};
use tracing::{info, warn};

/// Expose a SunSpec device fixture as sensor, select and number entities
#[derive(Parser, Debug)]
#[command(name = "sunspec")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML device fixture
    fixture: PathBuf,

    /// Directory for registries and restored states
    #[arg(short, long, default_value = ".sunspec")]
    config_dir: PathBuf,

    /// Prefix for entity names
    #[arg(long)]
    prefix: Option<String>,

    /// Only expose these model ids
    #[arg(long = "model")]
    models: Vec<u16>,

    /// Seconds between refreshes in monitor mode
    #[arg(long)]
    scan_interval: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every entity state
    States,
    /// Choose an option on a select entity
    Select {
        entity_id: String,
        option: String,
    },
    /// Set the value of a number entity
    Set {
        entity_id: String,
        value: f64,
    },
    /// Refresh periodically and print state changes
    Monitor {
        /// Stop after this many refreshes instead of waiting for Ctrl-C
        #[arg(short = 'n', long)]
        count: Option<u32>,
    },
}

/// Config entries kept between runs so entity ids stay stable
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigEntriesData {
    entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = "core.config_entries";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let content = std::fs::read_to_string(&args.fixture)
        .with_context(|| format!("Failed to read fixture {}", args.fixture.display()))?;
    let fixture = DeviceFixture::from_yaml(&content)
        .with_context(|| format!("Failed to parse fixture {}", args.fixture.display()))?;
    let api = Arc::new(fixture.into_api());

    let hass = Hass::new(&args.config_dir);
    hass.load().await.context("Failed to load storage")?;

    let mut entry = config_entry(&hass, &args).await?;
    let coordinator = Arc::new(Coordinator::new(entry.title.clone(), api));
    let loaded = async_setup_entry(&hass, &mut entry, coordinator.clone()).await?;

    let result = run(&hass, &loaded, &args).await;

    async_unload_entry(&hass, &mut entry, loaded).await;
    hass.save().await.context("Failed to save storage")?;
    result
}

/// Find the stored entry for this fixture or create one
async fn config_entry(hass: &Hass, args: &Args) -> Result<ConfigEntry> {
    let title = fixture_title(&args.fixture);
    let mut stored: ConfigEntriesData = hass.storage.load().await?.unwrap_or_default();

    let position = stored
        .entries
        .iter()
        .position(|e| e.domain == DOMAIN && e.title == title);
    let entry = match position {
        Some(index) => &mut stored.entries[index],
        None => {
            info!(title = %title, "Creating config entry");
            stored.entries.push(ConfigEntry::new(DOMAIN, title));
            let last = stored.entries.len() - 1;
            &mut stored.entries[last]
        }
    };

    if let Some(prefix) = &args.prefix {
        entry.options.insert(sunspec::constants::CONF_PREFIX.into(), json!(prefix));
    }
    if !args.models.is_empty() {
        entry.options.insert(sunspec::constants::CONF_MODELS.into(), json!(args.models));
    }
    if let Some(seconds) = args.scan_interval {
        entry
            .options
            .insert(sunspec::constants::CONF_SCAN_INTERVAL.into(), json!(seconds));
    }

    let entry = entry.clone();
    hass.storage.save(&stored).await?;
    Ok(entry)
}

fn fixture_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| DOMAIN.to_string())
}

async fn run(hass: &Hass, loaded: &SunSpecEntry, args: &Args) -> Result<()> {
    match &args.command {
        Command::States => print_states(hass),
        Command::Select { entity_id, option } => {
            hass.services
                .call(
                    domains::SELECT,
                    SERVICE_SELECT_OPTION,
                    json!({"entity_id": entity_id, "option": option}),
                    Context::new(),
                )
                .await
                .map_err(|e| anyhow!("select_option failed: {}", e))?;
            print_state(hass, entity_id)
        }
        Command::Set { entity_id, value } => {
            hass.services
                .call(
                    domains::NUMBER,
                    SERVICE_SET_VALUE,
                    json!({"entity_id": entity_id, "value": value}),
                    Context::new(),
                )
                .await
                .map_err(|e| anyhow!("set_value failed: {}", e))?;
            print_state(hass, entity_id)
        }
        Command::Monitor { count } => monitor(hass, loaded, *count).await,
    }
}

fn state_json(hass: &Hass, entity_id: &str) -> Option<Value> {
    hass.states.get(entity_id).map(|state| {
        json!({
            "entity_id": state.entity_id.to_string(),
            "state": state.state,
            "attributes": state.attributes,
        })
    })
}

fn print_states(hass: &Hass) -> Result<()> {
    let mut states: Vec<Value> = Vec::new();
    for domain in sunspec::constants::PLATFORMS {
        for entity_id in hass.states.entity_ids(domain) {
            states.extend(state_json(hass, &entity_id));
        }
    }
    println!("{}", serde_json::to_string_pretty(&states)?);
    Ok(())
}

fn print_state(hass: &Hass, entity_id: &str) -> Result<()> {
    let state = state_json(hass, entity_id).ok_or_else(|| anyhow!("no state for {}", entity_id))?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

fn print_change(hass: &Hass, change: &StateChangedData) {
    if !hass.is_significant(change) {
        return;
    }
    let old = change.old_state.as_ref().map(|s| s.state.as_str());
    let new = change.new_state.as_ref().map(|s| s.state.as_str());
    println!(
        "{}: {} -> {}",
        change.entity_id,
        old.unwrap_or("-"),
        new.unwrap_or("-")
    );
}

async fn monitor(hass: &Hass, loaded: &SunSpecEntry, count: Option<u32>) -> Result<()> {
    let mut changes = hass.states.subscribe();
    let mut ticker = tokio::time::interval(loaded.options.scan_interval());
    // The first tick completes immediately; setup already refreshed
    ticker.tick().await;

    info!(
        interval = ?loaded.options.scan_interval(),
        "Monitoring, press Ctrl-C to stop"
    );
    let mut refreshes = 0;
    while count.map_or(true, |count| refreshes < count) {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = loaded.coordinator.async_refresh().await {
                    warn!("Refresh failed: {}", e);
                }
                refreshes += 1;
            }
            Ok(change) = changes.recv() => print_change(hass, &change),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    while let Ok(change) = changes.try_recv() {
        print_change(hass, &change);
    }
    Ok(())
}
