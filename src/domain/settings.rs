use crate::domain::models::CommandFraming;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory under the platform config dir holding settings and the registry.
pub const APP_DIR_NAME: &str = "SwitchLink";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "switchlink".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// A peer the simulated radio advertises during discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedPeer {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,

    // Discovery
    #[serde(default = "default_scan_duration_secs")]
    pub scan_duration_secs: u32,

    // Switch registry
    #[serde(default = "default_switch_count")]
    pub default_switch_count: u32,
    #[serde(default = "default_max_switches")]
    pub max_switches: u32,
    #[serde(default)]
    pub command_framing: CommandFraming,
    #[serde(default = "default_true")]
    pub reset_on_disconnect: bool,

    // Connection history
    #[serde(default)]
    pub last_connected_address: Option<String>,
    #[serde(default)]
    pub known_addresses: Vec<String>,

    // Demo radio
    #[serde(default = "default_simulated_peers")]
    pub simulated_peers: Vec<SimulatedPeer>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            scan_duration_secs: default_scan_duration_secs(),
            default_switch_count: default_switch_count(),
            max_switches: default_max_switches(),
            command_framing: CommandFraming::default(),
            reset_on_disconnect: default_true(),
            last_connected_address: None,
            known_addresses: Vec::new(),
            simulated_peers: default_simulated_peers(),
        }
    }
}

fn default_scan_duration_secs() -> u32 {
    15
}
fn default_switch_count() -> u32 {
    4
}
fn default_max_switches() -> u32 {
    20
}
fn default_simulated_peers() -> Vec<SimulatedPeer> {
    vec![
        SimulatedPeer {
            name: "HC-05".to_string(),
            address: "98:D3:31:F5:2A:01".to_string(),
        },
        SimulatedPeer {
            name: String::new(),
            address: "00:21:13:00:7B:42".to_string(),
        },
    ]
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = app_dir()?.join("settings.json");
        Ok(Self::with_path(settings_path))
    }

    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Remember a peer after a successful connection.
    pub fn record_connection(&mut self, address: &str) -> anyhow::Result<()> {
        self.settings.last_connected_address = Some(address.to_string());
        if !self.settings.known_addresses.iter().any(|a| a == address) {
            self.settings.known_addresses.push(address.to_string());
        }
        self.save()
    }
}

/// `<config_dir>/SwitchLink`, created on demand.
pub fn app_dir() -> anyhow::Result<PathBuf> {
    let mut path = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_DIR_NAME);
    fs::create_dir_all(&path)?;
    Ok(path)
}
