use crate::domain::activity_log::ActivityStats;
use crate::domain::voice::CanonicalCommand;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of the persistence key derived from a switch index.
pub const SWITCH_ID_PREFIX: &str = "SWITCH_";

/// Highest switch number the key table and voice phrases can address.
pub const MAX_KEY_INDEX: u32 = 20;

/// Keys that name a legacy fixed device instead of an indexed switch.
const FIXED_KEYS: &[&str] = &["FAN"];

/// Key prefixes followed by a switch number (`L1`, `LIGHT2`, `SWITCH_3`, ...).
/// Longer prefixes first so `SWITCH_4` is not read as `SWITCH` + `_4`.
const INDEX_PREFIXES: &[&str] = &["SWITCH_", "SWITCH", "LIGHT", "RELAY", "L"];

/// How a switch is driven on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandScheme {
    /// Distinct commands for on and off
    OnOff { on: String, off: String },
    /// A single command; the firmware flips its own state
    Toggle { command: String },
}

impl CommandScheme {
    /// Build a scheme from an on/off pair. Identical strings mean a toggle command.
    pub fn from_commands(on: impl Into<String>, off: impl Into<String>) -> Self {
        let on = on.into();
        let off = off.into();
        if on == off {
            Self::Toggle { command: on }
        } else {
            Self::OnOff { on, off }
        }
    }

    pub fn on_command(&self) -> &str {
        match self {
            Self::OnOff { on, .. } => on,
            Self::Toggle { command } => command,
        }
    }

    pub fn off_command(&self) -> &str {
        match self {
            Self::OnOff { off, .. } => off,
            Self::Toggle { command } => command,
        }
    }

    pub fn is_toggle(&self) -> bool {
        matches!(self, Self::Toggle { .. })
    }
}

/// Wire framing used when generating default commands for new switches.
///
/// Different firmware builds expect `LIGHT1:ON` or `LIGHT1_ON`; there is no
/// negotiation step, so the choice is configuration, never a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandFraming {
    #[default]
    Colon,
    Underscore,
}

impl CommandFraming {
    pub fn command(&self, key: &str, on: bool) -> String {
        let state = if on { "ON" } else { "OFF" };
        match self {
            Self::Colon => format!("{}:{}", key, state),
            Self::Underscore => format!("{}_{}", key, state),
        }
    }

    pub fn scheme_for(&self, key: &str) -> CommandScheme {
        CommandScheme::OnOff {
            on: self.command(key, true),
            off: self.command(key, false),
        }
    }
}

/// A named, indexed on/off control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchDevice {
    pub id: String,
    pub name: String,
    pub index: u32,
    pub scheme: CommandScheme,
    #[serde(default)]
    pub is_on: bool,
}

impl SwitchDevice {
    pub fn new(index: u32, name: impl Into<String>, scheme: CommandScheme) -> Self {
        Self {
            id: switch_id(index),
            name: name.into(),
            index,
            scheme,
            is_on: false,
        }
    }

    /// Default switch created when the registry grows.
    pub fn generated(index: u32, framing: CommandFraming) -> Self {
        Self::new(
            index,
            format!("Switch {}", index),
            framing.scheme_for(&format!("LIGHT{}", index)),
        )
    }
}

pub fn switch_id(index: u32) -> String {
    format!("{}{}", SWITCH_ID_PREFIX, index)
}

/// Identity a device report refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKey {
    /// An indexed switch (`L2`, `LIGHT2`, `SWITCH_2`)
    Index(u32),
    /// A legacy fixed device matched by its id (`FAN`)
    Fixed(String),
}

impl DeviceKey {
    /// Map a raw report key onto a device identity. Unknown keys yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_uppercase();
        if FIXED_KEYS.contains(&key.as_str()) {
            return Some(Self::Fixed(key));
        }

        for prefix in INDEX_PREFIXES {
            let Some(rest) = key.strip_prefix(prefix) else {
                continue;
            };
            if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            return match rest.parse::<u32>() {
                Ok(n) if (1..=MAX_KEY_INDEX).contains(&n) => Some(Self::Index(n)),
                _ => None,
            };
        }

        None
    }

    pub fn matches(&self, device: &SwitchDevice) -> bool {
        match self {
            Self::Index(index) => device.index == *index,
            Self::Fixed(id) => device.id == *id,
        }
    }
}

/// A peer reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDevice {
    pub name: String,
    pub address: String,
}

/// The peer behind the active link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub name: String,
    pub address: String,
}

/// One decoded inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMessage {
    StateUpdate { key: String, on: bool },
    StatusSnapshot { states: Vec<(String, bool)> },
    /// `switch` is extracted for logging only and never changes state
    Acknowledgment { raw: String, switch: Option<u32> },
    ErrorReport { raw: String },
    Info { raw: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Scanning,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Requests from the front-end to the bluetooth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BluetoothCommand {
    StartScan,
    StopScan,
    Connect(String),
    Disconnect,
    Toggle(u32),
    SetSwitch { index: u32, on: bool },
    SetAll { on: bool },
    SendRaw(String),
    Voice(String),
    Resize(u32),
    Rename {
        index: u32,
        name: String,
        scheme: Option<CommandScheme>,
    },
    ListSwitches,
    ShowLog,
    ClearLog,
    Shutdown,
}

/// Everything the service reports back to the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ScanStarted,
    ScanTick { remaining_secs: u32 },
    DeviceFound(ScannedDevice),
    ScanFinished { count: usize },
    ScanError(String),
    Connected(PeerInfo),
    Disconnected,
    ConnectionError(String),
    ConnectionStatus(ConnectionStatus),
    MessageReceived(String),
    Parsed(ParsedMessage),
    SwitchStateChanged { index: u32, on: bool },
    RegistryChanged(Vec<SwitchDevice>),
    CommandSent(String),
    VoiceRecognized {
        text: String,
        command: CanonicalCommand,
    },
    LogStats(ActivityStats),
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_table() {
        assert_eq!(DeviceKey::parse("L1"), Some(DeviceKey::Index(1)));
        assert_eq!(DeviceKey::parse("light2"), Some(DeviceKey::Index(2)));
        assert_eq!(DeviceKey::parse("SWITCH_12"), Some(DeviceKey::Index(12)));
        assert_eq!(
            DeviceKey::parse("FAN"),
            Some(DeviceKey::Fixed("FAN".to_string()))
        );
        assert_eq!(DeviceKey::parse("L0"), None);
        assert_eq!(DeviceKey::parse("L99"), None);
        assert_eq!(DeviceKey::parse("GARBAGE"), None);
        assert_eq!(DeviceKey::parse("LIGHT"), None);
    }

    #[test]
    fn test_scheme_from_identical_commands_is_toggle() {
        let scheme = CommandScheme::from_commands("T1", "T1");
        assert!(scheme.is_toggle());
        assert_eq!(scheme.on_command(), "T1");
        assert_eq!(scheme.off_command(), "T1");
    }

    #[test]
    fn test_framing() {
        assert_eq!(CommandFraming::Colon.command("LIGHT3", true), "LIGHT3:ON");
        assert_eq!(
            CommandFraming::Underscore.command("LIGHT3", false),
            "LIGHT3_OFF"
        );
        let device = SwitchDevice::generated(4, CommandFraming::Underscore);
        assert_eq!(device.id, "SWITCH_4");
        assert_eq!(device.scheme.on_command(), "LIGHT4_ON");
    }
}
