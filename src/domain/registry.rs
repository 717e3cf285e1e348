//! Switch registry and local/device state reconciliation.
//!
//! Local toggles are optimistic: the new state is applied immediately and
//! the prior value is remembered so a failed send can be reverted. Device
//! reports are authoritative and always overwrite local state.

use crate::domain::models::{
    switch_id, CommandFraming, CommandScheme, DeviceKey, SwitchDevice, SWITCH_ID_PREFIX,
};
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::storage::{RegistryMap, RegistryStorage};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no switch with index {0}")]
    UnknownSwitch(u32),
    #[error("switch count must be between 1 and {max}, got {requested}")]
    InvalidSwitchCount { requested: u32, max: u32 },
    #[error("switch {0} has no pending change to revert")]
    NothingToRevert(u32),
}

pub struct DeviceStateStore {
    /// Sorted by index, indices unique
    switches: Vec<SwitchDevice>,
    /// Value each switch had before its latest unconfirmed local change
    pending: HashMap<u32, bool>,
    storage: Box<dyn RegistryStorage>,
    framing: CommandFraming,
    max_switches: u32,
}

impl DeviceStateStore {
    /// Load the registry, normalising legacy entries and seeding defaults when empty.
    pub fn load(storage: Box<dyn RegistryStorage>, settings: &Settings) -> Self {
        let (switches, seeded) = match storage.load() {
            Ok(map) if !map.is_empty() => (normalize(map), false),
            Ok(_) => (
                default_switches(settings.default_switch_count, settings.command_framing),
                true,
            ),
            Err(e) => {
                warn!("Failed to load switch registry, using defaults: {}", e);
                (
                    default_switches(settings.default_switch_count, settings.command_framing),
                    false,
                )
            }
        };

        info!("Loaded {} switches", switches.len());

        let mut store = Self {
            switches,
            pending: HashMap::new(),
            storage,
            framing: settings.command_framing,
            max_switches: settings.max_switches.max(1),
        };
        if seeded {
            store.persist();
        }
        store
    }

    pub fn switches(&self) -> &[SwitchDevice] {
        &self.switches
    }

    pub fn get(&self, index: u32) -> Option<&SwitchDevice> {
        self.switches.iter().find(|s| s.index == index)
    }

    fn get_mut(&mut self, index: u32) -> Result<&mut SwitchDevice, RegistryError> {
        self.switches
            .iter_mut()
            .find(|s| s.index == index)
            .ok_or(RegistryError::UnknownSwitch(index))
    }

    /// Flip a switch locally and return the command to send.
    pub fn toggle(&mut self, index: u32) -> Result<String, RegistryError> {
        let current = self
            .get(index)
            .ok_or(RegistryError::UnknownSwitch(index))?
            .is_on;
        self.set(index, !current)
    }

    /// Set a switch locally and return the command to send.
    pub fn set(&mut self, index: u32, on: bool) -> Result<String, RegistryError> {
        let device = self.get_mut(index)?;
        let prior = device.is_on;
        device.is_on = on;
        let command = protocol::encode(device, on);

        self.pending.insert(index, prior);
        debug!("Switch {} optimistically {} -> {}", index, prior, on);
        self.persist();
        Ok(command)
    }

    /// Set every switch locally; returns `(index, command)` per switch.
    ///
    /// Toggle-scheme switches already in the requested state are skipped.
    pub fn set_all(&mut self, on: bool) -> Vec<(u32, String)> {
        let indices: Vec<u32> = self
            .switches
            .iter()
            .filter(|s| !(s.scheme.is_toggle() && s.is_on == on))
            .map(|s| s.index)
            .collect();
        let mut commands = Vec::with_capacity(indices.len());
        for index in indices {
            if let Ok(command) = self.set(index, on) {
                commands.push((index, command));
            }
        }
        commands
    }

    /// Undo the latest optimistic change after a failed send; returns the restored value.
    pub fn revert(&mut self, index: u32) -> Result<bool, RegistryError> {
        let prior = self
            .pending
            .remove(&index)
            .ok_or(RegistryError::NothingToRevert(index))?;
        self.get_mut(index)?.is_on = prior;
        debug!("Switch {} reverted to {}", index, prior);
        self.persist();
        Ok(prior)
    }

    /// Apply a single device report. Returns the switch if its state changed.
    pub fn apply_state_update(&mut self, key: &str, on: bool) -> Option<(u32, bool)> {
        let changed = self.apply_report(key, on);
        if changed.is_some() {
            self.persist();
        }
        changed
    }

    /// Apply a multi-switch report. Returns the switches whose state changed.
    pub fn apply_status_snapshot(&mut self, states: &[(String, bool)]) -> Vec<(u32, bool)> {
        let changed: Vec<(u32, bool)> = states
            .iter()
            .filter_map(|(key, on)| self.apply_report(key, *on))
            .collect();
        if !changed.is_empty() {
            self.persist();
        }
        changed
    }

    fn apply_report(&mut self, key: &str, on: bool) -> Option<(u32, bool)> {
        let Some(device_key) = DeviceKey::parse(key) else {
            debug!("Ignoring report for unmapped key {}", key);
            return None;
        };
        let device = self.switches.iter_mut().find(|s| device_key.matches(s))?;
        let index = device.index;
        let was = device.is_on;
        device.is_on = on;
        self.pending.remove(&index);
        (was != on).then_some((index, on))
    }

    /// Grow or truncate the registry to `count` switches.
    pub fn resize(&mut self, count: u32) -> Result<(), RegistryError> {
        if count < 1 || count > self.max_switches {
            return Err(RegistryError::InvalidSwitchCount {
                requested: count,
                max: self.max_switches,
            });
        }

        let current = self.switches.len();
        let count = count as usize;
        if count > current {
            let mut next = self.switches.last().map(|s| s.index + 1).unwrap_or(1);
            for _ in current..count {
                self.switches.push(SwitchDevice::generated(next, self.framing));
                next += 1;
            }
        } else {
            for dropped in self.switches.drain(count..) {
                self.pending.remove(&dropped.index);
            }
        }

        info!("Switch count changed {} -> {}", current, count);
        self.persist();
        Ok(())
    }

    /// Edit name and optionally commands, keeping index and state.
    pub fn rename(
        &mut self,
        index: u32,
        name: &str,
        scheme: Option<CommandScheme>,
    ) -> Result<(), RegistryError> {
        let device = self.get_mut(index)?;
        device.name = name.to_string();
        if let Some(scheme) = scheme {
            device.scheme = scheme;
        }
        self.persist();
        Ok(())
    }

    /// Device state is unknown once the link drops; everything reads as off.
    pub fn on_disconnect(&mut self) -> Vec<(u32, bool)> {
        self.pending.clear();
        let changed: Vec<(u32, bool)> = self
            .switches
            .iter_mut()
            .filter(|s| s.is_on)
            .map(|s| {
                s.is_on = false;
                (s.index, false)
            })
            .collect();
        if !changed.is_empty() {
            self.persist();
        }
        changed
    }

    fn persist(&mut self) {
        let map: RegistryMap = self
            .switches
            .iter()
            .map(|s| (s.id.clone(), s.clone()))
            .collect();
        // Best-effort: the in-memory registry stays authoritative.
        if let Err(e) = self.storage.save(&map) {
            warn!("Failed to persist switch registry: {}", e);
        }
    }
}

fn default_switches(count: u32, framing: CommandFraming) -> Vec<SwitchDevice> {
    (1..=count.max(1))
        .map(|index| SwitchDevice::generated(index, framing))
        .collect()
}

/// Sort by index and give every switch a unique index >= 1.
///
/// Legacy maps store fixed ids (`FAN`, `LIGHT1`, ...) with index 0. A legacy
/// `LIGHTn` keeps `n` when free; anything else takes the next free index.
fn normalize(map: RegistryMap) -> Vec<SwitchDevice> {
    let mut devices: Vec<SwitchDevice> = map.into_values().collect();
    devices.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.id.cmp(&b.id)));

    let mut used = BTreeSet::new();
    let mut placed = Vec::with_capacity(devices.len());
    let mut unplaced = Vec::new();
    for device in devices {
        if device.index >= 1 && used.insert(device.index) {
            placed.push(device);
        } else {
            unplaced.push(device);
        }
    }

    let mut leftovers = Vec::new();
    for mut device in unplaced {
        match DeviceKey::parse(&device.id) {
            Some(DeviceKey::Index(n)) if !used.contains(&n) => {
                used.insert(n);
                device.index = n;
                placed.push(device);
            }
            _ => leftovers.push(device),
        }
    }
    for mut device in leftovers {
        let index = (1..).find(|i| !used.contains(i)).unwrap_or(1);
        used.insert(index);
        device.index = index;
        placed.push(device);
    }

    for device in &mut placed {
        if device.id.starts_with(SWITCH_ID_PREFIX) {
            device.id = switch_id(device.index);
        }
    }

    placed.sort_by_key(|d| d.index);
    placed
}
