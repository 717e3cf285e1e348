//! Discovery window
//!
//! Bounds a scan to a fixed number of one-second ticks and forwards each
//! peer address at most once per scan.

use crate::domain::models::ScannedDevice;
use crate::infrastructure::bluetooth::protocol::UNKNOWN_DEVICE_NAME;
use std::collections::HashMap;
use tracing::{debug, info};

pub struct ScanSession {
    active: bool,
    token: u64,
    duration_secs: u32,
    remaining_secs: u32,
    /// Address -> display name of peers seen since the last `begin`
    seen: HashMap<String, String>,
}

impl ScanSession {
    pub fn new(duration_secs: u32) -> Self {
        Self {
            active: false,
            token: 0,
            duration_secs: duration_secs.max(1),
            remaining_secs: 0,
            seen: HashMap::new(),
        }
    }

    /// Start a new window, forgetting everything seen before.
    pub fn begin(&mut self, token: u64) {
        self.active = true;
        self.token = token;
        self.remaining_secs = self.duration_secs;
        self.seen.clear();
        info!("Scan started ({}s window)", self.duration_secs);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether `token` belongs to the running scan.
    pub fn owns(&self, token: u64) -> bool {
        self.active && self.token == token
    }

    pub fn found_count(&self) -> usize {
        self.seen.len()
    }

    /// Display name recorded for `address` in the latest scan.
    pub fn name_of(&self, address: &str) -> Option<&str> {
        self.seen.get(address).map(String::as_str)
    }

    /// Record a discovery report. Returns the device only the first time its address is seen.
    pub fn record_found(&mut self, name: Option<&str>, address: &str) -> Option<ScannedDevice> {
        if !self.active || self.seen.contains_key(address) {
            return None;
        }

        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => UNKNOWN_DEVICE_NAME.to_string(),
        };
        self.seen.insert(address.to_string(), name.clone());
        debug!("Found device {} ({})", name, address);

        Some(ScannedDevice {
            name,
            address: address.to_string(),
        })
    }

    /// Advance the countdown by one second. `None` once the scan has ended.
    pub fn tick(&mut self) -> Option<u32> {
        if !self.active {
            return None;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        Some(self.remaining_secs)
    }

    /// End the scan. Returns the discovered count the first time only.
    pub fn finish(&mut self) -> Option<usize> {
        if !self.active {
            return None;
        }
        self.active = false;
        self.remaining_secs = 0;
        let count = self.found_count();
        info!("Scan finished, {} device(s) found", count);
        Some(count)
    }
}
