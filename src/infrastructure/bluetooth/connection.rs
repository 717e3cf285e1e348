//! Connection lifecycle
//!
//! ```text
//! Idle -> Scanning -> Idle
//! Idle -> Connecting -> Connected -> Idle
//! any  -> Failed -> Idle            (on error)
//! ```
//!
//! At most one of scanning, connecting and connected holds at a time. The
//! session is driven from a single task; it never blocks and never retries.

use crate::domain::models::{AppEvent, CommandScheme, ConnectionStatus, ParsedMessage, PeerInfo};
use crate::domain::registry::{DeviceStateStore, RegistryError};
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::parser;
use crate::infrastructure::bluetooth::protocol::{self, UNKNOWN_DEVICE_NAME};
use crate::infrastructure::bluetooth::radio::{
    Radio, RadioCallbacks, RadioError, RadioEvent, RadioMessage,
};
use crate::infrastructure::bluetooth::scanner::ScanSession;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("scanning unavailable: {0}")]
    ScanUnavailable(String),
    #[error("scan failed: {0}")]
    ScanError(String),
    #[error("connection failed: {0}")]
    ConnectError(String),
    #[error("not connected to a device")]
    NotConnected,
    #[error("cannot {action} while {status}")]
    Busy {
        action: &'static str,
        status: ConnectionStatus,
    },
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub struct ConnectionSession {
    radio: Box<dyn Radio>,
    radio_tx: mpsc::UnboundedSender<RadioMessage>,
    status: ConnectionStatus,
    peer: Option<PeerInfo>,
    connecting_to: Option<String>,
    link_token: Option<u64>,
    next_token: u64,
    scan: ScanSession,
    store: DeviceStateStore,
    reset_on_disconnect: bool,
    outbox: Vec<AppEvent>,
}

impl ConnectionSession {
    pub fn new(
        radio: Box<dyn Radio>,
        radio_tx: mpsc::UnboundedSender<RadioMessage>,
        store: DeviceStateStore,
        settings: &Settings,
    ) -> Self {
        Self {
            radio,
            radio_tx,
            status: ConnectionStatus::Idle,
            peer: None,
            connecting_to: None,
            link_token: None,
            next_token: 0,
            scan: ScanSession::new(settings.scan_duration_secs),
            store,
            reset_on_disconnect: settings.reset_on_disconnect,
            outbox: Vec::new(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_active()
    }

    pub fn peer(&self) -> Option<&PeerInfo> {
        self.peer.as_ref()
    }

    #[cfg(test)]
    pub fn switches(&self) -> &[crate::domain::models::SwitchDevice] {
        self.store.switches()
    }

    /// Events produced since the last call, oldest first.
    pub fn drain_events(&mut self) -> Vec<AppEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn emit(&mut self, event: AppEvent) {
        self.outbox.push(event);
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            debug!("Connection status {} -> {}", self.status, status);
            self.status = status;
            self.emit(AppEvent::ConnectionStatus(status));
        }
    }

    fn next_callbacks(&mut self) -> RadioCallbacks {
        self.next_token += 1;
        RadioCallbacks::new(self.next_token, self.radio_tx.clone())
    }

    /// Pass through `Failed` back to `Idle`.
    fn fail(&mut self) {
        self.set_status(ConnectionStatus::Failed);
        self.set_status(ConnectionStatus::Idle);
    }

    pub fn start_scan(&mut self) -> Result<(), EngineError> {
        match self.status {
            ConnectionStatus::Scanning => return Ok(()),
            ConnectionStatus::Connecting | ConnectionStatus::Connected => {
                return Err(EngineError::Busy {
                    action: "scan",
                    status: self.status,
                });
            }
            ConnectionStatus::Idle | ConnectionStatus::Failed => {}
        }

        let callbacks = self.next_callbacks();
        let token = callbacks.session();
        if let Err(e) = self.radio.start_discovery(callbacks) {
            let error = match &e {
                RadioError::NoAdapter | RadioError::PermissionDenied => {
                    EngineError::ScanUnavailable(e.to_string())
                }
                RadioError::Link(reason) => EngineError::ScanError(reason.clone()),
            };
            warn!("Failed to start scan: {}", error);
            self.emit(AppEvent::ScanError(e.to_string()));
            self.fail();
            return Err(error);
        }

        self.scan.begin(token);
        self.set_status(ConnectionStatus::Scanning);
        self.emit(AppEvent::ScanStarted);
        Ok(())
    }

    /// Safe from any state.
    pub fn stop_scan(&mut self) {
        if !self.scan.is_active() {
            return;
        }
        self.radio.cancel_discovery();
        self.end_scan();
    }

    fn end_scan(&mut self) {
        if let Some(count) = self.scan.finish() {
            self.emit(AppEvent::ScanFinished { count });
            if self.status == ConnectionStatus::Scanning {
                self.set_status(ConnectionStatus::Idle);
            }
        }
    }

    /// One second of the scan countdown. No-op once the scan has ended.
    pub fn tick(&mut self) {
        let Some(remaining_secs) = self.scan.tick() else {
            return;
        };
        self.emit(AppEvent::ScanTick { remaining_secs });
        if remaining_secs == 0 {
            info!("Scan window elapsed");
            self.radio.cancel_discovery();
            self.end_scan();
        }
    }

    pub fn connect(&mut self, address: &str) -> Result<(), EngineError> {
        match self.status {
            ConnectionStatus::Connecting | ConnectionStatus::Connected => {
                return Err(EngineError::Busy {
                    action: "connect",
                    status: self.status,
                });
            }
            ConnectionStatus::Scanning => self.stop_scan(),
            ConnectionStatus::Idle | ConnectionStatus::Failed => {}
        }

        info!("Connecting to {}", address);
        let callbacks = self.next_callbacks();
        self.link_token = Some(callbacks.session());
        self.connecting_to = Some(address.to_string());
        self.set_status(ConnectionStatus::Connecting);

        if let Err(e) = self.radio.connect(address, callbacks) {
            let reason = e.to_string();
            self.fail_link(&reason);
            return Err(EngineError::ConnectError(reason));
        }
        Ok(())
    }

    /// Fire-and-forget; rejected outright unless connected.
    pub fn send(&mut self, line: &str) -> Result<(), EngineError> {
        if self.status != ConnectionStatus::Connected {
            return Err(EngineError::NotConnected);
        }
        self.radio
            .send_line(line)
            .map_err(|e| EngineError::SendFailed(e.to_string()))?;
        debug!("Sent {}", line);
        self.emit(AppEvent::CommandSent(line.to_string()));
        Ok(())
    }

    /// Always ends in `Idle`; idempotent.
    pub fn disconnect(&mut self) {
        self.stop_scan();
        self.connecting_to = None;
        if self.link_token.take().is_some() {
            self.radio.disconnect();
            let was_connected = self.peer.take().is_some();
            info!("Disconnected");
            self.emit(AppEvent::Disconnected);
            if was_connected {
                self.reset_switches();
            }
        }
        self.set_status(ConnectionStatus::Idle);
    }

    fn fail_link(&mut self, reason: &str) {
        warn!("Connection failed: {}", reason);
        self.radio.disconnect();
        self.link_token = None;
        self.connecting_to = None;
        let was_connected = self.peer.take().is_some();
        self.emit(AppEvent::ConnectionError(reason.to_string()));
        self.fail();
        if was_connected {
            self.reset_switches();
        }
    }

    fn reset_switches(&mut self) {
        if !self.reset_on_disconnect {
            return;
        }
        for (index, on) in self.store.on_disconnect() {
            self.emit(AppEvent::SwitchStateChanged { index, on });
        }
    }

    pub fn toggle(&mut self, index: u32) -> Result<(), EngineError> {
        let command = self.store.toggle(index)?;
        self.dispatch_optimistic(index, &command)
    }

    pub fn set_switch(&mut self, index: u32, on: bool) -> Result<(), EngineError> {
        let device = self
            .store
            .get(index)
            .ok_or(RegistryError::UnknownSwitch(index))?;
        // Re-sending a toggle command would flip the device away from `on`.
        if device.scheme.is_toggle() && device.is_on == on {
            debug!("Switch {} already {}, nothing to send", index, on);
            return Ok(());
        }
        let command = self.store.set(index, on)?;
        self.dispatch_optimistic(index, &command)
    }

    pub fn set_all(&mut self, on: bool) -> Result<(), EngineError> {
        if self.status != ConnectionStatus::Connected {
            return Err(EngineError::NotConnected);
        }
        let mut first_error = None;
        for (index, command) in self.store.set_all(on) {
            if let Err(e) = self.dispatch_optimistic(index, &command) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Send a command for a switch already updated locally; revert it if the send fails.
    fn dispatch_optimistic(&mut self, index: u32, command: &str) -> Result<(), EngineError> {
        match self.send(command) {
            Ok(()) => {
                let on = self.store.get(index).map(|s| s.is_on).unwrap_or(false);
                self.emit(AppEvent::SwitchStateChanged { index, on });
                Ok(())
            }
            Err(e) => {
                if let Err(revert_error) = self.store.revert(index) {
                    warn!("Could not revert switch {}: {}", index, revert_error);
                }
                Err(e)
            }
        }
    }

    pub fn resize(&mut self, count: u32) -> Result<(), EngineError> {
        self.store.resize(count)?;
        self.publish_registry();
        Ok(())
    }

    pub fn rename(
        &mut self,
        index: u32,
        name: &str,
        scheme: Option<CommandScheme>,
    ) -> Result<(), EngineError> {
        self.store.rename(index, name, scheme)?;
        self.publish_registry();
        Ok(())
    }

    pub fn publish_registry(&mut self) {
        let switches = self.store.switches().to_vec();
        self.emit(AppEvent::RegistryChanged(switches));
    }

    pub fn handle_radio(&mut self, message: RadioMessage) {
        let RadioMessage { session, event } = message;
        match event {
            RadioEvent::DiscoveryStarted
            | RadioEvent::DeviceFound { .. }
            | RadioEvent::DiscoveryFinished { .. }
            | RadioEvent::DiscoveryFailed(_) => {
                if !self.scan.owns(session) {
                    debug!("Dropping stale discovery event {:?}", event);
                    return;
                }
                self.handle_discovery(event);
            }
            RadioEvent::Connected | RadioEvent::Received(_) | RadioEvent::LinkError(_) => {
                if self.link_token != Some(session) {
                    debug!("Dropping stale link event {:?}", event);
                    return;
                }
                self.handle_link(event);
            }
        }
    }

    fn handle_discovery(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::DiscoveryStarted => debug!("Radio discovery started"),
            RadioEvent::DeviceFound { name, address } => {
                if let Some(device) = self.scan.record_found(name.as_deref(), &address) {
                    self.emit(AppEvent::DeviceFound(device));
                }
            }
            RadioEvent::DiscoveryFinished { devices } => {
                debug!("Radio finished discovery ({} reported)", devices.len());
                self.end_scan();
            }
            RadioEvent::DiscoveryFailed(reason) => {
                warn!("Scan error: {}", reason);
                self.scan.finish();
                self.emit(AppEvent::ScanError(reason));
                self.fail();
            }
            _ => {}
        }
    }

    fn handle_link(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Connected => {
                if self.status != ConnectionStatus::Connecting {
                    return;
                }
                let address = self.connecting_to.take().unwrap_or_default();
                let peer = self.radio.connected_peer().unwrap_or_else(|| PeerInfo {
                    name: self
                        .scan
                        .name_of(&address)
                        .unwrap_or(UNKNOWN_DEVICE_NAME)
                        .to_string(),
                    address,
                });
                info!("Connected to {} ({})", peer.name, peer.address);
                self.peer = Some(peer.clone());
                self.set_status(ConnectionStatus::Connected);
                self.emit(AppEvent::Connected(peer));
            }
            RadioEvent::Received(payload) => {
                if self.status != ConnectionStatus::Connected {
                    debug!("Dropping data received while {}", self.status);
                    return;
                }
                for line in protocol::split_lines(&payload) {
                    self.handle_line(line);
                }
            }
            RadioEvent::LinkError(reason) => self.fail_link(&reason),
            _ => {}
        }
    }

    fn handle_line(&mut self, line: &str) {
        self.emit(AppEvent::MessageReceived(line.to_string()));
        let Some(message) = parser::parse_line(line) else {
            return;
        };

        match &message {
            ParsedMessage::StateUpdate { key, on } => {
                if let Some((index, on)) = self.store.apply_state_update(key, *on) {
                    self.emit(AppEvent::SwitchStateChanged { index, on });
                }
            }
            ParsedMessage::StatusSnapshot { states } => {
                for (index, on) in self.store.apply_status_snapshot(states) {
                    self.emit(AppEvent::SwitchStateChanged { index, on });
                }
            }
            ParsedMessage::Acknowledgment { switch, .. } => {
                debug!("Device acknowledged toggle of switch {:?}", switch);
            }
            ParsedMessage::ErrorReport { raw } => warn!("Device reported error: {}", raw),
            ParsedMessage::Info { raw } => debug!("Device info: {}", raw),
        }

        self.emit(AppEvent::Parsed(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::MemoryStorage;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MockState {
        calls: Vec<String>,
        callbacks: Option<RadioCallbacks>,
        discovery_error: Option<RadioError>,
        send_error: Option<RadioError>,
    }

    #[derive(Clone, Default)]
    struct MockRadio {
        state: Arc<Mutex<MockState>>,
    }

    impl MockRadio {
        /// Report an event on the latest callbacks handed to the radio.
        fn report(&self, event: RadioEvent) {
            let state = self.state.lock().unwrap();
            state.callbacks.as_ref().unwrap().emit(event);
        }

        fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }
    }

    impl Radio for MockRadio {
        fn start_discovery(&mut self, callbacks: RadioCallbacks) -> Result<(), RadioError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push("start_discovery".to_string());
            if let Some(e) = state.discovery_error.clone() {
                return Err(e);
            }
            state.callbacks = Some(callbacks);
            Ok(())
        }

        fn cancel_discovery(&mut self) {
            self.state.lock().unwrap().calls.push("cancel_discovery".to_string());
        }

        fn connect(&mut self, address: &str, callbacks: RadioCallbacks) -> Result<(), RadioError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("connect {}", address));
            state.callbacks = Some(callbacks);
            Ok(())
        }

        fn send_line(&mut self, line: &str) -> Result<(), RadioError> {
            let mut state = self.state.lock().unwrap();
            if let Some(e) = state.send_error.clone() {
                return Err(e);
            }
            state.calls.push(format!("send {}", line));
            Ok(())
        }

        fn disconnect(&mut self) {
            self.state.lock().unwrap().calls.push("disconnect".to_string());
        }

        fn connected_peer(&self) -> Option<PeerInfo> {
            None
        }
    }

    struct Harness {
        session: ConnectionSession,
        radio: MockRadio,
        rx: mpsc::UnboundedReceiver<RadioMessage>,
    }

    impl Harness {
        fn new() -> Self {
            let radio = MockRadio::default();
            let (tx, rx) = mpsc::unbounded_channel();
            let settings = Settings::default();
            let store = DeviceStateStore::load(Box::new(MemoryStorage::new()), &settings);
            let session = ConnectionSession::new(Box::new(radio.clone()), tx, store, &settings);
            Self { session, radio, rx }
        }

        /// Deliver everything the radio has reported so far.
        fn pump(&mut self) {
            while let Ok(message) = self.rx.try_recv() {
                self.session.handle_radio(message);
            }
        }

        fn connect(&mut self, address: &str) {
            self.session.connect(address).unwrap();
            self.radio.report(RadioEvent::Connected);
            self.pump();
            assert_eq!(self.session.status(), ConnectionStatus::Connected);
            self.session.drain_events();
        }
    }

    #[test]
    fn test_send_rejected_unless_connected() {
        let mut h = Harness::new();
        assert_eq!(h.session.send("STATUS"), Err(EngineError::NotConnected));

        h.session.start_scan().unwrap();
        assert_eq!(h.session.send("STATUS"), Err(EngineError::NotConnected));

        h.session.connect("AA").unwrap();
        assert_eq!(h.session.status(), ConnectionStatus::Connecting);
        assert_eq!(h.session.send("STATUS"), Err(EngineError::NotConnected));
        assert!(!h.radio.calls().iter().any(|c| c.starts_with("send")));
    }

    #[test]
    fn test_scan_reports_each_address_once() {
        let mut h = Harness::new();
        h.session.start_scan().unwrap();
        for address in ["AA", "AA", "BB"] {
            h.radio.report(RadioEvent::DeviceFound {
                name: Some("HC-05".to_string()),
                address: address.to_string(),
            });
        }
        h.pump();

        let found = h
            .session
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, AppEvent::DeviceFound(_)))
            .count();
        assert_eq!(found, 2);
    }

    #[test]
    fn test_scan_ends_after_window() {
        let mut h = Harness::new();
        h.session.start_scan().unwrap();
        h.session.drain_events();

        for _ in 0..15 {
            h.session.tick();
        }
        let events = h.session.drain_events();
        assert!(events.contains(&AppEvent::ScanTick { remaining_secs: 0 }));
        assert!(events.contains(&AppEvent::ScanFinished { count: 0 }));
        assert_eq!(h.session.status(), ConnectionStatus::Idle);
        assert!(h.radio.calls().contains(&"cancel_discovery".to_string()));

        // Further ticks and a late radio completion change nothing.
        h.session.tick();
        h.radio.report(RadioEvent::DiscoveryFinished { devices: vec![] });
        h.pump();
        assert!(h.session.drain_events().is_empty());
    }

    #[test]
    fn test_radio_finish_ends_scan_early() {
        let mut h = Harness::new();
        h.session.start_scan().unwrap();
        h.radio.report(RadioEvent::DeviceFound {
            name: None,
            address: "AA".to_string(),
        });
        h.pump();
        for _ in 0..3 {
            h.session.tick();
        }
        h.radio.report(RadioEvent::DiscoveryFinished { devices: vec![] });
        h.pump();
        for _ in 0..15 {
            h.session.tick();
        }

        let events = h.session.drain_events();
        let finished: Vec<&AppEvent> = events
            .iter()
            .filter(|e| matches!(e, AppEvent::ScanFinished { .. }))
            .collect();
        assert_eq!(finished, vec![&AppEvent::ScanFinished { count: 1 }]);
        let ticks = events
            .iter()
            .filter(|e| matches!(e, AppEvent::ScanTick { .. }))
            .count();
        assert_eq!(ticks, 3);
        assert_eq!(h.session.status(), ConnectionStatus::Idle);
        assert!(!h.session.is_scanning());
    }

    #[test]
    fn test_radio_scan_failure_ends_scan() {
        let mut h = Harness::new();
        h.session.start_scan().unwrap();
        h.session.drain_events();

        h.radio
            .report(RadioEvent::DiscoveryFailed("adapter reset".to_string()));
        h.pump();
        assert_eq!(
            h.session.drain_events(),
            vec![
                AppEvent::ScanError("adapter reset".to_string()),
                AppEvent::ConnectionStatus(ConnectionStatus::Failed),
                AppEvent::ConnectionStatus(ConnectionStatus::Idle),
            ]
        );

        for _ in 0..15 {
            h.session.tick();
        }
        h.session.stop_scan();
        h.radio.report(RadioEvent::DiscoveryFinished { devices: vec![] });
        h.pump();
        assert!(h.session.drain_events().is_empty());
        assert_eq!(h.session.status(), ConnectionStatus::Idle);
    }

    #[test]
    fn test_stop_scan_is_idempotent() {
        let mut h = Harness::new();
        h.session.stop_scan();
        h.session.start_scan().unwrap();
        h.session.stop_scan();
        h.session.stop_scan();

        let finished = h
            .session
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, AppEvent::ScanFinished { .. }))
            .count();
        assert_eq!(finished, 1);
    }

    #[test]
    fn test_scan_unavailable() {
        let mut h = Harness::new();
        h.radio.state.lock().unwrap().discovery_error = Some(RadioError::NoAdapter);

        assert!(matches!(
            h.session.start_scan(),
            Err(EngineError::ScanUnavailable(_))
        ));
        assert_eq!(h.session.status(), ConnectionStatus::Idle);
        assert!(h
            .session
            .drain_events()
            .contains(&AppEvent::ConnectionStatus(ConnectionStatus::Failed)));
    }

    #[test]
    fn test_scan_rejected_while_connected() {
        let mut h = Harness::new();
        h.connect("AA");
        assert!(matches!(
            h.session.start_scan(),
            Err(EngineError::Busy { action: "scan", .. })
        ));
        assert!(matches!(
            h.session.connect("BB"),
            Err(EngineError::Busy { action: "connect", .. })
        ));
    }

    #[test]
    fn test_connect_stops_scan_and_uses_scanned_name() {
        let mut h = Harness::new();
        h.session.start_scan().unwrap();
        h.radio.report(RadioEvent::DeviceFound {
            name: Some("HC-05".to_string()),
            address: "AA".to_string(),
        });
        h.pump();

        h.session.connect("AA").unwrap();
        assert!(!h.session.is_scanning());
        h.radio.report(RadioEvent::Connected);
        h.pump();

        let events = h.session.drain_events();
        assert!(events.contains(&AppEvent::ScanFinished { count: 1 }));
        assert!(events.contains(&AppEvent::Connected(PeerInfo {
            name: "HC-05".to_string(),
            address: "AA".to_string(),
        })));
        assert_eq!(
            h.radio.calls(),
            vec!["start_discovery", "cancel_discovery", "connect AA"]
        );
    }

    #[test]
    fn test_received_lines_update_switches() {
        let mut h = Harness::new();
        h.connect("AA");

        h.radio
            .report(RadioEvent::Received("LIGHT2:ON\nStatus: L1=ON L2=ON\n".to_string()));
        h.pump();

        let events = h.session.drain_events();
        let changes: Vec<&AppEvent> = events
            .iter()
            .filter(|e| matches!(e, AppEvent::SwitchStateChanged { .. }))
            .collect();
        assert_eq!(
            changes,
            vec![
                &AppEvent::SwitchStateChanged { index: 2, on: true },
                &AppEvent::SwitchStateChanged { index: 1, on: true },
            ]
        );
        assert!(events.contains(&AppEvent::MessageReceived("LIGHT2:ON".to_string())));
    }

    #[test]
    fn test_link_error_returns_to_idle() {
        let mut h = Harness::new();
        h.session.connect("AA").unwrap();
        h.radio
            .report(RadioEvent::LinkError("socket refused".to_string()));
        h.pump();

        assert_eq!(h.session.status(), ConnectionStatus::Idle);
        assert!(h.session.peer().is_none());
        assert!(h
            .session
            .drain_events()
            .contains(&AppEvent::ConnectionError("socket refused".to_string())));

        // A late success for the abandoned attempt is ignored.
        h.radio.report(RadioEvent::Connected);
        h.pump();
        assert_eq!(h.session.status(), ConnectionStatus::Idle);
    }

    #[test]
    fn test_toggle_requires_connection_and_keeps_state() {
        let mut h = Harness::new();
        assert_eq!(h.session.toggle(1), Err(EngineError::NotConnected));
        assert!(!h.session.switches()[0].is_on);
    }

    #[test]
    fn test_toggle_then_device_report_wins() {
        let mut h = Harness::new();
        h.connect("AA");

        h.session.toggle(1).unwrap();
        assert!(h.session.switches()[0].is_on);
        assert!(h.radio.calls().contains(&"send LIGHT1:ON".to_string()));

        h.radio
            .report(RadioEvent::Received("Status: L1=OFF".to_string()));
        h.pump();
        assert!(!h.session.switches()[0].is_on);
    }

    #[test]
    fn test_failed_send_reverts() {
        let mut h = Harness::new();
        h.connect("AA");
        h.radio.state.lock().unwrap().send_error = Some(RadioError::Link("broken pipe".to_string()));

        assert!(matches!(
            h.session.set_switch(3, true),
            Err(EngineError::SendFailed(_))
        ));
        assert!(!h.session.switches()[2].is_on);
        assert!(!h
            .session
            .drain_events()
            .iter()
            .any(|e| matches!(e, AppEvent::SwitchStateChanged { .. })));
    }

    #[test]
    fn test_disconnect_resets_switches_and_drops_late_data() {
        let mut h = Harness::new();
        h.connect("AA");
        h.session.set_all(true).unwrap();
        assert!(h.session.switches().iter().all(|s| s.is_on));

        h.session.disconnect();
        assert_eq!(h.session.status(), ConnectionStatus::Idle);
        assert!(h.session.switches().iter().all(|s| !s.is_on));
        assert!(h.session.drain_events().contains(&AppEvent::Disconnected));

        h.radio.report(RadioEvent::Received("LIGHT1:ON".to_string()));
        h.pump();
        assert!(h.session.drain_events().is_empty());
        assert!(!h.session.switches()[0].is_on);

        // Idempotent
        h.session.disconnect();
        assert!(h.session.drain_events().is_empty());
    }

    #[test]
    fn test_resize_publishes_registry() {
        let mut h = Harness::new();
        h.session.resize(2).unwrap();
        assert!(matches!(
            h.session.drain_events().as_slice(),
            [AppEvent::RegistryChanged(switches)] if switches.len() == 2
        ));
        assert!(matches!(
            h.session.resize(0),
            Err(EngineError::Registry(RegistryError::InvalidSwitchCount { .. }))
        ));
    }
}
