//! Bluetooth Service Module
//!
//! Owns the connection session and serializes everything that touches it:
//! front-end commands, radio callbacks and the scan countdown are all handled
//! on one task, one at a time.

use crate::domain::activity_log::{ActivityKind, ActivityLog};
use crate::domain::models::{
    AppEvent, BluetoothCommand, MessageSeverity, ParsedMessage, StatusMessage,
};
use crate::domain::registry::DeviceStateStore;
use crate::domain::settings::SettingsService;
use crate::domain::voice::{CanonicalCommand, SwitchAction, VoiceCommandMapper};
use crate::infrastructure::bluetooth::connection::{ConnectionSession, EngineError};
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::radio::{Radio, RadioMessage};
use crate::infrastructure::storage::RegistryStorage;
use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

const SCAN_TICK: Duration = Duration::from_secs(1);

/// Main service coordinating all radio operations
pub struct BluetoothService {
    session: ConnectionSession,
    radio_rx: Option<mpsc::UnboundedReceiver<RadioMessage>>,
    voice: VoiceCommandMapper,
    activity: ActivityLog,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    settings: Arc<Mutex<SettingsService>>,
}

impl BluetoothService {
    pub fn new(
        radio: Box<dyn Radio>,
        storage: Box<dyn RegistryStorage>,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        settings: Arc<Mutex<SettingsService>>,
    ) -> Result<Self> {
        let snapshot = settings
            .lock()
            .map_err(|_| anyhow::anyhow!("Lock error"))?
            .get()
            .clone();

        let store = DeviceStateStore::load(storage, &snapshot);
        let (radio_tx, radio_rx) = mpsc::unbounded_channel();
        let session = ConnectionSession::new(radio, radio_tx, store, &snapshot);

        Ok(Self {
            session,
            radio_rx: Some(radio_rx),
            voice: VoiceCommandMapper::new(),
            activity: ActivityLog::new(),
            event_sender,
            settings,
        })
    }

    /// Process commands until `Shutdown` or until the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<BluetoothCommand>) {
        let Some(mut radio_rx) = self.radio_rx.take() else {
            error!("Bluetooth service started twice");
            return;
        };

        let mut ticker = time::interval_at(Instant::now() + SCAN_TICK, SCAN_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.session.publish_registry();
        self.flush();
        info!("Bluetooth service started");

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    let was_scanning = self.session.is_scanning();
                    if !self.handle_command(command) {
                        break;
                    }
                    if !was_scanning && self.session.is_scanning() {
                        // Countdown starts a full second after the scan
                        ticker.reset();
                    }
                }
                Some(message) = radio_rx.recv() => self.session.handle_radio(message),
                _ = ticker.tick(), if self.session.is_scanning() => self.session.tick(),
            }
            self.flush();
        }

        info!("Bluetooth service stopping ({})", self.session.status());
        self.session.disconnect();
        self.flush();
        info!("Bluetooth service stopped");
    }

    /// Returns `false` once the service should stop.
    fn handle_command(&mut self, command: BluetoothCommand) -> bool {
        let result = match command {
            BluetoothCommand::StartScan => self.session.start_scan(),
            BluetoothCommand::StopScan => {
                self.session.stop_scan();
                Ok(())
            }
            BluetoothCommand::Connect(address) => self.session.connect(&address),
            BluetoothCommand::Disconnect => {
                self.session.disconnect();
                Ok(())
            }
            BluetoothCommand::Toggle(index) => self.session.toggle(index),
            BluetoothCommand::SetSwitch { index, on } => self.session.set_switch(index, on),
            BluetoothCommand::SetAll { on } => self.session.set_all(on),
            BluetoothCommand::SendRaw(line) => self.session.send(&line),
            BluetoothCommand::Voice(text) => self.handle_voice(&text),
            BluetoothCommand::Resize(count) => self.session.resize(count),
            BluetoothCommand::Rename {
                index,
                name,
                scheme,
            } => self.session.rename(index, &name, scheme),
            BluetoothCommand::ListSwitches => {
                self.session.publish_registry();
                Ok(())
            }
            BluetoothCommand::ShowLog => {
                self.show_log();
                Ok(())
            }
            BluetoothCommand::ClearLog => {
                self.activity.clear();
                self.notify(MessageSeverity::Success, "Activity log cleared");
                Ok(())
            }
            BluetoothCommand::Shutdown => return false,
        };

        if let Err(e) = result {
            self.report_error(&e);
        }
        true
    }

    fn handle_voice(&mut self, text: &str) -> Result<(), EngineError> {
        let command = self.voice.parse(text);
        info!("Voice input {:?} -> {}", text, command);
        self.activity
            .record(ActivityKind::Info, format!("Voice: \"{}\" -> {}", text, command), "");
        self.send_event(AppEvent::VoiceRecognized {
            text: text.to_string(),
            command,
        });

        match command {
            CanonicalCommand::Light { number, action } => match action {
                SwitchAction::On => self.session.set_switch(number, true),
                SwitchAction::Off => self.session.set_switch(number, false),
                SwitchAction::Toggle => self.session.toggle(number),
            },
            CanonicalCommand::AllLights { on } => self.session.set_all(on),
            CanonicalCommand::Status => self.session.send(protocol::STATUS_COMMAND),
            CanonicalCommand::Test => self.session.send(protocol::TEST_COMMAND),
            CanonicalCommand::Help => {
                let listing: Vec<String> = self
                    .voice
                    .available_commands()
                    .into_iter()
                    .map(|(phrase, command)| format!("  \"{}\" -> {}", phrase, command))
                    .collect();
                self.notify(
                    MessageSeverity::Info,
                    format!("Available voice commands:\n{}", listing.join("\n")),
                );
                Ok(())
            }
            CanonicalCommand::Unknown => {
                let message = format!("Command not recognized: \"{}\"", text);
                self.activity.record(ActivityKind::Error, message.clone(), "");
                self.notify(MessageSeverity::Warning, message);
                Ok(())
            }
        }
    }

    fn show_log(&mut self) {
        let lines: Vec<String> = self.activity.entries().map(ToString::to_string).collect();
        let message = if lines.is_empty() {
            "Activity log is empty".to_string()
        } else {
            lines.join("\n")
        };
        self.notify(MessageSeverity::Info, message);
        self.send_event(AppEvent::LogStats(self.activity.stats()));
    }

    fn report_error(&mut self, error: &EngineError) {
        warn!("{}", error);
        // These already reach the log through the session's own error events.
        if !matches!(
            error,
            EngineError::ScanUnavailable(_) | EngineError::ScanError(_) | EngineError::ConnectError(_)
        ) {
            self.activity
                .record(ActivityKind::Error, error.to_string(), "");
        }
        self.notify(MessageSeverity::Error, error.to_string());
    }

    fn notify(&self, severity: MessageSeverity, message: impl Into<String>) {
        self.send_event(AppEvent::LogMessage(StatusMessage {
            message: message.into(),
            severity,
        }));
    }

    fn send_event(&self, event: AppEvent) {
        let _ = self.event_sender.send(event);
    }

    /// Forward session events to the front-end, recording activity on the way.
    fn flush(&mut self) {
        for event in self.session.drain_events() {
            self.record_activity(&event);
            if let AppEvent::Connected(peer) = &event {
                self.remember_peer(&peer.address);
            }
            self.send_event(event);
        }
    }

    fn record_activity(&mut self, event: &AppEvent) {
        let peer = self
            .session
            .peer()
            .map(|p| p.name.clone())
            .unwrap_or_default();

        let (kind, message) = match event {
            AppEvent::CommandSent(line) => (ActivityKind::Sent, line.clone()),
            AppEvent::MessageReceived(line) => (ActivityKind::Received, line.clone()),
            AppEvent::Parsed(ParsedMessage::ErrorReport { raw }) => {
                (ActivityKind::Error, format!("Device error: {}", raw))
            }
            AppEvent::ScanError(reason) => (ActivityKind::Error, format!("Scan error: {}", reason)),
            AppEvent::ConnectionError(reason) => {
                (ActivityKind::Error, format!("Connection error: {}", reason))
            }
            AppEvent::ScanStarted => (ActivityKind::Info, "Scanning started".to_string()),
            AppEvent::ScanFinished { count } => (
                ActivityKind::Info,
                format!("Scan finished: {} device(s) found", count),
            ),
            AppEvent::Connected(info) => (
                ActivityKind::Info,
                format!("Connected to {} ({})", info.name, info.address),
            ),
            AppEvent::Disconnected => (ActivityKind::Info, "Disconnected".to_string()),
            _ => return,
        };

        let peer = match kind {
            ActivityKind::Sent | ActivityKind::Received => peer.as_str(),
            _ => "",
        };
        self.activity.record(kind, message, peer);
    }

    fn remember_peer(&self, address: &str) {
        match self.settings.lock() {
            Ok(mut settings) => {
                if let Err(e) = settings.record_connection(address) {
                    warn!("Failed to save last connected device: {}", e);
                }
            }
            Err(_) => error!("Settings lock poisoned"),
        }
    }
}
