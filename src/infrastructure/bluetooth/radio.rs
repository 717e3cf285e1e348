//! Radio capability seam.
//!
//! The platform Bluetooth stack is supplied from outside. Its results arrive
//! on driver threads, so every callback is tagged with the session token of
//! the operation that caused it and forwarded into the service channel.
//! Events whose token no longer matches the live operation are dropped there.

use crate::domain::models::{PeerInfo, ScannedDevice};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RadioError {
    #[error("no bluetooth adapter available")]
    NoAdapter,
    #[error("bluetooth permission denied")]
    PermissionDenied,
    #[error("{0}")]
    Link(String),
}

/// Asynchronous results reported by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    DiscoveryStarted,
    DeviceFound {
        name: Option<String>,
        address: String,
    },
    DiscoveryFinished {
        devices: Vec<ScannedDevice>,
    },
    DiscoveryFailed(String),
    Connected,
    /// Raw payload; may hold several lines
    Received(String),
    LinkError(String),
}

/// A radio event tagged with the operation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioMessage {
    pub session: u64,
    pub event: RadioEvent,
}

/// Callback handle given to the radio for one discovery or connection.
#[derive(Debug, Clone)]
pub struct RadioCallbacks {
    session: u64,
    tx: mpsc::UnboundedSender<RadioMessage>,
}

impl RadioCallbacks {
    pub fn new(session: u64, tx: mpsc::UnboundedSender<RadioMessage>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Forward an event; a closed service channel is ignored.
    pub fn emit(&self, event: RadioEvent) {
        let _ = self.tx.send(RadioMessage {
            session: self.session,
            event,
        });
    }
}

/// Scan, connect and line I/O as provided by the platform.
pub trait Radio: Send {
    fn start_discovery(&mut self, callbacks: RadioCallbacks) -> Result<(), RadioError>;

    /// Best effort; a late `DiscoveryFinished` may still arrive.
    fn cancel_discovery(&mut self);

    fn connect(&mut self, address: &str, callbacks: RadioCallbacks) -> Result<(), RadioError>;

    /// Fire-and-forget write of one command line.
    fn send_line(&mut self, line: &str) -> Result<(), RadioError>;

    fn disconnect(&mut self);

    fn connected_peer(&self) -> Option<PeerInfo>;
}
