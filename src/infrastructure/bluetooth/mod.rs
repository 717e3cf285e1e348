//! Bluetooth Module
//!
//! Drives a single serial-over-Bluetooth link to a switch controller board.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                      │
//! │   (serializes commands, radio callbacks and timers)      │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!                       ▼
//!              ┌──────────────────┐
//!              │ConnectionSession │──────► Radio (platform / simulated)
//!              └────────┬─────────┘
//!         ┌─────────────┼─────────────┐
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌──────────┐
//! │  Scanner  │  │  Parser    │  │ Protocol │
//! │ - window  │  │ - inbound  │  │ - command│
//! │ - dedup   │  │   lines    │  │   strings│
//! └───────────┘  └────────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Outbound command encoding and line framing
//! - [`parser`] - Inbound line classification
//! - [`scanner`] - Bounded discovery window
//! - [`connection`] - Connection state machine and switch commands
//! - [`radio`] - Platform radio seam
//! - [`simulated`] - In-process radio with an emulated controller board
//! - [`service`] - Main service coordinator

pub mod connection;
pub mod parser;
pub mod protocol;
pub mod radio;
pub mod scanner;
pub mod service;
pub mod simulated;

// Re-export main service for convenience
pub use service::BluetoothService;
