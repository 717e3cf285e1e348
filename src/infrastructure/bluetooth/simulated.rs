//! In-process radio
//!
//! Stands in for the platform stack: advertises the configured peers during
//! discovery and runs a small firmware emulator behind the link, so the whole
//! engine can be driven from the console without hardware.

use crate::domain::models::PeerInfo;
use crate::domain::settings::SimulatedPeer;
use crate::infrastructure::bluetooth::protocol::{LINE_TERMINATOR, STATUS_COMMAND, TEST_COMMAND};
use crate::infrastructure::bluetooth::radio::{Radio, RadioCallbacks, RadioError, RadioEvent};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const DISCOVERY_INTERVAL: Duration = Duration::from_millis(800);
const CONNECT_DELAY: Duration = Duration::from_millis(300);
const REPLY_DELAY: Duration = Duration::from_millis(50);

/// Lights the emulated controller board drives.
const FIRMWARE_LIGHTS: u32 = 4;

/// Command handling of the emulated controller board.
#[derive(Debug, Clone)]
pub struct Firmware {
    lights: BTreeMap<u32, bool>,
}

impl Default for Firmware {
    fn default() -> Self {
        Self::new(FIRMWARE_LIGHTS)
    }
}

impl Firmware {
    pub fn new(lights: u32) -> Self {
        Self {
            lights: (1..=lights).map(|n| (n, false)).collect(),
        }
    }

    /// Lines the board writes back for one command line.
    pub fn respond(&mut self, line: &str) -> Vec<String> {
        let command = line.trim().to_ascii_uppercase();
        if command == STATUS_COMMAND {
            return vec![self.status_line()];
        }
        if command == TEST_COMMAND {
            return vec!["Arduino ready".to_string()];
        }

        if let Some(rest) = command.strip_prefix("LIGHT") {
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(n) = digits.parse::<u32>() {
                let state = match &rest[digits.len()..] {
                    ":ON" | "_ON" => Some(true),
                    ":OFF" | "_OFF" => Some(false),
                    "" => None,
                    _ => return vec![unknown_command()],
                };
                return match state {
                    Some(on) => {
                        self.lights.insert(n, on);
                        vec![state_line(n, on)]
                    }
                    None => {
                        let on = !self.lights.get(&n).copied().unwrap_or(false);
                        self.lights.insert(n, on);
                        vec![format!("Light {} toggled", n), state_line(n, on)]
                    }
                };
            }
        }

        vec![unknown_command()]
    }

    fn status_line(&self) -> String {
        let states: Vec<String> = self
            .lights
            .iter()
            .map(|(n, on)| format!("L{}={}", n, if *on { "ON" } else { "OFF" }))
            .collect();
        format!("Status: {}", states.join(" "))
    }
}

fn state_line(n: u32, on: bool) -> String {
    format!("LIGHT{}:{}", n, if on { "ON" } else { "OFF" })
}

fn unknown_command() -> String {
    "ERROR: Unknown command".to_string()
}

struct Link {
    peer: PeerInfo,
    callbacks: RadioCallbacks,
}

pub struct SimulatedRadio {
    peers: Vec<SimulatedPeer>,
    firmware: Firmware,
    link: Option<Link>,
    discovery: Option<(RadioCallbacks, JoinHandle<()>)>,
    tasks: Vec<JoinHandle<()>>,
}

impl SimulatedRadio {
    pub fn new(peers: Vec<SimulatedPeer>) -> Self {
        Self {
            peers,
            firmware: Firmware::default(),
            link: None,
            discovery: None,
            tasks: Vec::new(),
        }
    }

    fn spawn_after(&mut self, delay: Duration, callbacks: RadioCallbacks, event: RadioEvent) {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callbacks.emit(event);
        }));
    }
}

impl Radio for SimulatedRadio {
    fn start_discovery(&mut self, callbacks: RadioCallbacks) -> Result<(), RadioError> {
        self.cancel_discovery();
        info!("Simulated discovery of {} peer(s)", self.peers.len());

        let peers = self.peers.clone();
        let task_callbacks = callbacks.clone();
        let handle = tokio::spawn(async move {
            task_callbacks.emit(RadioEvent::DiscoveryStarted);
            for peer in peers {
                tokio::time::sleep(DISCOVERY_INTERVAL).await;
                let name = (!peer.name.is_empty()).then_some(peer.name);
                task_callbacks.emit(RadioEvent::DeviceFound {
                    name,
                    address: peer.address,
                });
            }
        });
        self.discovery = Some((callbacks, handle));
        Ok(())
    }

    fn cancel_discovery(&mut self) {
        if let Some((callbacks, handle)) = self.discovery.take() {
            handle.abort();
            // Platform stacks confirm a cancelled discovery asynchronously.
            callbacks.emit(RadioEvent::DiscoveryFinished {
                devices: Vec::new(),
            });
        }
    }

    fn connect(&mut self, address: &str, callbacks: RadioCallbacks) -> Result<(), RadioError> {
        let Some(peer) = self.peers.iter().find(|p| p.address == address) else {
            self.spawn_after(
                CONNECT_DELAY,
                callbacks,
                RadioEvent::LinkError(format!("no device at {}", address)),
            );
            return Ok(());
        };

        let peer = PeerInfo {
            name: peer.name.clone(),
            address: peer.address.clone(),
        };
        debug!("Simulated link to {}", peer.address);
        self.link = Some(Link {
            peer,
            callbacks: callbacks.clone(),
        });
        self.spawn_after(CONNECT_DELAY, callbacks, RadioEvent::Connected);
        Ok(())
    }

    fn send_line(&mut self, line: &str) -> Result<(), RadioError> {
        let callbacks = match &self.link {
            Some(link) => link.callbacks.clone(),
            None => return Err(RadioError::Link("socket closed".to_string())),
        };
        let reply = self.firmware.respond(line).join(LINE_TERMINATOR);
        self.spawn_after(REPLY_DELAY, callbacks, RadioEvent::Received(reply));
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            debug!("Simulated link to {} closed", link.peer.address);
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    fn connected_peer(&self) -> Option<PeerInfo> {
        self.link
            .as_ref()
            .filter(|link| !link.peer.name.is_empty())
            .map(|link| link.peer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ParsedMessage;
    use crate::infrastructure::bluetooth::parser::parse_payload;
    use crate::infrastructure::bluetooth::radio::RadioMessage;
    use tokio::sync::mpsc;

    #[test]
    fn test_firmware_set_and_status() {
        let mut firmware = Firmware::default();
        assert_eq!(firmware.respond("LIGHT2:ON"), vec!["LIGHT2:ON"]);
        assert_eq!(firmware.respond("light3_on"), vec!["LIGHT3:ON"]);
        assert_eq!(
            firmware.respond("STATUS"),
            vec!["Status: L1=OFF L2=ON L3=ON L4=OFF"]
        );
    }

    #[test]
    fn test_firmware_toggle_and_unknown() {
        let mut firmware = Firmware::default();
        assert_eq!(
            firmware.respond("LIGHT1"),
            vec!["Light 1 toggled", "LIGHT1:ON"]
        );
        assert_eq!(firmware.respond("DANCE"), vec!["ERROR: Unknown command"]);
        assert_eq!(firmware.respond("LIGHT1:MAYBE"), vec!["ERROR: Unknown command"]);
    }

    #[test]
    fn test_firmware_replies_parse() {
        let mut firmware = Firmware::default();
        let reply = firmware.respond("LIGHT4").join("\n");
        let messages = parse_payload(&reply);
        assert!(matches!(
            messages[0],
            ParsedMessage::Acknowledgment { switch: Some(4), .. }
        ));
        assert_eq!(
            messages[1],
            ParsedMessage::StateUpdate {
                key: "LIGHT4".to_string(),
                on: true
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_reports_configured_peers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut radio = SimulatedRadio::new(vec![
            SimulatedPeer {
                name: "HC-05".to_string(),
                address: "AA".to_string(),
            },
            SimulatedPeer {
                name: String::new(),
                address: "BB".to_string(),
            },
        ]);
        radio.start_discovery(RadioCallbacks::new(1, tx)).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let mut events = Vec::new();
        while let Ok(RadioMessage { session, event }) = rx.try_recv() {
            assert_eq!(session, 1);
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                RadioEvent::DiscoveryStarted,
                RadioEvent::DeviceFound {
                    name: Some("HC-05".to_string()),
                    address: "AA".to_string()
                },
                RadioEvent::DeviceFound {
                    name: None,
                    address: "BB".to_string()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_link() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut radio = SimulatedRadio::new(crate::domain::settings::Settings::default().simulated_peers);
        assert!(radio.send_line("STATUS").is_err());

        radio
            .connect("98:D3:31:F5:2A:01", RadioCallbacks::new(2, tx))
            .unwrap();
        assert_eq!(radio.connected_peer().unwrap().name, "HC-05");
        radio.send_line("STATUS").unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            events.push(message.event);
        }
        assert!(events.contains(&RadioEvent::Connected));
        assert!(events.contains(&RadioEvent::Received(
            "Status: L1=OFF L2=OFF L3=OFF L4=OFF".to_string()
        )));
    }
}
