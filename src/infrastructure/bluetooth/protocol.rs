//! Switch controller wire protocol
//!
//! The link is line oriented text. Outbound lines are the command strings
//! configured per switch; inbound lines are decoded by [`super::parser`].

use crate::domain::models::{CommandScheme, SwitchDevice};

/// Separator between lines in a multi-line payload.
pub const LINE_TERMINATOR: &str = "\n";

/// Command asking the firmware for a full status snapshot.
pub const STATUS_COMMAND: &str = "STATUS";

/// Command used to check that the link is alive.
pub const TEST_COMMAND: &str = "TEST";

/// Placeholder for peers that advertise no name.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";

/// Command that moves `device` towards `desired_on`.
///
/// Strings pass through verbatim. A toggle scheme sends the same command
/// whatever the desired state, so the local state stays optimistic until
/// the device reports back.
pub fn encode(device: &SwitchDevice, desired_on: bool) -> String {
    match &device.scheme {
        CommandScheme::OnOff { on, off } => {
            if desired_on {
                on.clone()
            } else {
                off.clone()
            }
        }
        CommandScheme::Toggle { command } => command.clone(),
    }
}

/// Split a raw payload into trimmed, non-empty lines.
pub fn split_lines(payload: &str) -> impl Iterator<Item = &str> {
    payload
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
}
