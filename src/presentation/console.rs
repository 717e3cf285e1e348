//! Line-based front-end
//!
//! Reads commands from stdin, forwards them to the bluetooth service and
//! prints the events it sends back.

use crate::domain::models::{AppEvent, BluetoothCommand, CommandScheme, MessageSeverity};
use crate::infrastructure::bluetooth::protocol::STATUS_COMMAND;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Seconds between countdown lines while scanning.
const SCAN_PROGRESS_STEP: u32 = 5;

pub const HELP: &str = "\
Commands:
  scan                         discover nearby devices
  stop                         stop scanning
  connect <address>            connect to a device
  disconnect                   close the link
  toggle <n>                   toggle switch n
  on <n> | off <n>             set switch n
  all on|off                   set every switch
  status                       ask the device for its switch states
  send <text>                  send a raw command line
  say <phrase>                 run a spoken command, e.g. say turn on light two
  list                         show configured switches
  resize <count>               change the number of switches
  rename <n> <name> [on=<cmd> off=<cmd> | cmd=<cmd>]
                               rename a switch, optionally changing its commands
  log | clear                  show or clear the activity log
  help                         show this help
  quit                         exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    Send(BluetoothCommand),
    Help,
}

pub fn parse_command(line: &str) -> Result<ConsoleAction, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((verb, args)) = parts.split_first() else {
        return Err("Empty command".to_string());
    };

    let command = match verb.to_lowercase().as_str() {
        "help" | "?" => return Ok(ConsoleAction::Help),
        "scan" => BluetoothCommand::StartScan,
        "stop" => BluetoothCommand::StopScan,
        "connect" => {
            let address = args
                .first()
                .ok_or_else(|| "Usage: connect <address>".to_string())?;
            BluetoothCommand::Connect(address.to_string())
        }
        "disconnect" => BluetoothCommand::Disconnect,
        "toggle" => BluetoothCommand::Toggle(switch_index(args, "toggle <n>")?),
        "on" => BluetoothCommand::SetSwitch {
            index: switch_index(args, "on <n>")?,
            on: true,
        },
        "off" => BluetoothCommand::SetSwitch {
            index: switch_index(args, "off <n>")?,
            on: false,
        },
        "all" => match args.first().map(|a| a.to_lowercase()).as_deref() {
            Some("on") => BluetoothCommand::SetAll { on: true },
            Some("off") => BluetoothCommand::SetAll { on: false },
            _ => return Err("Usage: all on|off".to_string()),
        },
        "status" => BluetoothCommand::SendRaw(STATUS_COMMAND.to_string()),
        "send" => {
            if args.is_empty() {
                return Err("Usage: send <text>".to_string());
            }
            BluetoothCommand::SendRaw(args.join(" "))
        }
        "say" => {
            if args.is_empty() {
                return Err("Usage: say <phrase>".to_string());
            }
            BluetoothCommand::Voice(args.join(" "))
        }
        "list" => BluetoothCommand::ListSwitches,
        "resize" => {
            let count = args
                .first()
                .and_then(|a| a.parse().ok())
                .ok_or_else(|| "Usage: resize <count>".to_string())?;
            BluetoothCommand::Resize(count)
        }
        "rename" => parse_rename(args)?,
        "log" => BluetoothCommand::ShowLog,
        "clear" => BluetoothCommand::ClearLog,
        "quit" | "exit" => BluetoothCommand::Shutdown,
        other => return Err(format!("Unknown command: {} (try 'help')", other)),
    };

    Ok(ConsoleAction::Send(command))
}

fn switch_index(args: &[&str], usage: &str) -> Result<u32, String> {
    args.first()
        .and_then(|a| a.parse().ok())
        .ok_or_else(|| format!("Usage: {}", usage))
}

fn parse_rename(args: &[&str]) -> Result<BluetoothCommand, String> {
    const USAGE: &str = "Usage: rename <n> <name> [on=<cmd> off=<cmd> | cmd=<cmd>]";

    let index = switch_index(args, "rename <n> <name>")?;
    let mut name = Vec::new();
    let (mut on, mut off, mut toggle) = (None, None, None);
    for arg in &args[1..] {
        if let Some(value) = arg.strip_prefix("on=") {
            on = Some(value);
        } else if let Some(value) = arg.strip_prefix("off=") {
            off = Some(value);
        } else if let Some(value) = arg.strip_prefix("cmd=") {
            toggle = Some(value);
        } else {
            name.push(*arg);
        }
    }

    if name.is_empty() {
        return Err(USAGE.to_string());
    }
    let scheme = match (on, off, toggle) {
        (None, None, None) => None,
        (None, None, Some(command)) => Some(CommandScheme::from_commands(command, command)),
        (Some(on), Some(off), None) => Some(CommandScheme::from_commands(on, off)),
        _ => return Err(USAGE.to_string()),
    };

    Ok(BluetoothCommand::Rename {
        index,
        name: name.join(" "),
        scheme,
    })
}

/// Text shown for an event, if any.
pub fn render_event(event: &AppEvent) -> Option<String> {
    let text = match event {
        AppEvent::ScanStarted => "Scanning for devices...".to_string(),
        AppEvent::ScanTick { remaining_secs } => {
            if *remaining_secs == 0 || remaining_secs % SCAN_PROGRESS_STEP != 0 {
                return None;
            }
            format!("Scanning... {}s left", remaining_secs)
        }
        AppEvent::DeviceFound(device) => format!("  found {} [{}]", device.name, device.address),
        AppEvent::ScanFinished { count } => format!("Scan complete: {} device(s) found", count),
        AppEvent::ScanError(reason) => format!("Scan error: {}", reason),
        AppEvent::Connected(peer) => format!("Connected to {} ({})", peer.name, peer.address),
        AppEvent::Disconnected => "Disconnected".to_string(),
        AppEvent::ConnectionError(reason) => format!("Connection failed: {}", reason),
        AppEvent::ConnectionStatus(_) | AppEvent::Parsed(_) => return None,
        AppEvent::MessageReceived(line) => format!("<- {}", line),
        AppEvent::CommandSent(line) => format!("-> {}", line),
        AppEvent::SwitchStateChanged { index, on } => {
            format!("Switch {} is now {}", index, if *on { "ON" } else { "OFF" })
        }
        AppEvent::RegistryChanged(switches) => {
            let rows: Vec<String> = switches
                .iter()
                .map(|s| {
                    format!(
                        "  [{}] {:<16} {:<3}  {}",
                        s.index,
                        s.name,
                        if s.is_on { "ON" } else { "OFF" },
                        if s.scheme.is_toggle() {
                            s.scheme.on_command().to_string()
                        } else {
                            format!("{} / {}", s.scheme.on_command(), s.scheme.off_command())
                        }
                    )
                })
                .collect();
            format!("Switches:\n{}", rows.join("\n"))
        }
        AppEvent::VoiceRecognized { text, command } => format!("Heard \"{}\" -> {}", text, command),
        AppEvent::LogStats(stats) => stats.to_string(),
        AppEvent::LogMessage(message) => match message.severity {
            MessageSeverity::Info | MessageSeverity::Success => message.message.clone(),
            MessageSeverity::Warning => format!("Warning: {}", message.message),
            MessageSeverity::Error => format!("Error: {}", message.message),
        },
    };
    Some(text)
}

/// Print events until the service goes away.
pub async fn print_events(mut events: mpsc::UnboundedReceiver<AppEvent>) {
    while let Some(event) = events.recv().await {
        debug!("Event: {:?}", event);
        if let Some(text) = render_event(&event) {
            println!("{}", text);
        }
    }
}

/// Read commands from stdin until `quit` or EOF.
pub async fn run(commands: mpsc::UnboundedSender<BluetoothCommand>) -> anyhow::Result<()> {
    println!("{}", HELP);
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match parse_command(trimmed) {
            Ok(ConsoleAction::Help) => println!("{}", HELP),
            Ok(ConsoleAction::Send(command)) => {
                let quit = command == BluetoothCommand::Shutdown;
                if commands.send(command).is_err() {
                    error!("Bluetooth service is not running");
                    break;
                }
                if quit {
                    return Ok(());
                }
            }
            Err(e) => println!("{}", e),
        }
    }

    let _ = commands.send(BluetoothCommand::Shutdown);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CommandFraming, SwitchDevice};

    fn command(line: &str) -> BluetoothCommand {
        match parse_command(line) {
            Ok(ConsoleAction::Send(command)) => command,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(command("scan"), BluetoothCommand::StartScan);
        assert_eq!(
            command("connect 98:D3:31:F5:2A:01"),
            BluetoothCommand::Connect("98:D3:31:F5:2A:01".to_string())
        );
        assert_eq!(command("TOGGLE 3"), BluetoothCommand::Toggle(3));
        assert_eq!(
            command("off 2"),
            BluetoothCommand::SetSwitch { index: 2, on: false }
        );
        assert_eq!(
            command("say turn on light two"),
            BluetoothCommand::Voice("turn on light two".to_string())
        );
        assert_eq!(command("all OFF"), BluetoothCommand::SetAll { on: false });
        assert_eq!(command("status"), BluetoothCommand::SendRaw("STATUS".to_string()));
        assert_eq!(command("quit"), BluetoothCommand::Shutdown);
        assert_eq!(parse_command("help"), Ok(ConsoleAction::Help));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("toggle").is_err());
        assert!(parse_command("toggle x").is_err());
        assert!(parse_command("resize").is_err());
        assert!(parse_command("fly away").is_err());
        assert!(parse_command("   ").is_err());
    }

    #[test]
    fn test_parse_rename() {
        assert_eq!(
            command("rename 2 Kitchen lamp"),
            BluetoothCommand::Rename {
                index: 2,
                name: "Kitchen lamp".to_string(),
                scheme: None
            }
        );
        assert_eq!(
            command("rename 1 Porch on=P1 off=P0"),
            BluetoothCommand::Rename {
                index: 1,
                name: "Porch".to_string(),
                scheme: Some(CommandScheme::from_commands("P1", "P0"))
            }
        );
        assert!(matches!(
            command("rename 1 Fan cmd=F"),
            BluetoothCommand::Rename { scheme: Some(scheme), .. } if scheme.is_toggle()
        ));
        assert!(parse_command("rename 1 Porch on=P1").is_err());
        assert!(parse_command("rename 1").is_err());
    }

    #[test]
    fn test_render_events() {
        assert_eq!(
            render_event(&AppEvent::SwitchStateChanged { index: 2, on: true }).as_deref(),
            Some("Switch 2 is now ON")
        );
        assert_eq!(render_event(&AppEvent::ScanTick { remaining_secs: 7 }), None);
        assert_eq!(
            render_event(&AppEvent::ScanTick { remaining_secs: 10 }).as_deref(),
            Some("Scanning... 10s left")
        );

        let listing = render_event(&AppEvent::RegistryChanged(vec![SwitchDevice::generated(
            1,
            CommandFraming::Colon,
        )]))
        .unwrap();
        assert!(listing.contains("Switch 1"));
        assert!(listing.contains("LIGHT1:ON / LIGHT1:OFF"));
    }
}
