mod domain;
mod infrastructure;
mod presentation;

use domain::models::BluetoothCommand;
use domain::settings::{app_dir, SettingsService};
use infrastructure::bluetooth::simulated::SimulatedRadio;
use infrastructure::bluetooth::BluetoothService;
use infrastructure::logging::init_logger;
use infrastructure::storage::JsonFileStorage;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let base_dir = app_dir()?;
    let settings = SettingsService::new()?;
    let _log_guard = init_logger(&settings.get().log_settings, &base_dir)?;
    info!("Starting SwitchLink");

    let peers = settings.get().simulated_peers.clone();
    let settings = Arc::new(Mutex::new(settings));

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let service = BluetoothService::new(
        Box::new(SimulatedRadio::new(peers)),
        Box::new(JsonFileStorage::new(base_dir.join("devices.json"))),
        event_tx,
        settings.clone(),
    )?;
    let service_task = tokio::spawn(service.run(command_rx));
    let printer_task = tokio::spawn(presentation::console::print_events(event_rx));

    if let Err(e) = presentation::console::run(command_tx.clone()).await {
        error!("Console input failed: {}", e);
        let _ = command_tx.send(BluetoothCommand::Shutdown);
    }

    service_task.await?;
    printer_task.await?;

    if let Ok(settings) = settings.lock() {
        if let Err(e) = settings.save() {
            error!("Failed to save settings: {}", e);
        }
    }
    info!("SwitchLink stopped");
    Ok(())
}
