//! Interactive command line to drive a BLE peripheral as its master
//!
//! Identify the peripheral's commands first (Open, Close, GetChallenge,
//! SendResponse, SyncSubscribe, SyncWrite) and write them to a pipe separated
//! commands file:
//!
//! ```text
//! command | service_uuid | char_uuid | data
//! ```
//!
//! Then:
//!
//! ```text
//! gattmaster -p ec:fe:7e:12:34:56 -m 66:66:66:66:66:66 -c custom-commands.txt
//! ```
//!
//! and pick actions from the prompt.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use gattmaster::{Console, ServicesDump, Session, SessionEnd};
use gattmaster_ble::ble::{BleOptions, BleTransport};
use gattmaster_proto::{CommandTable, Transport, normalize_peripheral_id};
use tracing::{Level, debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gattmaster")]
#[command(about = "Interactive BLE master: replay GATT commands against a peripheral")]
struct Cli {
    /// Target peripheral ID or MAC
    #[arg(short, long)]
    peripheral: String,
    /// Your master adapter MAC
    #[arg(short, long)]
    master: Option<String>,
    /// Commands (pipe separated) input file
    #[arg(short, long)]
    commands: Option<PathBuf>,
    /// Services json input file
    #[arg(short, long)]
    services: Option<String>,
    /// How long Sync listens for notifications, in milliseconds
    #[arg(long, default_value = "4000")]
    listen_ms: u64,
    /// Scan duration in seconds
    #[arg(long, default_value = "5")]
    scan_secs: u64,
    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str())),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(end) => end.exit_code(),
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<SessionEnd, Box<dyn std::error::Error>> {
    let peripheral_id = normalize_peripheral_id(&cli.peripheral);

    let table = match &cli.commands {
        Some(path) => Some(load_commands(path).await?),
        None => {
            println!("None commands file was specified.");
            None
        }
    };

    let devices_path = std::env::var("DEVICES_PATH").ok();
    let dump_path = ServicesDump::locate(
        cli.services.as_deref(),
        devices_path.as_deref(),
        &peripheral_id,
    );
    let services = match dump_path {
        Some(path) if cli.services.is_some() || path.exists() => {
            match ServicesDump::load(&path).await {
                Ok(dump) => Some(dump),
                Err(e) => {
                    warn!(error = %e, "ignoring services dump");
                    None
                }
            }
        }
        _ => None,
    };

    if let (Some(table), Some(services)) = (&table, &services) {
        for entry in services.unknown_entries(table) {
            warn!(
                command = %entry.operation,
                service = %entry.service_id,
                characteristic = %entry.characteristic_id,
                "command address is not in the services dump"
            );
        }
    }

    let mut transport = BleTransport::find(BleOptions {
        peripheral_id,
        local_address: cli.master,
        scan_duration: Duration::from_secs(cli.scan_secs),
    })
    .await?;
    transport.connect().await?;
    if let Some(address) = transport.local_address() {
        println!("Master address : {address}");
    }
    println!("initialized !");

    let console = Console::new(tokio::io::BufReader::new(tokio::io::stdin()), std::io::stdout());
    let (end, _, _) = Session::new(transport, console)
        .with_table(table)
        .with_services(services)
        .with_listen_window(Duration::from_millis(cli.listen_ms))
        .run()
        .await?;

    Ok(end)
}

async fn load_commands(path: &std::path::Path) -> Result<CommandTable, Box<dyn std::error::Error>> {
    let compiled = gattmaster::load_table(path)
        .await
        .map_err(|e| format!("failed to read commands file {}: {e}", path.display()))?;

    for error in &compiled.errors {
        println!("Skipping commands file {error}");
    }
    for (line, tag) in &compiled.replaced {
        debug!(line, %tag, "later line replaces earlier command");
    }
    for (line, operation) in &compiled.ignored {
        debug!(line, %operation, "unknown command ignored");
    }

    Ok(compiled.table)
}
