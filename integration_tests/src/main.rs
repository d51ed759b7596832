//! Integration tests for the esp32-ble-link demo firmware.
//!
//! Run after flashing the firmware. The tests act as a BLE central against
//! the device and, when the USB console is available, check the device log.

mod ble_client;
mod device;

use std::time::Duration;

use clap::Parser;
use colored::Colorize;

use ble_client::BleClient;
use device::{resolve_port, LogMonitor};
use tests::{print_results, run_all_tests};

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Integration tests for the esp32-ble-link demo firmware")]
struct Args {
    /// Serial port carrying the device log ("auto" to detect, "none" to skip)
    #[arg(short, long, default_value = "auto")]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    baud: u32,

    /// BLE scan timeout in seconds
    #[arg(long, default_value = "10")]
    scan_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let scan_timeout = Duration::from_secs(args.scan_timeout);

    println!("{}", "esp32-ble-link Integration Tests".bold());

    let log = match resolve_port(&args.port)? {
        Some(port) => {
            println!("Log port: {}", port);
            let mut log = LogMonitor::new(&port, args.baud)?;
            log.drain()?;
            Some(log)
        }
        None => None,
    };

    println!("Scanning for the demo service...");
    let client = BleClient::connect(scan_timeout).await?;
    println!("{}", "Connected!".green());

    println!("\nRunning tests...\n");

    let results = run_all_tests(client, log, scan_timeout).await;
    print_results(&results);

    // Exit with error code if any tests failed
    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
