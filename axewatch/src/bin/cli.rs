//! Command-line interface for axewatch.
//!
//! Polls the configured miners once and prints what it finds, or shows
//! the stored best-difficulty record.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};

use axewatch::cache::StatusCache;
use axewatch::config::{Config, DeviceConfig};
use axewatch::fetch::{Fetch, HttpFetcher};
use axewatch::normalize::CanonicalStatus;
use axewatch::record::{BestRecord, BestRecordStore};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: axewatch-cli <command>");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  status    Poll every device once and show a summary");
        eprintln!("  record    Show the best difficulty on record");
        eprintln!();
        eprintln!("Environment:");
        eprintln!("  AXEWATCH_CONFIG      Config file (default: axewatch.json)");
        eprintln!("  AXEWATCH_DATA_DIR    Directory holding the best record");
        eprintln!("  DEVICE_<NAME>_IP     Add a device without a config file");
        std::process::exit(1);
    }

    let command = &args[1];

    match command.as_str() {
        "status" => cmd_status().await?,
        "record" => cmd_record().await?,
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Poll every device and print one block per device.
async fn cmd_status() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let fetcher: Arc<dyn Fetch> =
        Arc::new(HttpFetcher::new().context("failed to build HTTP client")?);
    let cache = StatusCache::new(fetcher, config.device_ips());

    let statuses = cache.get_all_devices().await;
    for (name, status) in &statuses {
        match status {
            Ok(status) => {
                let device = config.devices.get(name).cloned().unwrap_or_default();
                print_device(name, status, &device);
            }
            Err(e) => println!("{name}: unreachable ({e})"),
        }
        println!();
    }

    let store = BestRecordStore::new(config.record_path());
    print_record(store.load().await.as_ref());

    Ok(())
}

/// Print the stored record without polling.
async fn cmd_record() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let store = BestRecordStore::new(config.record_path());
    print_record(store.load().await.as_ref());
    Ok(())
}

fn print_device(name: &str, status: &CanonicalStatus, device: &DeviceConfig) {
    let family = if status.is_extended() { "NerdAxe" } else { "Bitaxe" };
    println!("{name} ({}, {family} {})", status.hostname, status.asic_model);
    println!(
        "  Hashrate: {:.2} GH/s ({:.1} GH/W)",
        status.hash_rate,
        status.efficiency()
    );
    if status.is_extended() {
        println!(
            "            1m {:.2}  10m {:.2}  1h {:.2}  1d {:.2}",
            status.hash_rate_1m, status.hash_rate_10m, status.hash_rate_1h, status.hash_rate_1d
        );
    }
    println!(
        "  Temp:     {:.1}°C [{}]  VR {:.1}°C [{}]",
        status.temp,
        device.temp_levels().rising(status.temp),
        status.vr_temp,
        device.vr_temp_levels().rising(status.vr_temp),
    );
    println!(
        "  Fan:      {} rpm [{}]",
        status.fanrpm,
        device.fan_levels().falling(status.fanrpm as f64),
    );
    let core_volts = status.core_voltage_actual / 1000.0;
    println!(
        "  Core:     {:.3} V [{}]  {:.0} MHz  {:.1} W",
        core_volts,
        device.volt_levels().upper(core_volts),
        status.frequency,
        status.power,
    );
    println!(
        "  Shares:   {} accepted, {} rejected",
        status.shares_accepted, status.shares_rejected
    );
    println!(
        "  Best:     {} (session {})",
        status.best_diff, status.best_session_diff
    );
    let pool = if status.is_using_fallback_stratum {
        format!("{}:{} (fallback)", status.fallback_stratum_url, status.fallback_stratum_port)
    } else {
        format!("{}:{}", status.stratum_url, status.stratum_port)
    };
    println!("  Pool:     {pool}");
}

fn print_record(record: Option<&BestRecord>) {
    match record {
        Some(record) => {
            println!("Best difficulty: {record}");
            println!("  Since:  {}", record.timestamp);
        }
        None => println!("Best difficulty: (none yet)"),
    }
}
