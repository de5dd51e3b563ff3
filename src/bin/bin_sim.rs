//! ==============================================================================
//! bin_sim.rs - terminal-driven stand-in for a bin sensor
//! ==============================================================================
//!
//! purpose:
//!     lets you exercise a hub without hardware. it registers one device, then
//!     every bolt count typed on stdin is posted as telemetry. after each post
//!     it polls for configuration the way firmware does and confirms anything
//!     staged.
//!
//! usage:
//!     bin-sim [--hub http://localhost:3000] [--device sim-bin-1] [--capacity 40]
//!
//! ==============================================================================

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use binhub::config::HubConfig;

#[derive(Parser, Debug)]
#[command(name = "bin-sim", about = "Simulated bin sensor for binhub")]
struct Cli {
    /// Path to binhub.toml, for simulator defaults
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Hub base url, overrides simulator.hub_url
    #[arg(long = "hub")]
    hub: Option<String>,

    /// Device id to report as, overrides simulator.device_id
    #[arg(long = "device")]
    device: Option<String>,

    /// Total capacity sent at registration, overrides simulator.total_capacity
    #[arg(long = "capacity")]
    capacity: Option<u64>,
}

/// subset of GET /config/:id the simulator cares about
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolledConfig {
    part_number: Option<String>,
    location_code: Option<String>,
    unit_weight: Option<f64>,
    pending: bool,
}

struct Device {
    client: reqwest::Client,
    hub: String,
    id: String,
}

impl Device {
    async fn register(&self, capacity: Option<u64>) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/register", self.hub))
            .json(&json!({ "deviceId": self.id, "totalCapacity": capacity }))
            .send()
            .await
            .context("hub unreachable")?;
        if !resp.status().is_success() {
            return Err(anyhow!("registration failed: {}", resp.text().await.unwrap_or_default()));
        }
        Ok(())
    }

    async fn report(&self, bolt_count: i64) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/telemetry", self.hub))
            .json(&json!({ "deviceId": self.id, "boltCount": bolt_count }))
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            println!("[SIM] Reported bolt count {}", bolt_count);
        } else {
            println!("[SIM] Hub rejected {} ({}): {}", bolt_count, status, resp.text().await?);
        }
        Ok(())
    }

    /// poll like firmware does; apply and confirm a staged config
    async fn sync_config(&self) -> Result<()> {
        let config: PolledConfig = self
            .client
            .get(format!("{}/config/{}", self.hub, self.id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !config.pending {
            return Ok(());
        }

        println!(
            "[SIM] Applying config: part {} at {} ({} g)",
            config.part_number.as_deref().unwrap_or("-"),
            config.location_code.as_deref().unwrap_or("-"),
            config.unit_weight.unwrap_or_default()
        );
        self.client
            .post(format!("{}/confirm", self.hub))
            .json(&json!({ "deviceId": self.id }))
            .send()
            .await?
            .error_for_status()?;
        println!("[SIM] Config confirmed");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let defaults = HubConfig::load_or_default(cli.config.as_deref()).simulator;

    let device = Device {
        client: reqwest::Client::new(),
        hub: cli.hub.unwrap_or(defaults.hub_url).trim_end_matches('/').to_string(),
        id: cli.device.unwrap_or(defaults.device_id),
    };
    device.register(cli.capacity.or(defaults.total_capacity)).await?;
    println!("[SIM] Registered {} with {}", device.id, device.hub);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Enter new bolt count (ctrl-d to quit):");
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input.parse::<i64>() {
            Ok(count) => {
                if let Err(e) = device.report(count).await {
                    println!("[SIM] ⚠ Report failed: {}", e);
                    continue;
                }
                if let Err(e) = device.sync_config().await {
                    println!("[SIM] ⚠ Config poll failed: {}", e);
                }
            }
            Err(_) => println!("Invalid input. Please enter a number."),
        }
    }
    Ok(())
}
