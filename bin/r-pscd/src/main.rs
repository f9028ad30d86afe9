//! ---
//! psc_section: "01-core-functionality"
//! psc_subsection: "binary"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Binary entrypoint for the R-PSC daemon."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use r_psc_common::config::PscConfig;
use r_psc_common::logging::init_tracing;
use r_psc_core::DecisionKernel;
use r_psc_metrics::{new_registry, spawn_http_server, KernelMetrics};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "R-PSC decision kernel", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Compute one decision for a historical row and print it as JSON")]
    Decide {
        #[arg(long)]
        index: usize,
    },
    #[command(about = "Replay a span of historical rows through the kernel")]
    Replay {
        #[arg(long, default_value_t = 100)]
        start: usize,
        #[arg(long, default_value_t = 96)]
        steps: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/r-psc.toml"));
    candidates.push(PathBuf::from("configs/r-psc.dev.toml"));

    let config = match PscConfig::load(&candidates) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("no usable configuration ({}); continuing with defaults", err);
            PscConfig::default()
        }
    };
    init_tracing("r-pscd", &config.logging)?;

    let registry = new_registry();
    let metrics = KernelMetrics::new(registry.clone())?;
    let metrics_server = if config.metrics.enabled {
        Some(spawn_http_server(registry, config.metrics.listen).await?)
    } else {
        None
    };

    let kernel = DecisionKernel::from_config(&config, Some(metrics))?;
    info!(
        rows = kernel.history_len(),
        scenario = ?config.scenario,
        "kernel initialised"
    );

    match cli.command.unwrap_or(Commands::Replay {
        start: 100,
        steps: 96,
    }) {
        Commands::Decide { index } => {
            let state = kernel.state_at(index)?;
            let decision = kernel.decide(state).await?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Commands::Replay { start, steps } => {
            replay(&kernel, start, steps).await?;
        }
    }

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    Ok(())
}

async fn replay(kernel: &DecisionKernel, start: usize, steps: usize) -> Result<()> {
    let mut total_cost = 0.0;
    let mut total_energy = 0.0;
    let mut total_flow = 0.0;
    let mut decided = 0usize;

    for index in start..start + steps {
        let state = match kernel.state_at(index) {
            Ok(state) => state,
            Err(err) => {
                warn!(index, error = %err, "reached end of dataset");
                break;
            }
        };
        let decision = kernel.decide(state).await?;
        total_cost += decision.cost_calculation.cost_eur;
        total_energy += decision.cost_calculation.energy_consumed_kwh;
        total_flow += decision.cost_calculation.flow_pumped_m3;
        decided += 1;
    }

    info!(
        decisions = decided,
        hours = decided as f64 * 0.25,
        total_cost_eur = total_cost,
        total_energy_kwh = total_energy,
        total_flow_m3 = total_flow,
        avg_specific_energy_kwh_per_m3 =
            if total_flow > 0.0 { total_energy / total_flow } else { 0.0 },
        "replay complete"
    );
    println!(
        "replayed {} decisions: {:.2} EUR, {:.0} kWh, {:.0} m³ pumped",
        decided, total_cost, total_energy, total_flow
    );
    Ok(())
}
