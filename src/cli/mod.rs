//! Command line interface for the `vigil` binary

pub mod output;
pub mod simulate;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(version)]
#[command(about = "Agent health monitoring and self-recovery", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and environment overrides
    #[arg(short, long, global = true, env = "VIGIL_CONFIG_DIR", default_value = "config")]
    pub config_dir: String,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive a synthetic agent fleet through monitoring and recovery
    Simulate {
        /// Number of agents in the fleet
        #[arg(short, long, default_value = "5")]
        agents: usize,
        /// Number of sampling ticks
        #[arg(short, long, default_value = "30")]
        ticks: usize,
        /// RNG seed for a reproducible run
        #[arg(short, long)]
        seed: Option<u64>,
        /// Number of agents that degrade during the run
        #[arg(short, long, default_value = "1")]
        degrade: usize,
    },
    /// Load, validate and print the effective configuration
    Config {
        /// Config directory (overrides --config-dir)
        #[arg(long)]
        dir: Option<String>,
    },
}
