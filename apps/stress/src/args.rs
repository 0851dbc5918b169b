//! Command-line flags. Every flag overrides the matching file or
//! environment value.

use crate::StressConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ebus-stress")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Hammers one event bus with concurrent dispatch, connect and disconnect")]
pub struct Cli {
    /// Configuration file (TOML, JSON or YAML). Environment variables
    /// prefixed with `EBUS__` are applied on top.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Number of distinct addresses the workers spread over
    #[arg(short, long)]
    pub addresses: Option<u32>,

    /// Connect/dispatch/disconnect cycles per worker
    #[arg(short, long)]
    pub iterations: Option<usize>,
}

impl Cli {
    pub fn apply(&self, config: &mut StressConfig) {
        if let Some(threads) = self.threads {
            config.workload.threads = threads;
        }
        if let Some(addresses) = self.addresses {
            config.workload.addresses = addresses;
        }
        if let Some(iterations) = self.iterations {
            config.workload.iterations = iterations;
        }
    }
}
