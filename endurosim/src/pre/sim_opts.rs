use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(
    version = "0.1.0",
    name = "endurosim",
    about = "An endurance race simulator streaming live race state"
)]
pub struct SimOpts {
    // FLAGS ---------------------------------------------------------------------------------------
    /// Activate debug printing
    #[clap(short, long)]
    pub debug: bool,

    /// Stream mode - the race is simulated in real-time and snapshots are printed as JSON
    /// lines
    #[clap(short, long)]
    pub stream: bool,

    // OPTIONS -------------------------------------------------------------------------------------
    /// Set number of simulation runs (only for batch mode, ignored in stream mode)
    #[clap(short, long, default_value = "1")]
    pub no_sim_runs: u32,

    /// Set path to the simulation parameter file (OPTIONAL: if not set, the built-in 20-car
    /// grand prix setup is used)
    #[clap(short, long)]
    pub parfile_path: Option<PathBuf>,

    /// Set simulation speed multiplier, clamped to [0.1, 10.0] (only relevant in stream mode)
    #[clap(short, long, default_value = "1.0")]
    pub realtime_factor: f64,

    /// Set simulation timestep size in seconds, should be in the range [0.01, 1.0]
    #[clap(short, long, default_value = "0.5")]
    pub timestep_size: f64,

    /// Seed for the random source; runs are intentionally non-reproducible when unset
    #[clap(long)]
    pub seed: Option<u64>,
}
