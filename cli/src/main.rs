use clap::Parser;
use endurosim::core::handle_race::{run_headless, spawn_race};
use endurosim::core::race::Race;
use endurosim::interfaces::physics::BuiltinPhysics;
use endurosim::pre::read_sim_pars::{default_sim_pars, read_sim_pars, SimPars};
use endurosim::pre::sim_opts::SimOpts;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn build_race(sim_pars: &SimPars, timestep_size: f64, seed: Option<u64>) -> anyhow::Result<Race> {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    Race::new(
        &sim_pars.race_pars,
        &sim_pars.track_pars,
        &sim_pars.car_pars_all,
        sim_pars.tire_pars.clone(),
        sim_pars.weather.clone(),
        timestep_size,
        Box::new(BuiltinPhysics),
        rng,
    )
}

fn main() -> anyhow::Result<()> {
    // PRE-PROCESSING ------------------------------------------------------------------------------
    // get simulation options from the command line arguments
    let sim_opts: SimOpts = SimOpts::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if sim_opts.debug {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    // get simulation parameters
    let sim_pars = if let Some(parfile_path) = &sim_opts.parfile_path {
        info!(path = ?parfile_path, "reading simulation parameters");
        read_sim_pars(parfile_path)?
    } else {
        info!("no parameter file given, using the built-in grand prix setup");
        default_sim_pars()
    };

    info!(
        track = %sim_pars.track_pars.name,
        laps = sim_pars.race_pars.tot_no_laps,
        timestep = sim_opts.timestep_size,
        "simulating"
    );

    // EXECUTION -----------------------------------------------------------------------------------
    if sim_opts.stream {
        // STREAM CASE - real-time simulation, snapshots printed as JSON lines
        let race = build_race(&sim_pars, sim_opts.timestep_size, sim_opts.seed)?;
        let (control, handle) = spawn_race(race);

        let snapshots = control.subscribe()?;
        control.set_speed(sim_opts.realtime_factor)?;
        control.start(sim_pars.weather.clone())?;

        for snapshot in snapshots.iter() {
            println!("{}", serde_json::to_string(&snapshot)?);
            if snapshot.race_finished {
                break;
            }
        }

        match control.insights_payload() {
            Ok(payload) => println!("{}", serde_json::to_string(&payload)?),
            Err(err) => warn!(%err, "no insights payload available"),
        }

        control.shutdown()?;
        match handle.join() {
            Ok(result) => result?,
            Err(_) => anyhow::bail!("Simulation thread panicked!"),
        }
    } else {
        // BATCH CASE - as many runs as requested, in parallel, as fast as possible
        let t_start = Instant::now();

        let reports = (0..sim_opts.no_sim_runs)
            .into_par_iter()
            .map(|run| {
                let seed = sim_opts.seed.map(|s| s + run as u64);
                let mut race = build_race(&sim_pars, sim_opts.timestep_size, seed)?;
                Ok(run_headless(&mut race, sim_opts.debug))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        info!(
            runs = reports.len(),
            elapsed_ms = t_start.elapsed().as_millis() as u64,
            "execution finished"
        );

        if let Some(report) = reports.first() {
            report.print_classification();
            let path = report.write_classification_to_file(None)?;
            info!(%path, "classification written");
        }

        if reports.len() > 1 {
            // wins per driver across the stochastic runs
            let mut wins: HashMap<String, u32> = HashMap::new();
            for report in reports.iter() {
                if let Some(winner) = report.results.first() {
                    *wins.entry(winner.name.to_owned()).or_insert(0) += 1;
                }
            }
            let mut wins: Vec<(String, u32)> = wins.into_iter().collect();
            wins.sort_by(|a, b| b.1.cmp(&a.1));

            println!("RESULT: Wins over {} runs", reports.len());
            for (name, count) in wins {
                println!("{:4} x {}", count, name);
            }
        }
    }

    Ok(())
}
