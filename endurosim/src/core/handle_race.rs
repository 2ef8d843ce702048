use crate::core::clock::SimulationClock;
use crate::core::race::Race;
use crate::interfaces::control::{RaceCommand, RaceControl, RaceStatus};
use crate::interfaces::stream::{RaceSnapshot, MAX_STREAM_UPDATE_FREQUENCY};
use crate::post::race_result::RaceReport;
use flume::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// handle_race owns the mutable race state on the simulation thread: it applies control
/// commands between ticks, advances the physics according to the wall clock and broadcasts
/// deep-copied snapshots to all subscribed readers. A reader whose channel fails is dropped
/// from the broadcast set; nothing in this loop blocks on an external service.
pub fn handle_race(mut race: Race, rx: Receiver<RaceCommand>) -> anyhow::Result<()> {
    let mut clock = SimulationClock::new(race.timestep_size);
    let mut subscribers: Vec<Sender<RaceSnapshot>> = Vec::new();
    let interval = Duration::from_secs_f64(1.0 / MAX_STREAM_UPDATE_FREQUENCY);

    let mut last_tick = Instant::now();
    loop {
        let deadline = last_tick + interval;

        // apply control commands until the next publication is due
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match rx.recv_timeout(deadline - now) {
                Ok(RaceCommand::Start { weather }) => race.start(weather),
                Ok(RaceCommand::Pause) => race.pause(),
                Ok(RaceCommand::Resume) => race.resume(),
                Ok(RaceCommand::SetSpeed(multiplier)) => {
                    clock.set_speed(multiplier);
                    debug!(
                        multiplier = clock.speed_multiplier(),
                        "simulation speed changed"
                    );
                }
                Ok(RaceCommand::Reset) => race.reset(),
                Ok(RaceCommand::Status(reply)) => {
                    let _ = reply.send(status_of(&race, &clock));
                }
                Ok(RaceCommand::Subscribe(tx)) => subscribers.push(tx),
                Ok(RaceCommand::InsightsPayload(reply)) => {
                    let _ = reply.send(race.insights_payload());
                }
                Ok(RaceCommand::Shutdown) => {
                    info!("simulation thread shutting down");
                    return Ok(());
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    info!("control channel closed, stopping simulation thread");
                    return Ok(());
                }
            }
        }

        // advance the physics by however many ticks the wall clock owes
        let now = Instant::now();
        let wall_dt = (now - last_tick).as_secs_f64();
        last_tick = now;
        for _ in 0..clock.ticks_due(wall_dt, race.is_running()) {
            race.simulate_timestep();
        }
        if last_tick.elapsed() > interval {
            warn!("could not keep up with real-time");
        }

        // publish best-effort; a failing reader is dropped without affecting the simulation
        if !subscribers.is_empty() {
            let snapshot = race.snapshot();
            subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
        }
    }
}

fn status_of(race: &Race, clock: &SimulationClock) -> RaceStatus {
    RaceStatus {
        race_started: race.race_started,
        paused: race.paused,
        race_finished: race.race_finished,
        time: race.cur_racetime,
        weather: race.weather.clone(),
        total_laps: race.tot_no_laps,
        speed_multiplier: clock.speed_multiplier(),
    }
}

/// spawn_race moves the race onto its own simulation thread and returns the control handle.
/// Construction errors must be handled before this point; the thread itself only stops on
/// Shutdown or when every control handle is gone.
pub fn spawn_race(race: Race) -> (RaceControl, JoinHandle<anyhow::Result<()>>) {
    let (tx, rx) = flume::unbounded();
    let handle = thread::spawn(move || handle_race(race, rx));
    (RaceControl::new(tx), handle)
}

/// run_headless simulates the race to completion as fast as possible, without pacing or
/// subscribers (batch mode).
pub fn run_headless(race: &mut Race, print_debug: bool) -> RaceReport {
    race.start(race.weather.clone());

    let mut t_print = 0.0;
    while !race.race_finished {
        race.simulate_timestep();
        if print_debug && race.cur_racetime > t_print + 59.9999 {
            info!(time = race.cur_racetime, "simulating");
            t_print = race.cur_racetime;
        }
    }

    race.report()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::car::CarPars;
    use crate::core::race::{RacePars, Weather};
    use crate::core::tires::TirePars;
    use crate::core::track::{builtin_waypoints, TrackPars};
    use crate::error::SimError;
    use crate::interfaces::physics::BuiltinPhysics;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_race(tot_no_laps: u32, seed: u64) -> Race {
        let race_pars = RacePars {
            tot_no_laps,
            drs_allowed_lap: 2,
            t_tirechange: 22.0,
            t_refuel_per_kg: 0.12,
            start_fuel: 100.0,
            t_pit_stdev: 0.8,
        };
        let track_pars = TrackPars {
            name: "test".to_owned(),
            waypoints: Some(builtin_waypoints()),
            csv_file: None,
            n_samples: 512,
            drs_zone_frac: [0.72, 0.95],
        };
        let car_pars = vec![
            CarPars {
                name: "Driver 1".to_owned(),
                color: "#DC0000".to_owned(),
                driver_skill: 0.9,
                car_skill: 0.85,
                aggression: 0.4,
            },
            CarPars {
                name: "Driver 2".to_owned(),
                color: "#0600EF".to_owned(),
                driver_skill: 0.85,
                car_skill: 0.85,
                aggression: 0.5,
            },
        ];
        Race::new(
            &race_pars,
            &track_pars,
            &car_pars,
            TirePars::default(),
            Weather::default(),
            0.5,
            Box::new(BuiltinPhysics),
            StdRng::seed_from_u64(seed),
        )
        .unwrap()
    }

    #[test]
    fn test_run_headless_finishes_and_reports() {
        let mut race = test_race(2, 1);
        let report = run_headless(&mut race, false);

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].position, 1);
        assert!(report.results[0].laps_completed >= 2);
        assert!(report.race_duration > 0.0);
    }

    #[test]
    fn test_spawned_race_serves_control_surface() {
        let (control, handle) = spawn_race(test_race(50, 2));

        let status = control.status().unwrap();
        assert!(!status.race_started);

        // insights are only meaningful after the finish
        assert!(matches!(
            control.insights_payload(),
            Err(SimError::RaceNotFinished)
        ));

        let snapshots = control.subscribe().unwrap();
        control.start(Weather::clamped(0.0, 25.0, 0.0)).unwrap();
        control.set_speed(10.0).unwrap();

        // wait until a published snapshot shows the running race
        let mut started = false;
        for _ in 0..50 {
            let snap = snapshots.recv_timeout(Duration::from_secs(2)).unwrap();
            if snap.race_started && snap.time > 0.0 {
                assert_eq!(snap.cars.len(), 2);
                started = true;
                break;
            }
        }
        assert!(started, "no running snapshot observed");

        control.pause().unwrap();
        thread::sleep(Duration::from_millis(300));
        let frozen = control.status().unwrap();
        assert!(frozen.paused);
        thread::sleep(Duration::from_millis(300));
        assert_eq!(control.status().unwrap().time, frozen.time);

        control.shutdown().unwrap();
        handle.join().unwrap().unwrap();
        assert!(matches!(
            control.status(),
            Err(SimError::ControlChannelClosed)
        ));
    }

    #[test]
    fn test_dropped_reader_does_not_stop_the_simulation() {
        let (control, handle) = spawn_race(test_race(50, 3));

        let snapshots = control.subscribe().unwrap();
        control.start(Weather::default()).unwrap();
        drop(snapshots);

        thread::sleep(Duration::from_millis(300));
        let status = control.status().unwrap();
        assert!(status.race_started);

        control.shutdown().unwrap();
        handle.join().unwrap().unwrap();
    }
}
