use crate::core::car::{Car, CarPars, TickInputs};
use crate::core::pit::{
    self, PitDecisionInputs, ResolvedUndercut, RivalView, UndercutBook, UndercutOutcome,
    UndercutRole,
};
use crate::core::tires::TirePars;
use crate::core::track::{Track, TrackPars};
use crate::error::SimError;
use crate::interfaces::physics::PhysicsBackend;
use crate::interfaces::stream::{CarSnapshot, RaceSnapshot, RgbColor};
use crate::post::race_result::{
    undercut_highlights, BestLap, DriverResult, RaceEvent, RaceEventKind, RacePayload,
    RaceReport, RaceSummary,
};
use helpers::general::{argmax, argsort, SortOrder};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info};

/// (s) DRS proximity window to the car ahead and to the leader.
const DRS_GAP_WINDOW: f64 = 1.0;

/// (1/m) Sections below this curvature count as straights for defensive driving.
const DEFEND_MAX_CURVATURE: f64 = 0.003;

/// (s) A pursuer inside this window forces the car ahead onto the defensive line.
const DEFEND_GAP_MIN: f64 = 0.5;
const DEFEND_GAP_MAX: f64 = 3.0;

/// (s) Margin on both sides of the projected rejoin point that must be free of traffic.
const REJOIN_MARGIN: f64 = 1.5;

/// (s) Lower bound on the standstill whatever the crew variance draw.
const MIN_PIT_DURATION: f64 = 5.0;

/// * `rain` - (0-1) Rain intensity
/// * `track_temp` - (deg C) Track surface temperature, also the ambient for tire cooling
/// * `wind` - (m/s) Wind speed, reduces the cornering limit
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Weather {
    pub rain: f64,
    pub track_temp: f64,
    pub wind: f64,
}

impl Default for Weather {
    fn default() -> Self {
        Weather {
            rain: 0.15,
            track_temp: 22.0,
            wind: 3.0,
        }
    }
}

impl Weather {
    /// clamped bounds requested conditions to the supported ranges instead of rejecting them.
    pub fn clamped(rain: f64, track_temp: f64, wind: f64) -> Weather {
        Weather {
            rain: rain.clamp(0.0, 1.0),
            track_temp: track_temp.clamp(15.0, 50.0),
            wind: wind.clamp(0.0, 20.0),
        }
    }
}

/// * `tot_no_laps` - Total number of laps
/// * `drs_allowed_lap` - Laps the leader must complete before DRS can be used
/// * `t_tirechange` - (s) Standstill time for the tire change
/// * `t_refuel_per_kg` - (s/kg) Refueling time, runs in parallel to the tire change
/// * `start_fuel` - (kg) Tank level at the start and after a stop with refueling
/// * `t_pit_stdev` - (s) Standard deviation of the pit crew variance
#[derive(Debug, Deserialize, Clone)]
pub struct RacePars {
    pub tot_no_laps: u32,
    #[serde(default = "default_drs_allowed_lap")]
    pub drs_allowed_lap: u32,
    #[serde(default = "default_t_tirechange")]
    pub t_tirechange: f64,
    #[serde(default = "default_t_refuel_per_kg")]
    pub t_refuel_per_kg: f64,
    #[serde(default = "default_start_fuel")]
    pub start_fuel: f64,
    #[serde(default = "default_t_pit_stdev")]
    pub t_pit_stdev: f64,
}

fn default_drs_allowed_lap() -> u32 {
    2
}

fn default_t_tirechange() -> f64 {
    22.0
}

fn default_t_refuel_per_kg() -> f64 {
    0.12
}

fn default_start_fuel() -> f64 {
    100.0
}

fn default_t_pit_stdev() -> f64 {
    0.8
}

/// Race is the single authoritative mutable race state. All per-tick mutation happens inside
/// simulate_timestep; observers only ever receive deep-copied snapshots.
pub struct Race {
    pub timestep_size: f64,
    pub cur_racetime: f64,
    pub tot_no_laps: u32,
    pub drs_allowed_lap: u32,
    t_tirechange: f64,
    t_refuel_per_kg: f64,
    start_fuel: f64,
    t_pit_stdev: f64,
    pub track: Track,
    pub weather: Weather,
    pub tire_pars: TirePars,
    pub cars_list: Vec<Car>,
    undercut_book: UndercutBook,
    pub race_started: bool,
    pub paused: bool,
    pub race_finished: bool,
    pub events: Vec<RaceEvent>,
    rng: StdRng,
    backend: Box<dyn PhysicsBackend>,
}

impl std::fmt::Debug for Race {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Race")
            .field("timestep_size", &self.timestep_size)
            .field("cur_racetime", &self.cur_racetime)
            .field("tot_no_laps", &self.tot_no_laps)
            .field("drs_allowed_lap", &self.drs_allowed_lap)
            .field("t_tirechange", &self.t_tirechange)
            .field("t_refuel_per_kg", &self.t_refuel_per_kg)
            .field("start_fuel", &self.start_fuel)
            .field("t_pit_stdev", &self.t_pit_stdev)
            .field("track", &self.track)
            .field("weather", &self.weather)
            .field("tire_pars", &self.tire_pars)
            .field("cars_list", &self.cars_list)
            .field("undercut_book", &self.undercut_book)
            .field("race_started", &self.race_started)
            .field("paused", &self.paused)
            .field("race_finished", &self.race_finished)
            .field("events", &self.events)
            .field("rng", &self.rng)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl Race {
    pub fn new(
        race_pars: &RacePars,
        track_pars: &TrackPars,
        car_pars_all: &[CarPars],
        tire_pars: TirePars,
        weather: Weather,
        timestep_size: f64,
        backend: Box<dyn PhysicsBackend>,
        rng: StdRng,
    ) -> anyhow::Result<Race> {
        if car_pars_all.is_empty() {
            return Err(SimError::EmptyRoster.into());
        }

        let track = Track::new(track_pars)?;

        let mut cars_list = Vec::with_capacity(car_pars_all.len());
        for car_pars in car_pars_all.iter() {
            cars_list.push(Car::new(car_pars)?);
        }

        let mut race = Race {
            timestep_size,
            cur_racetime: 0.0,
            tot_no_laps: race_pars.tot_no_laps,
            drs_allowed_lap: race_pars.drs_allowed_lap,
            t_tirechange: race_pars.t_tirechange,
            t_refuel_per_kg: race_pars.t_refuel_per_kg,
            start_fuel: race_pars.start_fuel,
            t_pit_stdev: race_pars.t_pit_stdev,
            track,
            weather,
            tire_pars,
            cars_list,
            undercut_book: UndercutBook::default(),
            race_started: false,
            paused: false,
            race_finished: false,
            events: Vec::new(),
            rng,
            backend,
        };
        race.reset();

        Ok(race)
    }

    /// start applies the requested weather, reinitializes the grid and begins ticking.
    pub fn start(&mut self, weather: Weather) {
        self.weather = weather;
        self.reset();
        self.race_started = true;
        info!(
            track = %self.track.name,
            laps = self.tot_no_laps,
            rain = self.weather.rain,
            "race started"
        );
    }

    /// reset atomically reinitializes all car state and clocks without starting.
    pub fn reset(&mut self) {
        self.cur_racetime = 0.0;
        self.race_started = false;
        self.paused = false;
        self.race_finished = false;
        self.events.clear();
        self.undercut_book.clear();

        let no_cars = self.cars_list.len();
        let track_length = self.track.total_length;
        let ambient = self.weather.track_temp;
        let start_fuel = self.start_fuel;
        for idx in 0..no_cars {
            self.cars_list[idx].reset(
                idx,
                no_cars,
                track_length,
                ambient,
                start_fuel,
                &mut self.rng,
            );
        }
    }

    pub fn pause(&mut self) {
        if self.race_started && !self.race_finished {
            self.paused = true;
        }
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_running(&self) -> bool {
        self.race_started && !self.paused && !self.race_finished
    }

    // ---------------------------------------------------------------------------------------------
    // MAIN METHOD ---------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// simulate_timestep advances the whole field by one fixed timestep: pit countdowns and
    /// stop completions, stochastic pit calls, car dynamics with DRS/defense interaction and
    /// the undercut bookkeeping.
    pub fn simulate_timestep(&mut self) {
        if !self.is_running() {
            return;
        }
        self.cur_racetime += self.timestep_size;

        let order = self.leaderboard_order();
        let positions = self.positions(&order);
        let views = self.build_views(&positions);

        for idx in 0..self.cars_list.len() {
            if self.cars_list[idx].on_pit {
                if self.cars_list[idx].tick_pit(self.timestep_size) {
                    self.complete_pit_stop(idx);
                }
                continue;
            }

            if self.maybe_pit(idx, &views, &order) {
                continue;
            }

            let drs_eligible = self.drs_eligible(idx, &order, &views);
            let defend_factor = self.defend_factor(idx, &order, &views);

            let inputs = TickInputs {
                track: &self.track,
                tires: &self.tire_pars,
                weather: &self.weather,
                drs_eligible,
                defend_factor,
                tot_laps: self.tot_no_laps,
                dt: self.timestep_size,
            };
            let outcome =
                self.cars_list[idx].advance(&inputs, &mut self.rng, self.backend.as_ref());

            if let Some(kind) = outcome.error {
                let driver = self.cars_list[idx].name.clone();
                debug!(car = %driver, ?kind, "driver error");
                self.events.push(RaceEvent {
                    lap: self.cars_list[idx].laps_completed + 1,
                    time_s: self.cur_racetime,
                    kind: RaceEventKind::DriverError {
                        driver,
                        severity: kind,
                    },
                });
            }

            if outcome.finished && !self.race_finished {
                self.race_finished = true;
                let winner = self.cars_list[idx].name.clone();
                info!(winner = %winner, time = self.cur_racetime, "race finished");
                self.events.push(RaceEvent {
                    lap: self.cars_list[idx].laps_completed,
                    time_s: self.cur_racetime,
                    kind: RaceEventKind::RaceFinished { winner },
                });
            }
        }
    }

    // ---------------------------------------------------------------------------------------------
    // RACE SIMULATOR PARTS ------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// maybe_pit runs the per-tick stochastic pit call for one car and, on a positive call,
    /// moves it into the pits and opens the undercut bookkeeping. Returns true when the car
    /// entered the pits this tick.
    fn maybe_pit(&mut self, idx: usize, views: &[RivalView], order: &[usize]) -> bool {
        let laps_left = self
            .tot_no_laps
            .saturating_sub(self.cars_list[idx].laps_completed);

        // strategic situation: gap to the car chasing for position, and whether it is closing
        let rank = views[idx].position as usize - 1;
        let (gap_behind, closing_speed) = match order.get(rank + 1) {
            Some(&behind) if !self.cars_list[behind].on_pit => (
                Some(pit::time_gap(&views[behind], &views[idx])),
                self.cars_list[behind].v - self.cars_list[idx].v,
            ),
            _ => (None, 0.0),
        };

        let decision = PitDecisionInputs {
            wear: self.cars_list[idx].wear,
            fuel: self.cars_list[idx].fuel,
            laps_left,
            gap_behind,
            closing_speed,
            rejoin_clear: self.rejoin_in_clear_air(idx),
        };

        let p = pit::pit_probability(&decision);
        if p <= 0.0 || self.rng.gen::<f64>() >= p * self.timestep_size {
            return false;
        }

        let refuel_mass = (self.start_fuel - self.cars_list[idx].fuel).max(0.0);
        let mut duration = pit::pit_duration(self.t_tirechange, refuel_mass, self.t_refuel_per_kg);
        if self.t_pit_stdev > 0.0 {
            let crew_noise = Normal::new(0.0, self.t_pit_stdev).unwrap();
            duration = (duration + crew_noise.sample(&mut self.rng)).max(MIN_PIT_DURATION);
        }

        let lap = self.cars_list[idx].laps_completed;
        let compound = self.cars_list[idx].compound;
        self.cars_list[idx].begin_pit_stop(lap, duration);
        self.undercut_book.on_pit_entry(idx, lap, views);

        let driver = self.cars_list[idx].name.clone();
        debug!(car = %driver, lap, duration, "pit entry");
        self.events.push(RaceEvent {
            lap,
            time_s: self.cur_racetime,
            kind: RaceEventKind::PitEntry { driver, compound },
        });

        true
    }

    /// complete_pit_stop fits the post-stop compound, refuels, and answers any pending
    /// undercut battles waiting on this car's stop.
    fn complete_pit_stop(&mut self, idx: usize) {
        let laps_left = self
            .tot_no_laps
            .saturating_sub(self.cars_list[idx].laps_completed);
        let compound = pit::select_compound(self.weather.rain, laps_left, &mut self.rng);
        let ambient = self.weather.track_temp;
        let start_fuel = self.start_fuel;
        self.cars_list[idx].finish_pit_stop(compound, ambient, start_fuel);

        let lap = self.cars_list[idx].laps_completed;
        let driver = self.cars_list[idx].name.clone();
        debug!(car = %driver, ?compound, "pit exit");
        self.events.push(RaceEvent {
            lap,
            time_s: self.cur_racetime,
            kind: RaceEventKind::PitExit { driver, compound },
        });

        // gaps for the resolution must be measured after the stop, not at tick start
        let order = self.leaderboard_order();
        let positions = self.positions(&order);
        let views = self.build_views(&positions);
        let resolved = self.undercut_book.on_pit_exit(idx, lap, &views);
        self.record_undercuts(&resolved);
    }

    /// record_undercuts writes one resolved battle into both cars' latest pit-stop entries,
    /// with sign-inverted gains and mirrored roles.
    fn record_undercuts(&mut self, resolved: &[ResolvedUndercut]) {
        for r in resolved.iter() {
            let initiator_name = self.cars_list[r.initiator].name.clone();
            let opponent_name = self.cars_list[r.opponent].name.clone();
            let initiator_grip = self
                .tire_pars
                .for_compound(self.cars_list[r.initiator].compound)
                .base_grip;
            let opponent_grip = self
                .tire_pars
                .for_compound(self.cars_list[r.opponent].compound)
                .base_grip;

            if let Some(stop) = self.cars_list[r.initiator].pit_history.last_mut() {
                stop.undercuts.push(UndercutOutcome {
                    opponent: opponent_name.clone(),
                    role: UndercutRole::Attempted,
                    gain: r.swing,
                    success: r.swing > 0.0,
                    compound_delta: initiator_grip - opponent_grip,
                    position_before: r.initiator_position_before,
                    position_after: r.initiator_position_after,
                });
            }
            if let Some(stop) = self.cars_list[r.opponent].pit_history.last_mut() {
                stop.undercuts.push(UndercutOutcome {
                    opponent: initiator_name.clone(),
                    role: UndercutRole::Covered,
                    gain: -r.swing,
                    success: r.swing < 0.0,
                    compound_delta: opponent_grip - initiator_grip,
                    position_before: r.opponent_position_before,
                    position_after: r.opponent_position_after,
                });
            }

            info!(
                initiator = %initiator_name,
                opponent = %opponent_name,
                swing = r.swing,
                "undercut battle resolved"
            );
            self.events.push(RaceEvent {
                lap: r.lap,
                time_s: self.cur_racetime,
                kind: RaceEventKind::UndercutResolved {
                    driver: initiator_name,
                    opponent: opponent_name,
                    gain: r.swing,
                },
            });
        }
    }

    /// drs_eligible checks the activation rules: the leader must have completed the opening
    /// laps, the car must be inside the DRS zone and within the proximity window of both the
    /// car ahead and the leader.
    fn drs_eligible(&self, idx: usize, order: &[usize], views: &[RivalView]) -> bool {
        let leader = order[0];
        if self.cars_list[leader].laps_completed < self.drs_allowed_lap {
            return false;
        }
        if idx == leader {
            return false;
        }

        let car = &self.cars_list[idx];
        if !self.track.is_in_drs_zone(car.lap_pos(self.track.total_length)) {
            return false;
        }

        let rank = views[idx].position as usize - 1;
        let ahead = order[rank - 1];
        pit::time_gap(&views[idx], &views[ahead]) <= DRS_GAP_WINDOW
            && pit::time_gap(&views[idx], &views[leader]) <= DRS_GAP_WINDOW
    }

    /// defend_factor models a leading car taking the defensive line on straights while the
    /// rival chasing it for position is close behind. Closer pursuers force a larger penalty.
    fn defend_factor(&self, idx: usize, order: &[usize], views: &[RivalView]) -> f64 {
        let curvature = self.track.curvature_at_s(self.cars_list[idx].s);
        if curvature > DEFEND_MAX_CURVATURE {
            return 1.0;
        }

        let rank = views[idx].position as usize - 1;
        let behind = match order.get(rank + 1) {
            Some(&b) if !self.cars_list[b].on_pit => b,
            _ => return 1.0,
        };

        let gap = pit::time_gap(&views[behind], &views[idx]);
        if !(DEFEND_GAP_MIN..=DEFEND_GAP_MAX).contains(&gap) {
            return 1.0;
        }

        let closeness = (DEFEND_GAP_MAX - gap) / (DEFEND_GAP_MAX - DEFEND_GAP_MIN);
        1.0 - (0.02 + 0.06 * closeness)
    }

    /// rejoin_in_clear_air projects where the car would rejoin after a stop and checks
    /// whether that point falls inside the biggest gap in traffic with margin on both sides.
    fn rejoin_in_clear_air(&self, idx: usize) -> bool {
        let track_length = self.track.total_length;
        let me = &self.cars_list[idx];
        let rejoin = me.lap_pos(track_length);

        // rivals keep lapping during the standstill
        let projected: Vec<f64> = self
            .cars_list
            .iter()
            .enumerate()
            .filter(|(j, car)| *j != idx && !car.on_pit)
            .map(|(_, car)| {
                (car.lap_pos(track_length) + car.v * self.t_tirechange).rem_euclid(track_length)
            })
            .collect();

        if projected.len() < 2 {
            return true;
        }

        let idxs = argsort(&projected, SortOrder::Ascending);
        let sorted: Vec<f64> = idxs.iter().map(|&i| projected[i]).collect();

        let mut gaps = Vec::with_capacity(sorted.len());
        for i in 0..sorted.len() {
            let next = sorted[(i + 1) % sorted.len()];
            gaps.push((next - sorted[i]).rem_euclid(track_length));
        }

        let biggest = argmax(&gaps);
        let margin = REJOIN_MARGIN * me.v.max(30.0);
        let offset = (rejoin - sorted[biggest]).rem_euclid(track_length);
        offset > margin && offset < gaps[biggest] - margin
    }

    // ---------------------------------------------------------------------------------------------
    // METHODS (HELPERS) ---------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// leaderboard_order ranks cars by (laps completed desc, distance within the current lap
    /// desc, total time asc).
    pub fn leaderboard_order(&self) -> Vec<usize> {
        let mut idxs: Vec<usize> = (0..self.cars_list.len()).collect();
        idxs.sort_by(|&a, &b| self.compare_rank(a, b));
        idxs
    }

    fn compare_rank(&self, a: usize, b: usize) -> Ordering {
        let track_length = self.track.total_length;
        let ca = &self.cars_list[a];
        let cb = &self.cars_list[b];
        cb.laps_completed
            .cmp(&ca.laps_completed)
            .then(
                cb.lap_pos(track_length)
                    .partial_cmp(&ca.lap_pos(track_length))
                    .unwrap_or(Ordering::Equal),
            )
            .then(
                ca.total_time
                    .partial_cmp(&cb.total_time)
                    .unwrap_or(Ordering::Equal),
            )
    }

    fn positions(&self, order: &[usize]) -> Vec<u32> {
        let mut positions = vec![0u32; order.len()];
        for (rank, &idx) in order.iter().enumerate() {
            positions[idx] = rank as u32 + 1;
        }
        positions
    }

    fn build_views(&self, positions: &[u32]) -> Vec<RivalView> {
        self.cars_list
            .iter()
            .enumerate()
            .map(|(idx, car)| RivalView {
                idx,
                in_pit: car.on_pit,
                laps_completed: car.laps_completed,
                progress: car.s,
                v: car.v,
                compound: car.compound,
                position: positions[idx],
            })
            .collect()
    }

    /// snapshot deep-copies the observable race state for the transport boundary.
    pub fn snapshot(&self) -> RaceSnapshot {
        let order = self.leaderboard_order();
        let leader_time = self.cars_list[order[0]].total_time;
        let track_length = self.track.total_length;

        let mut cars = Vec::with_capacity(order.len());
        for (rank, &idx) in order.iter().enumerate() {
            let car = &self.cars_list[idx];
            let (x, y) = self.track.pos(self.track.s_to_u(car.s));

            let gap_ahead = if rank == 0 {
                0.0
            } else {
                let ahead = &self.cars_list[order[rank - 1]];
                let ref_speed = ((car.v + ahead.v) * 0.5).max(30.0);
                let lap_diff = ahead.laps_completed as f64 - car.laps_completed as f64;
                (lap_diff * track_length + ahead.lap_pos(track_length)
                    - car.lap_pos(track_length))
                    / ref_speed
            };

            cars.push(CarSnapshot {
                name: car.name.clone(),
                color: car.color.clone(),
                rgb: RgbColor {
                    r: car.rgb[0],
                    g: car.rgb[1],
                    b: car.rgb[2],
                },
                position: rank as u32 + 1,
                laps: car.laps_completed,
                wear: (car.wear * 1000.0).round() / 1000.0,
                compound: car.compound,
                fuel: (car.fuel * 10.0).round() / 10.0,
                speed: car.v * 3.6,
                x,
                y,
                heading: self.track.heading(car.s),
                total_time: car.total_time,
                on_pit: car.on_pit,
                drs_active: car.drs_active,
                time_interval: car.total_time - leader_time,
                gap_ahead,
                pit_history: car.pit_history.clone(),
            });
        }

        let mut tire_distribution = HashMap::new();
        for car in self.cars_list.iter() {
            *tire_distribution.entry(car.compound).or_insert(0) += 1;
        }

        let undercut_summary = if self.race_finished {
            Some(undercut_highlights(&self.driver_results(&order)))
        } else {
            None
        };

        RaceSnapshot {
            time: self.cur_racetime,
            cars,
            weather: self.weather.clone(),
            total_laps: self.tot_no_laps,
            tire_distribution,
            race_started: self.race_started,
            paused: self.paused,
            race_finished: self.race_finished,
            undercut_summary,
        }
    }

    fn driver_results(&self, order: &[usize]) -> Vec<DriverResult> {
        order
            .iter()
            .enumerate()
            .map(|(rank, &idx)| {
                let car = &self.cars_list[idx];
                DriverResult {
                    name: car.name.clone(),
                    position: rank as u32 + 1,
                    laps_completed: car.laps_completed,
                    total_time: car.total_time,
                    best_lap: car.best_lap,
                    pit_history: car.pit_history.clone(),
                    tire_usage: car.tire_laps.clone(),
                }
            })
            .collect()
    }

    pub fn report(&self) -> RaceReport {
        let order = self.leaderboard_order();
        RaceReport {
            tot_no_laps: self.tot_no_laps,
            track_name: self.track.name.clone(),
            track_length: self.track.total_length,
            weather: self.weather.clone(),
            race_duration: self.cur_racetime,
            results: self.driver_results(&order),
            events: self.events.clone(),
        }
    }

    /// insights_payload builds the data contract for the narrative-insights collaborator.
    /// Only meaningful once the race has finished.
    pub fn insights_payload(&self) -> Result<RacePayload, SimError> {
        if !self.race_finished {
            return Err(SimError::RaceNotFinished);
        }

        let order = self.leaderboard_order();
        let results = self.driver_results(&order);
        let fastest_lap = results
            .iter()
            .filter_map(|r| r.best_lap.map(|t| (r.name.clone(), t)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .map(|(driver, time)| BestLap { driver, time });

        Ok(RacePayload {
            race_summary: RaceSummary {
                total_laps: self.tot_no_laps,
                race_duration: self.cur_racetime,
                weather: self.weather.clone(),
                track_name: self.track.name.clone(),
                track_length: self.track.total_length,
                winner: results[0].name.clone(),
                fastest_lap,
            },
            drivers: results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pit::PitStop;
    use crate::core::tires::Compound;
    use crate::core::track::builtin_waypoints;
    use crate::interfaces::physics::BuiltinPhysics;
    use rand::SeedableRng;

    fn test_car_pars(no_cars: usize) -> Vec<CarPars> {
        let colors = ["#00D2BE", "#0600EF", "#DC0000", "#FF8700", "#006F62"];
        (0..no_cars)
            .map(|i| CarPars {
                name: format!("Driver {}", i + 1),
                color: colors[i % colors.len()].to_owned(),
                driver_skill: 0.8 + 0.02 * (i % 5) as f64,
                car_skill: 0.85,
                aggression: 0.4,
            })
            .collect()
    }

    fn test_race(no_cars: usize, tot_no_laps: u32, seed: u64) -> Race {
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
        Race::new(
            &race_pars,
            &track_pars,
            &test_car_pars(no_cars),
            TirePars::default(),
            Weather::default(),
            0.5,
            Box::new(BuiltinPhysics),
            StdRng::seed_from_u64(seed),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_roster_is_a_construction_error() {
        let race_pars = RacePars {
            tot_no_laps: 10,
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
        let err = Race::new(
            &race_pars,
            &track_pars,
            &[],
            TirePars::default(),
            Weather::default(),
            0.5,
            Box::new(BuiltinPhysics),
            StdRng::seed_from_u64(0),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SimError>(),
            Some(SimError::EmptyRoster)
        ));
    }

    #[test]
    fn test_tick_is_gated_on_start() {
        let mut race = test_race(4, 10, 1);
        race.simulate_timestep();
        assert_eq!(race.cur_racetime, 0.0);
        assert!(race.cars_list.iter().all(|c| c.total_time == 0.0));

        race.start(Weather::default());
        race.simulate_timestep();
        assert!(race.cur_racetime > 0.0);
    }

    #[test]
    fn test_pause_freezes_and_resume_continues() {
        let mut race = test_race(4, 10, 2);
        race.start(Weather::default());
        for _ in 0..10 {
            race.simulate_timestep();
        }
        let frozen = race.cur_racetime;

        race.pause();
        for _ in 0..10 {
            race.simulate_timestep();
        }
        assert_eq!(race.cur_racetime, frozen);

        race.resume();
        race.simulate_timestep();
        assert!(race.cur_racetime > frozen);
    }

    #[test]
    fn test_state_stays_in_bounds_over_many_ticks() {
        let mut race = test_race(6, 100, 3);
        race.start(Weather::clamped(0.4, 30.0, 5.0));

        for _ in 0..4000 {
            race.simulate_timestep();
        }

        for car in race.cars_list.iter() {
            assert!((0.0..1.0).contains(&car.wear), "wear out of range");
            assert!((0.0..=100.0).contains(&car.fuel), "fuel out of range");
            assert!(car.v >= 0.0);
            assert!(car.tire_temp >= race.weather.track_temp - 1e-9);
        }
        assert!(race.cur_racetime > 0.0);
    }

    #[test]
    fn test_leaderboard_comparator_is_antisymmetric() {
        let mut race = test_race(6, 100, 4);
        race.start(Weather::default());
        for _ in 0..500 {
            race.simulate_timestep();
        }

        for a in 0..race.cars_list.len() {
            for b in 0..race.cars_list.len() {
                if a == b {
                    continue;
                }
                assert_eq!(
                    race.compare_rank(a, b),
                    race.compare_rank(b, a).reverse(),
                    "comparator must be antisymmetric"
                );
            }
        }

        // positions derived from the order are a permutation of 1..=n
        let order = race.leaderboard_order();
        let mut positions = race.positions(&order);
        positions.sort_unstable();
        let expected: Vec<u32> = (1..=race.cars_list.len() as u32).collect();
        assert_eq!(positions, expected);
    }

    #[test]
    fn test_race_runs_to_finish_and_reports() {
        let mut race = test_race(3, 2, 5);
        race.start(Weather::clamped(0.0, 25.0, 0.0));

        let mut guard = 0;
        while !race.race_finished {
            race.simulate_timestep();
            guard += 1;
            assert!(guard < 200_000, "race did not finish");
        }

        let snapshot = race.snapshot();
        assert!(snapshot.race_finished);
        assert!(snapshot.undercut_summary.is_some());
        assert_eq!(snapshot.cars.len(), 3);
        assert_eq!(snapshot.cars[0].position, 1);
        assert_eq!(snapshot.cars[0].time_interval, 0.0);
        assert_eq!(
            snapshot.tire_distribution.values().sum::<u32>(),
            race.cars_list.len() as u32
        );

        let payload = race.insights_payload().unwrap();
        assert_eq!(payload.race_summary.winner, snapshot.cars[0].name);
        assert!(payload
            .drivers
            .iter()
            .any(|d| d.laps_completed >= race.tot_no_laps));

        assert!(race
            .events
            .iter()
            .any(|e| matches!(e.kind, RaceEventKind::RaceFinished { .. })));

        // once finished, ticking stops until an explicit reset
        let frozen = race.cur_racetime;
        race.simulate_timestep();
        assert_eq!(race.cur_racetime, frozen);
    }

    #[test]
    fn test_insights_payload_requires_finish() {
        let mut race = test_race(3, 10, 6);
        race.start(Weather::default());
        assert!(matches!(
            race.insights_payload(),
            Err(SimError::RaceNotFinished)
        ));
    }

    #[test]
    fn test_reset_reinitializes_all_state() {
        let mut race = test_race(4, 100, 7);
        race.start(Weather::default());
        for _ in 0..1000 {
            race.simulate_timestep();
        }

        race.reset();
        assert_eq!(race.cur_racetime, 0.0);
        assert!(!race.race_started);
        assert!(!race.race_finished);
        assert!(race.events.is_empty());
        for car in race.cars_list.iter() {
            assert_eq!(car.laps_completed, 0);
            assert_eq!(car.total_time, 0.0);
            assert_eq!(car.wear, 0.0);
            assert!(car.pit_history.is_empty());
        }
    }

    #[test]
    fn test_recorded_undercut_outcomes_are_symmetric() {
        let mut race = test_race(2, 30, 8);
        race.start(Weather::default());

        // both cars have an open pit-history entry for the outcomes to attach to
        race.cars_list[0].pit_history.push(PitStop {
            lap: 10,
            compound_before: Compound::Medium,
            compound_after: Some(Compound::Hard),
            duration: 22.0,
            undercuts: Vec::new(),
        });
        race.cars_list[1].pit_history.push(PitStop {
            lap: 11,
            compound_before: Compound::Medium,
            compound_after: Some(Compound::Soft),
            duration: 22.0,
            undercuts: Vec::new(),
        });

        race.record_undercuts(&[ResolvedUndercut {
            initiator: 0,
            opponent: 1,
            lap: 11,
            swing: 1.4,
            initiator_position_before: 2,
            initiator_position_after: 1,
            opponent_position_before: 1,
            opponent_position_after: 2,
        }]);

        let initiator = &race.cars_list[0].pit_history[0].undercuts[0];
        let opponent = &race.cars_list[1].pit_history[0].undercuts[0];

        assert_eq!(initiator.role, UndercutRole::Attempted);
        assert_eq!(opponent.role, UndercutRole::Covered);
        assert!((initiator.gain + opponent.gain).abs() < 1e-12);
        assert!(initiator.success);
        assert!(!opponent.success);
        assert!((initiator.compound_delta + opponent.compound_delta).abs() < 1e-12);

        assert!(race
            .events
            .iter()
            .any(|e| matches!(e.kind, RaceEventKind::UndercutResolved { .. })));
    }

    #[test]
    fn test_no_drs_before_allowed_lap() {
        let mut race = test_race(4, 10, 9);
        race.start(Weather::default());

        let order = race.leaderboard_order();
        let positions = race.positions(&order);
        let views = race.build_views(&positions);
        for idx in 0..race.cars_list.len() {
            assert!(!race.drs_eligible(idx, &order, &views));
        }
    }
}
