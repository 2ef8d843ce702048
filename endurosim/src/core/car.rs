use crate::core::pit::PitStop;
use crate::core::race::Weather;
use crate::core::tires::{Compound, TirePars};
use crate::core::track::Track;
use crate::error::SimError;
use crate::interfaces::physics::{BuiltinPhysics, PhysicsBackend, PhysicsInput};
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

/// (1/s) Fuel burned per second of racing.
const FUEL_BURN_RATE: f64 = 0.02;

/// (s) Distance look-ahead horizon for anticipating the next corner.
const LOOKAHEAD_TIME: f64 = 2.0;

/// Wear is kept strictly below 1.0.
const WEAR_CAP: f64 = 0.99;

/// * `name` - Driver name, e.g. "Valtteri Bottas"
/// * `color` - CSS hex color used by observers, e.g. "#00D2BE"
/// * `driver_skill` - (0-1) Driver ability, raises speed and lowers error rates
/// * `car_skill` - (0-1) Car/chassis ability, blended into effective grip
/// * `aggression` - (0-1) Raises both racing pace risk and error rates
#[derive(Debug, Deserialize, Clone)]
pub struct CarPars {
    pub name: String,
    pub color: String,
    pub driver_skill: f64,
    pub car_skill: f64,
    pub aggression: f64,
}

/// ErrorKind is the severity tier of an injected driver error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MinorLockup,
    Excursion,
    OffTrack,
    Spin,
}

impl ErrorKind {
    /// draw selects a severity tier; light mistakes are far more common than race-ruining
    /// ones.
    pub fn draw<R: Rng>(rng: &mut R) -> ErrorKind {
        let r: f64 = rng.gen();
        if r < 0.45 {
            ErrorKind::MinorLockup
        } else if r < 0.75 {
            ErrorKind::Excursion
        } else if r < 0.92 {
            ErrorKind::OffTrack
        } else {
            ErrorKind::Spin
        }
    }

    /// speed_factor is applied to the car's speed and target while the error is active.
    pub fn speed_factor(&self) -> f64 {
        match self {
            ErrorKind::MinorLockup => 0.85,
            ErrorKind::Excursion => 0.6,
            ErrorKind::OffTrack => 0.3,
            ErrorKind::Spin => 0.0,
        }
    }

    /// duration is how long the car is compromised.
    pub fn duration(&self) -> f64 {
        match self {
            ErrorKind::MinorLockup => 1.0,
            ErrorKind::Excursion => 2.0,
            ErrorKind::OffTrack => 3.0,
            ErrorKind::Spin => 4.0,
        }
    }

    /// time_penalty is the direct race-time loss of the mistake.
    pub fn time_penalty(&self) -> f64 {
        match self {
            ErrorKind::MinorLockup => 0.5,
            ErrorKind::Excursion => 2.0,
            ErrorKind::OffTrack => 4.0,
            ErrorKind::Spin => 6.0,
        }
    }
}

/// DriverError is the transient state of an active mistake.
#[derive(Debug, Clone, Copy)]
pub struct DriverError {
    pub kind: ErrorKind,
    pub remaining: f64,
}

/// TickInputs carries the per-tick context the race loop resolves for one car before its
/// dynamics update (everything that needs knowledge of the other cars).
#[derive(Debug)]
pub struct TickInputs<'a> {
    pub track: &'a Track,
    pub tires: &'a TirePars,
    pub weather: &'a Weather,
    pub drs_eligible: bool,
    pub defend_factor: f64,
    pub tot_laps: u32,
    pub dt: f64,
}

/// TickOutcome reports the discrete events of one car tick back to the race loop.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub laps_crossed: u32,
    pub finished: bool,
    pub error: Option<ErrorKind>,
}

/// Car is the full mutable state of one entrant, owned exclusively by the simulation.
#[derive(Debug)]
pub struct Car {
    pub name: String,
    pub color: String,
    pub rgb: [u8; 3],
    pub driver_skill: f64,
    pub car_skill: f64,
    pub aggression: f64,

    /// (m) Monotonic total distance traveled; the lap position is s modulo track length.
    pub s: f64,
    pub v: f64,
    pub compound: Compound,
    pub wear: f64,
    pub tire_temp: f64,
    pub fuel: f64,
    pub laps_completed: u32,
    pub total_time: f64,
    pub on_pit: bool,
    pub pit_counter: f64,
    pub drs_active: bool,
    pub error: Option<DriverError>,
    pub pit_history: Vec<PitStop>,
    pub best_lap: Option<f64>,
    /// (laps) Laps driven per compound, for the end-of-race summaries.
    pub tire_laps: HashMap<Compound, u32>,
    lap_mark: f64,
}

impl Car {
    pub fn new(car_pars: &CarPars) -> Result<Car, SimError> {
        let parsed = car_pars
            .color
            .parse::<css_color_parser::Color>()
            .map_err(|_| SimError::InvalidColor {
                color: car_pars.color.to_owned(),
                driver: car_pars.name.to_owned(),
            })?;

        Ok(Car {
            name: car_pars.name.to_owned(),
            color: car_pars.color.to_owned(),
            rgb: [parsed.r, parsed.g, parsed.b],
            driver_skill: car_pars.driver_skill,
            car_skill: car_pars.car_skill,
            aggression: car_pars.aggression,
            s: 0.0,
            v: 0.0,
            compound: Compound::Medium,
            wear: 0.0,
            tire_temp: 0.0,
            fuel: 0.0,
            laps_completed: 0,
            total_time: 0.0,
            on_pit: false,
            pit_counter: 0.0,
            drs_active: false,
            error: None,
            pit_history: Vec::new(),
            best_lap: None,
            tire_laps: HashMap::new(),
            lap_mark: 0.0,
        })
    }

    /// reset reinitializes the dynamic state for a fresh race: grid spread along the track,
    /// a random slick compound, warm tires, full tank.
    pub fn reset<R: Rng>(
        &mut self,
        grid_idx: usize,
        no_cars: usize,
        track_length: f64,
        ambient: f64,
        start_fuel: f64,
        rng: &mut R,
    ) {
        self.s = grid_idx as f64 * (track_length / no_cars as f64) * 0.6;
        self.v = 0.0;
        self.compound = Compound::DRY[rng.gen_range(0..Compound::DRY.len())];
        self.wear = 0.0;
        self.tire_temp = ambient + 10.0;
        self.fuel = start_fuel;
        self.laps_completed = 0;
        self.total_time = 0.0;
        self.on_pit = false;
        self.pit_counter = 0.0;
        self.drs_active = false;
        self.error = None;
        self.pit_history.clear();
        self.best_lap = None;
        self.tire_laps.clear();
        self.lap_mark = 0.0;
    }

    /// handling blends driver and car ability into the grip factor of the tire model.
    pub fn handling(&self) -> f64 {
        0.7 * self.driver_skill + 0.3 * self.car_skill
    }

    /// lap_pos returns the position within the current lap.
    pub fn lap_pos(&self, track_length: f64) -> f64 {
        self.s.rem_euclid(track_length)
    }

    /// error_probability is the per-second chance of a driver mistake. It grows with rain,
    /// worn tires and aggression, and falls with skill.
    pub fn error_probability(&self, rain: f64) -> f64 {
        let base = 0.0005 + 0.001 * (1.0 - self.driver_skill);
        (base * (1.0 + 4.0 * rain + 6.0 * self.wear + self.aggression)).min(0.5)
    }

    /// advance performs one dynamics tick for a car that is out on track: speed resolution
    /// through the physics backend, error injection, wear/thermal/fuel bookkeeping and track
    /// progress.
    pub fn advance<R: Rng>(
        &mut self,
        inp: &TickInputs,
        rng: &mut R,
        backend: &dyn PhysicsBackend,
    ) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let weather = inp.weather;
        let track = inp.track;

        let grip = inp.tires.grip(
            self.compound,
            self.wear,
            self.tire_temp,
            weather.rain,
            self.handling(),
        );

        let curvature = track.curvature_at_s(self.s);
        let lookahead = self.v * LOOKAHEAD_TIME;
        let curvature_ahead = track.curvature_at_s(self.s + lookahead);

        self.drs_active = inp.drs_eligible;

        let physics_input = PhysicsInput {
            v: self.v,
            grip,
            curvature,
            curvature_ahead,
            compound_base: inp.tires.for_compound(self.compound).base_grip,
            driver_skill: self.driver_skill,
            fuel: self.fuel,
            rain: weather.rain,
            wind: weather.wind,
            drs_active: self.drs_active,
            defend_factor: inp.defend_factor,
            error_speed_factor: self.error.map_or(1.0, |e| e.kind.speed_factor()),
            dt: inp.dt,
        };

        self.v = match backend.step_speed(&physics_input) {
            Ok(v) => v,
            Err(fault) => {
                // plug-in fault: log it and fall back to the built-in model for this car only
                warn!(car = %self.name, backend = backend.name(), %fault, "physics backend failed, using builtin model");
                BuiltinPhysics
                    .step_speed(&physics_input)
                    .unwrap_or(physics_input.v)
            }
        };

        // driver error injection
        if rng.gen::<f64>() < self.error_probability(weather.rain) * inp.dt {
            let kind = ErrorKind::draw(rng);
            self.v *= kind.speed_factor();
            self.total_time += kind.time_penalty();
            self.error = Some(DriverError {
                kind,
                remaining: kind.duration(),
            });
            outcome.error = Some(kind);
        } else if let Some(err) = &mut self.error {
            err.remaining -= inp.dt;
            if err.remaining <= 0.0 {
                self.error = None;
            }
        }

        // wear, temperature, fuel
        self.wear = (self.wear + inp.tires.wear_increment(self.compound, grip, inp.dt)).min(WEAR_CAP);
        self.tire_temp = inp.tires.update_temperature(
            self.compound,
            self.tire_temp,
            self.v,
            curvature,
            weather.track_temp,
            weather.rain,
            inp.dt,
        );
        self.fuel = (self.fuel - FUEL_BURN_RATE * inp.dt).max(0.0);

        // track progress and lap accounting
        let s_prev = self.s;
        self.s += self.v * inp.dt;
        self.total_time += inp.dt;

        outcome.laps_crossed = laps_crossed(s_prev, self.s, track.total_length);
        self.laps_completed += outcome.laps_crossed;
        outcome.finished = self.laps_completed >= inp.tot_laps;

        if outcome.laps_crossed > 0 {
            let laptime = self.total_time - self.lap_mark;
            self.lap_mark = self.total_time;
            if self.best_lap.map_or(true, |best| laptime < best) {
                self.best_lap = Some(laptime);
            }
            *self.tire_laps.entry(self.compound).or_insert(0) += outcome.laps_crossed;
        }

        outcome
    }

    /// begin_pit_stop moves the car into the pits and opens its history entry. The stop
    /// duration itself elapses through tick_pit.
    pub fn begin_pit_stop(&mut self, lap: u32, duration: f64) {
        self.on_pit = true;
        self.pit_counter = duration;
        self.v = 0.0;
        self.drs_active = false;
        self.pit_history.push(PitStop {
            lap,
            compound_before: self.compound,
            compound_after: None,
            duration,
            undercuts: Vec::new(),
        });
    }

    /// tick_pit counts down the standstill and returns true on the tick the stop completes.
    pub fn tick_pit(&mut self, dt: f64) -> bool {
        self.pit_counter -= dt;
        self.total_time += dt;
        if self.pit_counter <= 0.0 {
            self.pit_counter = 0.0;
            self.on_pit = false;
            true
        } else {
            false
        }
    }

    /// finish_pit_stop fits the selected compound, resets wear, warms the new set to a
    /// baseline above ambient and refuels.
    pub fn finish_pit_stop(&mut self, new_compound: Compound, ambient: f64, refuel_to: f64) {
        self.compound = new_compound;
        self.wear = 0.0;
        self.tire_temp = ambient + 10.0;
        self.fuel = self.fuel.max(refuel_to);
        if let Some(stop) = self.pit_history.last_mut() {
            stop.compound_after = Some(new_compound);
        }
    }
}

/// laps_crossed counts how many multiples of the track length lie between the previous and
/// the new total distance. Counting multiples directly means no crossing is ever skipped or
/// double-counted, regardless of step size.
pub fn laps_crossed(s_prev: f64, s_new: f64, track_length: f64) -> u32 {
    let crossings = (s_new / track_length).floor() - (s_prev / track_length).floor();
    crossings.max(0.0) as u32
}
