use crate::core::pit::PitStop;
use crate::core::race::Weather;
use crate::core::tires::Compound;
use crate::post::race_result::UndercutHighlight;
use serde::Serialize;
use std::collections::HashMap;

/// Snapshots are published to observers at most this often (Hz). The physics step rate is
/// independent of this cadence.
pub const MAX_STREAM_UPDATE_FREQUENCY: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// CarSnapshot is the published per-car state. Positions are leaderboard ranks (1-based);
/// x/y/heading locate the car on the centerline for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct CarSnapshot {
    pub name: String,
    pub color: String,
    pub rgb: RgbColor,
    pub position: u32,
    pub laps: u32,
    pub wear: f64,
    pub compound: Compound,
    pub fuel: f64,
    /// (km/h) Display speed.
    pub speed: f64,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub total_time: f64,
    pub on_pit: bool,
    pub drs_active: bool,
    /// (s) Time interval to the race leader (0 for the leader itself).
    pub time_interval: f64,
    /// (s) Gap to the car one position ahead (0 for the leader).
    pub gap_ahead: f64,
    pub pit_history: Vec<PitStop>,
}

/// RaceSnapshot is the immutable, deep-copied race state handed to the transport boundary
/// once per publication interval. Readers never observe the live mutable state.
#[derive(Debug, Clone, Serialize)]
pub struct RaceSnapshot {
    /// (s) Simulated race time.
    pub time: f64,
    /// Cars in leaderboard order.
    pub cars: Vec<CarSnapshot>,
    pub weather: Weather,
    pub total_laps: u32,
    pub tire_distribution: HashMap<Compound, u32>,
    pub race_started: bool,
    pub paused: bool,
    pub race_finished: bool,
    /// Race-wide undercut summary, present only once the race has finished.
    pub undercut_summary: Option<Vec<UndercutHighlight>>,
}
