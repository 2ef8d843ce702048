use crate::core::car::ErrorKind;
use crate::core::pit::{PitStop, UndercutRole};
use crate::core::race::Weather;
use crate::core::tires::Compound;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write;
use std::io::Write as IoWrite;

/// RaceEvent is one structured entry of the race log.
#[derive(Debug, Serialize, Clone)]
pub struct RaceEvent {
    pub lap: u32,
    pub time_s: f64,
    #[serde(flatten)]
    pub kind: RaceEventKind,
}

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RaceEventKind {
    DriverError { driver: String, severity: ErrorKind },
    PitEntry { driver: String, compound: Compound },
    PitExit { driver: String, compound: Compound },
    UndercutResolved { driver: String, opponent: String, gain: f64 },
    RaceFinished { winner: String },
}

/// DriverResult is the per-driver slice of the final classification, including the full
/// pit-stop history with resolved undercut outcomes.
#[derive(Debug, Serialize, Clone)]
pub struct DriverResult {
    pub name: String,
    pub position: u32,
    pub laps_completed: u32,
    pub total_time: f64,
    pub best_lap: Option<f64>,
    pub pit_history: Vec<PitStop>,
    pub tire_usage: HashMap<Compound, u32>,
}

#[derive(Debug, Serialize, Clone)]
pub struct BestLap {
    pub driver: String,
    pub time: f64,
}

/// RaceSummary is the race-wide head of the insights payload.
#[derive(Debug, Serialize, Clone)]
pub struct RaceSummary {
    pub total_laps: u32,
    pub race_duration: f64,
    pub weather: Weather,
    pub track_name: String,
    pub track_length: f64,
    pub winner: String,
    pub fastest_lap: Option<BestLap>,
}

/// RacePayload is the data contract handed to the narrative-insights collaborator: one race
/// summary plus one summary per driver.
#[derive(Debug, Serialize, Clone)]
pub struct RacePayload {
    pub race_summary: RaceSummary,
    pub drivers: Vec<DriverResult>,
}

/// RaceReport contains all race information that is required for post-processing the results.
#[derive(Debug, Serialize, Clone)]
pub struct RaceReport {
    pub tot_no_laps: u32,
    pub track_name: String,
    pub track_length: f64,
    pub weather: Weather,
    pub race_duration: f64,
    /// Final classification in leaderboard order.
    pub results: Vec<DriverResult>,
    pub events: Vec<RaceEvent>,
}

/// UndercutHighlight is one strategic battle of the race-wide summary, surfaced from the
/// perspective of the side that gained time.
#[derive(Debug, Serialize, Clone)]
pub struct UndercutHighlight {
    pub driver: String,
    pub opponent: String,
    pub lap: u32,
    pub gain: f64,
    pub role: UndercutRole,
    pub success: bool,
}

/// undercut_highlights flattens the symmetric per-car outcome records into one entry per
/// battle. Each battle is stored twice with sign-inverted gains; surfacing only the side
/// with positive gain keeps exactly one record per battle.
pub fn undercut_highlights(results: &[DriverResult]) -> Vec<UndercutHighlight> {
    let mut highlights = Vec::new();

    for result in results.iter() {
        for stop in result.pit_history.iter() {
            for outcome in stop.undercuts.iter() {
                if outcome.gain > 0.0 {
                    highlights.push(UndercutHighlight {
                        driver: result.name.to_owned(),
                        opponent: outcome.opponent.to_owned(),
                        lap: stop.lap,
                        gain: outcome.gain,
                        role: outcome.role,
                        success: outcome.success,
                    });
                }
            }
        }
    }

    highlights
}

impl RaceReport {
    pub fn undercut_highlights(&self) -> Vec<UndercutHighlight> {
        undercut_highlights(&self.results)
    }

    /// print_classification prints the final classification and the undercut summary to the
    /// console output.
    pub fn print_classification(&self) {
        let mut tmp_string = String::new();

        for result in self.results.iter() {
            writeln!(
                &mut tmp_string,
                "{:3}. {:24} {:3} laps  {:9.3}s  {} stop(s)",
                result.position,
                result.name,
                result.laps_completed,
                result.total_time,
                result.pit_history.len()
            )
            .unwrap();
        }

        println!("RESULT: Final classification");
        println!("{}", tmp_string);

        let highlights = self.undercut_highlights();
        if !highlights.is_empty() {
            println!("RESULT: Undercut battles");
            for h in highlights.iter() {
                println!(
                    "  lap {:3}: {} vs {} -> {:+.2}s ({:?})",
                    h.lap, h.driver, h.opponent, h.gain, h.role
                );
            }
        }
    }

    /// write_classification_to_file writes the classification to a text file in output/.
    /// Returns the path to the written file.
    pub fn write_classification_to_file(
        &self,
        path: Option<&std::path::Path>,
    ) -> anyhow::Result<String> {
        let mut content = String::new();
        writeln!(&mut content, "RESULT: Final classification")?;

        for result in self.results.iter() {
            writeln!(
                &mut content,
                "{:3}. {:24} {:3} laps  {:9.3}s  {} stop(s)",
                result.position,
                result.name,
                result.laps_completed,
                result.total_time,
                result.pit_history.len()
            )?;
        }

        for h in self.undercut_highlights().iter() {
            writeln!(
                &mut content,
                "UNDERCUT: lap {:3}: {} vs {} -> {:+.2}s",
                h.lap, h.driver, h.opponent, h.gain
            )?;
        }

        let out_dir = std::path::Path::new("output");
        std::fs::create_dir_all(out_dir)?;
        let out_path = if let Some(p) = path {
            p.to_path_buf()
        } else {
            out_dir.join("last_run.txt")
        };
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&out_path)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;

        Ok(out_path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pit::UndercutOutcome;

    fn result_with_outcome(
        name: &str,
        opponent: &str,
        gain: f64,
        role: UndercutRole,
    ) -> DriverResult {
        DriverResult {
            name: name.to_owned(),
            position: 1,
            laps_completed: 30,
            total_time: 3000.0,
            best_lap: Some(92.4),
            pit_history: vec![PitStop {
                lap: 12,
                compound_before: Compound::Soft,
                compound_after: Some(Compound::Hard),
                duration: 22.0,
                undercuts: vec![UndercutOutcome {
                    opponent: opponent.to_owned(),
                    role,
                    gain,
                    success: gain > 0.0,
                    compound_delta: 0.1,
                    position_before: 2,
                    position_after: 1,
                }],
            }],
            tire_usage: HashMap::new(),
        }
    }

    #[test]
    fn test_highlights_surface_only_the_gaining_side() {
        let results = vec![
            result_with_outcome("Alice", "Bob", 1.8, UndercutRole::Attempted),
            result_with_outcome("Bob", "Alice", -1.8, UndercutRole::Covered),
        ];

        let highlights = undercut_highlights(&results);
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].driver, "Alice");
        assert_eq!(highlights[0].opponent, "Bob");
        assert!(highlights[0].gain > 0.0);
    }

    #[test]
    fn test_defended_battle_surfaces_from_defender_perspective() {
        let results = vec![
            result_with_outcome("Alice", "Bob", -1.2, UndercutRole::Attempted),
            result_with_outcome("Bob", "Alice", 1.2, UndercutRole::Covered),
        ];

        let highlights = undercut_highlights(&results);
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].driver, "Bob");
        assert_eq!(highlights[0].role, UndercutRole::Covered);
    }
}
