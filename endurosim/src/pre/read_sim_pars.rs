use crate::core::car::CarPars;
use crate::core::race::{RacePars, Weather};
use crate::core::tires::TirePars;
use crate::core::track::TrackPars;
use anyhow::Context;
use serde::Deserialize;
use std::fs::OpenOptions;
use std::path::Path;

/// SimPars is used to store all other parameter structs.
#[derive(Debug, Deserialize, Clone)]
pub struct SimPars {
    pub race_pars: RacePars,
    pub track_pars: TrackPars,
    #[serde(default)]
    pub tire_pars: TirePars,
    #[serde(default)]
    pub weather: Weather,
    pub car_pars_all: Vec<CarPars>,
}

/// read_sim_pars reads the JSON file and decodes the JSON string into the simulation
/// parameters struct.
pub fn read_sim_pars(filepath: &Path) -> anyhow::Result<SimPars> {
    let fh = OpenOptions::new()
        .read(true)
        .open(filepath)
        .context(format!(
            "Failed to open parameter file {}!",
            filepath.to_str().unwrap_or("unknown")
        ))?;
    let pars = serde_json::from_reader(&fh).context(format!(
        "Failed to parse parameter file {}!",
        filepath.to_str().unwrap_or("unknown")
    ))?;
    Ok(pars)
}

/// default_sim_pars returns the built-in grand-prix setup used when no parameter file is
/// given: the embedded track layout and a full 20-car grid.
pub fn default_sim_pars() -> SimPars {
    let roster: [(&str, &str); 20] = [
        ("Oscar Piastri", "#FF8700"),
        ("Lando Norris", "#FF8700"),
        ("George Russell", "#00D2BE"),
        ("Kimi Antonelli", "#00D2BE"),
        ("Max Verstappen", "#0600EF"),
        ("Yuki Tsunoda", "#0600EF"),
        ("Charles Leclerc", "#DC0000"),
        ("Lewis Hamilton", "#DC0000"),
        ("Alexander Albon", "#005AFF"),
        ("Carlos Sainz", "#005AFF"),
        ("Liam Lawson", "#1E41FF"),
        ("Isack Hadjar", "#1E41FF"),
        ("Lance Stroll", "#006F62"),
        ("Fernando Alonso", "#006F62"),
        ("Esteban Ocon", "#FFFFFF"),
        ("Oliver Bearman", "#FFFFFF"),
        ("Nico Hulkenberg", "#00E701"),
        ("Gabriel Bortoleto", "#00E701"),
        ("Pierre Gasly", "#0090FF"),
        ("Franco Colapinto", "#0090FF"),
    ];

    let car_pars_all = roster
        .iter()
        .enumerate()
        .map(|(i, (name, color))| CarPars {
            name: (*name).to_owned(),
            color: (*color).to_owned(),
            // deterministic spread over the ability ranges instead of a random draw
            driver_skill: 0.75 + 0.012 * (i % 20) as f64,
            car_skill: 0.80 + 0.008 * ((i * 7) % 20) as f64,
            aggression: 0.30 + 0.035 * ((i * 13) % 20) as f64,
        })
        .collect();

    SimPars {
        race_pars: RacePars {
            tot_no_laps: 36,
            drs_allowed_lap: 2,
            t_tirechange: 22.0,
            t_refuel_per_kg: 0.12,
            start_fuel: 100.0,
            t_pit_stdev: 0.8,
        },
        track_pars: TrackPars {
            name: "Grand Prix Circuit".to_owned(),
            waypoints: None,
            csv_file: None,
            n_samples: 2000,
            drs_zone_frac: [0.72, 0.95],
        },
        tire_pars: TirePars::default(),
        weather: Weather::default(),
        car_pars_all,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::car::Car;

    #[test]
    fn test_default_pars_build_a_valid_grid() {
        let pars = default_sim_pars();

        assert_eq!(pars.car_pars_all.len(), 20);
        for car_pars in pars.car_pars_all.iter() {
            // every default entry must construct cleanly, color included
            Car::new(car_pars).unwrap();
            assert!((0.0..=1.0).contains(&car_pars.driver_skill));
            assert!((0.0..=1.0).contains(&car_pars.car_skill));
            assert!((0.0..=1.0).contains(&car_pars.aggression));
        }
    }

    #[test]
    fn test_sim_pars_decode_with_defaults() {
        let json = r##"{
            "race_pars": { "tot_no_laps": 20 },
            "track_pars": { "name": "test" },
            "car_pars_all": [
                { "name": "Driver 1", "color": "#DC0000",
                  "driver_skill": 0.9, "car_skill": 0.85, "aggression": 0.4 }
            ]
        }"##;

        let pars: SimPars = serde_json::from_str(json).unwrap();
        assert_eq!(pars.race_pars.tot_no_laps, 20);
        assert_eq!(pars.race_pars.drs_allowed_lap, 2);
        assert_eq!(pars.track_pars.n_samples, 2000);
        assert_eq!(pars.weather.track_temp, 22.0);
        assert_eq!(pars.car_pars_all.len(), 1);
    }

    #[test]
    fn test_missing_parameter_file_is_reported() {
        let err = read_sim_pars(Path::new("does/not/exist.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to open parameter file"));
    }
}
