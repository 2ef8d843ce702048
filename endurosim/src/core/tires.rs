use serde::{Deserialize, Serialize};

/// Grip can never drop to zero, the cornering speed formula divides by it downstream.
const GRIP_FLOOR: f64 = 0.05;

/// Tire temperatures are hard-limited; rubber above this temperature is treated as saturated.
pub const MAX_TIRE_TEMP: f64 = 150.0;

/// Cornering force (curvature * v^2) above which the high-heat-generation regime applies.
const CORNER_FORCE_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
}

impl Compound {
    pub const DRY: [Compound; 3] = [Compound::Soft, Compound::Medium, Compound::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Compound::Soft => "SOFT",
            Compound::Medium => "MEDIUM",
            Compound::Hard => "HARD",
            Compound::Intermediate => "INTERMEDIATE",
            Compound::Wet => "WET",
        }
    }

    /// Intermediates and full wets form the wet compound class, the slicks the dry class.
    pub fn is_wet_class(&self) -> bool {
        matches!(self, Compound::Intermediate | Compound::Wet)
    }

    /// same_class checks whether two compounds are strategically comparable.
    pub fn same_class(&self, other: Compound) -> bool {
        self.is_wet_class() == other.is_wet_class()
    }
}

/// * `base_grip` - Grip coefficient of a fresh set at optimal temperature (also acts as the
/// straight-line speed multiplier of the compound)
/// * `wear_rate` - Wear rate multiplier relative to the medium compound
/// * `heat_factor` - Heat generation multiplier relative to the medium compound
/// * `wear_sensitivity` - Grip loss per unit wear (softer compounds degrade faster)
#[derive(Debug, Deserialize, Clone)]
pub struct CompoundPars {
    pub base_grip: f64,
    pub wear_rate: f64,
    pub heat_factor: f64,
    pub wear_sensitivity: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TirePars {
    pub soft: CompoundPars,
    pub medium: CompoundPars,
    pub hard: CompoundPars,
    pub intermediate: CompoundPars,
    pub wet: CompoundPars,
}

impl Default for TirePars {
    fn default() -> Self {
        TirePars {
            soft: CompoundPars {
                base_grip: 1.00,
                wear_rate: 2.0,
                heat_factor: 1.2,
                wear_sensitivity: 0.6,
            },
            medium: CompoundPars {
                base_grip: 0.95,
                wear_rate: 1.0,
                heat_factor: 1.0,
                wear_sensitivity: 0.5,
            },
            hard: CompoundPars {
                base_grip: 0.90,
                wear_rate: 0.5,
                heat_factor: 0.8,
                wear_sensitivity: 0.4,
            },
            intermediate: CompoundPars {
                base_grip: 0.82,
                wear_rate: 1.1,
                heat_factor: 0.85,
                wear_sensitivity: 0.5,
            },
            wet: CompoundPars {
                base_grip: 0.78,
                wear_rate: 1.2,
                heat_factor: 0.9,
                wear_sensitivity: 0.5,
            },
        }
    }
}

impl TirePars {
    pub fn for_compound(&self, compound: Compound) -> &CompoundPars {
        match compound {
            Compound::Soft => &self.soft,
            Compound::Medium => &self.medium,
            Compound::Hard => &self.hard,
            Compound::Intermediate => &self.intermediate,
            Compound::Wet => &self.wet,
        }
    }

    /// grip returns the effective grip coefficient for the given tire and ambient state.
    /// `handling` is the skill-blended driver/car factor in [0, 1].
    pub fn grip(&self, compound: Compound, wear: f64, tire_temp: f64, rain: f64, handling: f64) -> f64 {
        let pars = self.for_compound(compound);
        let mut grip = pars.base_grip * (1.0 - pars.wear_sensitivity * wear);

        // grip falls off outside the optimal temperature window (~80-120 C), floored so a
        // stone-cold set still turns the car
        if !(80.0..=120.0).contains(&tire_temp) {
            let temp_factor = (1.0 - 0.2 * ((tire_temp - 100.0) / 100.0).abs()).max(0.7);
            grip *= temp_factor;
        }

        grip *= match compound {
            Compound::Wet => 1.0 + 0.5 * rain,
            Compound::Intermediate => {
                if rain > 0.3 {
                    1.0 + 0.3 * rain
                } else {
                    1.0 - 0.5 * rain
                }
            }
            _ => 1.0 - 0.9 * rain,
        };

        grip *= 0.8 + 0.4 * handling;
        grip.max(GRIP_FLOOR)
    }

    /// update_temperature advances the tire temperature over one timestep. Heat generation
    /// scales with speed, plus a non-linear cornering term above the force threshold; cooling
    /// scales with the gap to ambient and is accelerated by rain.
    pub fn update_temperature(
        &self,
        compound: Compound,
        tire_temp: f64,
        v: f64,
        curvature: f64,
        ambient: f64,
        rain: f64,
        dt: f64,
    ) -> f64 {
        let heat_factor = self.for_compound(compound).heat_factor;

        let corner_force = curvature * v * v;
        let mut heat_gen = 0.03 * v;
        if corner_force > CORNER_FORCE_THRESHOLD {
            heat_gen += 0.12 * corner_force.powf(1.3);
        }
        heat_gen *= heat_factor;

        let cooling = 0.05 * (tire_temp - ambient) * (1.0 + 2.0 * rain);

        (tire_temp + (heat_gen - cooling) * dt).clamp(ambient, MAX_TIRE_TEMP)
    }

    /// wear_increment returns the wear added over one timestep. Worn-down rubber wears even
    /// faster because the car slides more as grip fades.
    pub fn wear_increment(&self, compound: Compound, effective_grip: f64, dt: f64) -> f64 {
        let base_wear_rate = 0.0005 * (1.0 + 0.8 * (1.0 - effective_grip));
        base_wear_rate * self.for_compound(compound).wear_rate * dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wet_compound_outperforms_dry_in_heavy_rain() {
        let pars = TirePars::default();

        let wet_grip = pars.grip(Compound::Wet, 0.1, 100.0, 1.0, 0.8);
        let soft_grip = pars.grip(Compound::Soft, 0.1, 100.0, 1.0, 0.8);
        assert!(wet_grip > soft_grip);
    }

    #[test]
    fn test_wet_compound_underperforms_dry_when_dry() {
        let pars = TirePars::default();

        let wet_grip = pars.grip(Compound::Wet, 0.1, 100.0, 0.0, 0.8);
        let soft_grip = pars.grip(Compound::Soft, 0.1, 100.0, 0.0, 0.8);
        assert!(wet_grip < soft_grip);
    }

    #[test]
    fn test_grip_never_reaches_zero() {
        let pars = TirePars::default();

        let grip = pars.grip(Compound::Soft, 0.99, MAX_TIRE_TEMP, 1.0, 0.0);
        assert!(grip >= GRIP_FLOOR);
    }

    #[test]
    fn test_soft_wears_faster_than_hard() {
        let pars = TirePars::default();

        let soft = pars.wear_increment(Compound::Soft, 0.9, 0.5);
        let hard = pars.wear_increment(Compound::Hard, 0.9, 0.5);
        assert!(soft > hard);
    }

    #[test]
    fn test_temperature_is_clamped() {
        let pars = TirePars::default();

        // massive cornering load for many steps must not push past the cap
        let mut temp = 140.0;
        for _ in 0..1000 {
            temp = pars.update_temperature(Compound::Soft, temp, 80.0, 0.05, 25.0, 0.0, 0.5);
        }
        assert!(temp <= MAX_TIRE_TEMP);

        // parked car in the rain cools to ambient, not below
        let mut temp = 90.0;
        for _ in 0..1000 {
            temp = pars.update_temperature(Compound::Soft, temp, 0.0, 0.0, 25.0, 1.0, 0.5);
        }
        assert!((temp - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_grip_penalty_outside_temperature_window() {
        let pars = TirePars::default();

        let in_window = pars.grip(Compound::Medium, 0.2, 100.0, 0.0, 0.8);
        let cold = pars.grip(Compound::Medium, 0.2, 30.0, 0.0, 0.8);
        let hot = pars.grip(Compound::Medium, 0.2, 145.0, 0.0, 0.8);
        assert!(cold < in_window);
        assert!(hot < in_window);
    }
}
