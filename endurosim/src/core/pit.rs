use crate::core::tires::Compound;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// No pit stop is considered below this wear level (unless fuel forces one).
pub const WEAR_PIT_FLOOR: f64 = 0.8;

/// Above this wear level a pit stop becomes certain.
pub const WEAR_PIT_CERTAIN: f64 = 0.9;

/// Fuel level below which a stop is forced regardless of tire wear.
pub const FUEL_CRITICAL: f64 = 5.0;

/// No regular stops inside the final laps of the race.
pub const NO_PIT_FINAL_LAPS: u32 = 3;

/// (s) A gap behind larger than this allows stretching the stint.
const STRETCH_GAP_BEHIND: f64 = 3.0;

/// (m/s) A pursuer closing faster than this pushes the stop forward.
const CLOSING_SPEED_DELTA: f64 = 2.0;

/// (s) Rivals farther away than this are not racing the pitting car.
const UNDERCUT_GAP_WINDOW: f64 = 5.0;

/// Rivals more than this many leaderboard positions away are not racing the pitting car.
const UNDERCUT_POSITION_WINDOW: i64 = 2;

/// (s) Swings below this threshold are noise, not strategy, and are discarded.
pub const UNDERCUT_MATERIALITY: f64 = 1.0;

/// (laps) The opponent must answer the stop within this many laps for the battle to count.
const UNDERCUT_LAP_WINDOW: u32 = 3;

/// (laps) Below this remaining distance the post-stop compound choice leans soft.
const SHORT_STINT_LAPS: u32 = 8;

/// PitStop is one entry of a car's pit-stop history. Undercut outcomes are attached once the
/// respective rival has answered the stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitStop {
    pub lap: u32,
    pub compound_before: Compound,
    pub compound_after: Option<Compound>,
    pub duration: f64,
    pub undercuts: Vec<UndercutOutcome>,
}

/// UndercutRole distinguishes the car that pitted first (attempting the undercut) from the
/// car that answered later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndercutRole {
    Attempted,
    Covered,
}

/// UndercutOutcome is one side of a resolved undercut battle. The two sides carry
/// sign-inverted gains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndercutOutcome {
    pub opponent: String,
    pub role: UndercutRole,
    /// (s) Net time swing from this car's perspective, positive when time was gained.
    pub gain: f64,
    pub success: bool,
    /// Base-grip delta of this car's current compound versus the opponent's.
    pub compound_delta: f64,
    pub position_before: u32,
    pub position_after: u32,
}

/// RivalView is a read-only per-car view the race loop hands to the strategy code, decoupling
/// it from the mutable car list.
#[derive(Debug, Clone)]
pub struct RivalView {
    pub idx: usize,
    pub in_pit: bool,
    pub laps_completed: u32,
    /// (m) Monotonic total distance traveled.
    pub progress: f64,
    pub v: f64,
    pub compound: Compound,
    pub position: u32,
}

/// time_gap returns the signed time gap from a to b (positive when b is ahead), measured with
/// a shared reference speed so pre- and post-stop gaps stay comparable.
pub fn time_gap(a: &RivalView, b: &RivalView) -> f64 {
    let ref_speed = ((a.v + b.v) * 0.5).max(30.0);
    (b.progress - a.progress) / ref_speed
}

/// PendingUndercut is the provisional record of a strategic battle opened by a pit entry and
/// awaiting the rival's answer.
#[derive(Debug, Clone)]
pub struct PendingUndercut {
    pub initiator: usize,
    pub opponent: usize,
    pub initiator_lap: u32,
    /// (s) Signed gap from initiator to opponent at the instant of pit entry.
    pub pre_gap: f64,
    pub initiator_compound: Compound,
    pub opponent_compound: Compound,
    pub initiator_position: u32,
    pub opponent_position: u32,
}

/// ResolvedUndercut is the outcome of a consumed pending battle, ready to be written into
/// both cars' histories.
#[derive(Debug, Clone)]
pub struct ResolvedUndercut {
    pub initiator: usize,
    pub opponent: usize,
    pub lap: u32,
    /// (s) pre-pit gap minus post-pit gap; positive means the initiator gained.
    pub swing: f64,
    pub initiator_position_before: u32,
    pub initiator_position_after: u32,
    pub opponent_position_before: u32,
    pub opponent_position_after: u32,
}

/// UndercutBook tracks all pending undercut battles of the race. Each pending entry is
/// consumed exactly once: finalized when the opponent answers within the qualifying window,
/// discarded otherwise.
#[derive(Debug, Default)]
pub struct UndercutBook {
    pending: Vec<PendingUndercut>,
}

impl UndercutBook {
    /// on_pit_entry opens pending battles against every rival the initiator is actually
    /// racing: same lap, close on time and leaderboard position, comparable compound class.
    /// Earlier unresolved battles initiated by the same car are stale and dropped.
    pub fn on_pit_entry(&mut self, initiator: usize, lap: u32, views: &[RivalView]) {
        self.pending.retain(|p| p.initiator != initiator);

        let me = &views[initiator];
        for rival in views.iter() {
            if rival.idx == initiator || rival.in_pit {
                continue;
            }
            if rival.laps_completed != me.laps_completed {
                continue;
            }
            let gap = time_gap(me, rival);
            if gap.abs() > UNDERCUT_GAP_WINDOW {
                continue;
            }
            if (rival.position as i64 - me.position as i64).abs() > UNDERCUT_POSITION_WINDOW {
                continue;
            }
            if !me.compound.same_class(rival.compound) {
                continue;
            }
            // at most one pending battle per unordered pair
            if self.pending.iter().any(|p| {
                (p.initiator == initiator && p.opponent == rival.idx)
                    || (p.initiator == rival.idx && p.opponent == initiator)
            }) {
                continue;
            }

            self.pending.push(PendingUndercut {
                initiator,
                opponent: rival.idx,
                initiator_lap: lap,
                pre_gap: gap,
                initiator_compound: me.compound,
                opponent_compound: rival.compound,
                initiator_position: me.position,
                opponent_position: rival.position,
            });
        }
    }

    /// on_pit_exit consumes every pending battle waiting on this car's stop. Battles answered
    /// outside the lap window or with an immaterial swing are discarded without record.
    pub fn on_pit_exit(&mut self, car: usize, lap: u32, views: &[RivalView]) -> Vec<ResolvedUndercut> {
        let mut resolved = Vec::new();
        let mut keep = Vec::with_capacity(self.pending.len());

        for p in self.pending.drain(..) {
            if p.opponent != car {
                keep.push(p);
                continue;
            }

            if lap.saturating_sub(p.initiator_lap) > UNDERCUT_LAP_WINDOW {
                continue;
            }

            let initiator = &views[p.initiator];
            let opponent = &views[car];
            let post_gap = time_gap(initiator, opponent);
            let swing = p.pre_gap - post_gap;

            if swing.abs() < UNDERCUT_MATERIALITY {
                continue;
            }

            resolved.push(ResolvedUndercut {
                initiator: p.initiator,
                opponent: car,
                lap,
                swing,
                initiator_position_before: p.initiator_position,
                initiator_position_after: initiator.position,
                opponent_position_before: p.opponent_position,
                opponent_position_after: opponent.position,
            });
        }

        self.pending = keep;
        resolved
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// PitDecisionInputs carries the strategic situation of one car for the per-tick pit call.
#[derive(Debug, Clone)]
pub struct PitDecisionInputs {
    pub wear: f64,
    pub fuel: f64,
    pub laps_left: u32,
    /// (s) Gap to the next car behind on track, if any.
    pub gap_behind: Option<f64>,
    /// (m/s) Speed surplus of the pursuer; positive when it is closing.
    pub closing_speed: f64,
    /// True when the projected rejoin point lands in clear air.
    pub rejoin_clear: bool,
}

/// pit_probability returns the base probability (per second of race time) that the car calls
/// its stop now. The caller scales by the timestep for the Bernoulli trial.
pub fn pit_probability(inp: &PitDecisionInputs) -> f64 {
    if inp.fuel < FUEL_CRITICAL {
        return 1.0;
    }
    if inp.laps_left <= NO_PIT_FINAL_LAPS {
        return 0.0;
    }
    if inp.wear < WEAR_PIT_FLOOR {
        return 0.0;
    }
    if inp.wear >= WEAR_PIT_CERTAIN {
        return 1.0;
    }

    let mut p = (inp.wear - WEAR_PIT_FLOOR) / (WEAR_PIT_CERTAIN - WEAR_PIT_FLOOR);

    if let Some(gap) = inp.gap_behind {
        if gap > STRETCH_GAP_BEHIND {
            // clear air behind, the stint can be stretched
            p /= 1.0 + 0.12 * (gap - STRETCH_GAP_BEHIND);
        } else if inp.closing_speed > CLOSING_SPEED_DELTA {
            // a faster car is closing in, box before it is through
            p *= 1.5;
        }
    }

    if inp.rejoin_clear {
        p *= 1.2;
    }

    p.clamp(0.0, 1.0)
}

/// select_compound picks the post-stop compound: wets under heavy rain, intermediates in
/// mixed conditions, soft for a short final stint, otherwise any slick.
pub fn select_compound<R: Rng>(rain: f64, laps_left: u32, rng: &mut R) -> Compound {
    if rain > 0.6 {
        Compound::Wet
    } else if rain > 0.3 {
        Compound::Intermediate
    } else if laps_left <= SHORT_STINT_LAPS {
        Compound::Soft
    } else {
        Compound::DRY[rng.gen_range(0..Compound::DRY.len())]
    }
}

/// pit_duration assumes tire change and refueling run fully in parallel.
pub fn pit_duration(t_tirechange: f64, refuel_mass: f64, t_refuel_per_kg: f64) -> f64 {
    t_tirechange.max(refuel_mass * t_refuel_per_kg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn base_inputs() -> PitDecisionInputs {
        PitDecisionInputs {
            wear: 0.85,
            fuel: 50.0,
            laps_left: 15,
            gap_behind: Some(2.0),
            closing_speed: 0.0,
            rejoin_clear: false,
        }
    }

    fn view(idx: usize, progress: f64, position: u32) -> RivalView {
        RivalView {
            idx,
            in_pit: false,
            laps_completed: 10,
            progress,
            v: 50.0,
            compound: Compound::Medium,
            position,
        }
    }

    #[test]
    fn test_no_pit_below_wear_floor() {
        let mut inp = base_inputs();
        inp.wear = 0.5;
        assert_eq!(pit_probability(&inp), 0.0);
    }

    #[test]
    fn test_pit_certain_above_band() {
        let mut inp = base_inputs();
        inp.wear = 0.95;
        assert_eq!(pit_probability(&inp), 1.0);
    }

    #[test]
    fn test_forced_fuel_stop_ignores_wear() {
        let mut inp = base_inputs();
        inp.wear = 0.0;
        inp.fuel = 1.0;
        assert_eq!(pit_probability(&inp), 1.0);
    }

    #[test]
    fn test_no_regular_stop_in_final_laps() {
        let mut inp = base_inputs();
        inp.wear = 0.95;
        inp.laps_left = 2;
        assert_eq!(pit_probability(&inp), 0.0);

        // forced fuel stops still happen
        inp.fuel = 1.0;
        assert_eq!(pit_probability(&inp), 1.0);
    }

    #[test]
    fn test_probability_strictly_decreases_with_growing_gap_behind() {
        let mut prev = f64::INFINITY;
        for gap in [3.5, 4.5, 6.0, 10.0] {
            let mut inp = base_inputs();
            inp.gap_behind = Some(gap);
            let p = pit_probability(&inp);
            assert!(p < prev, "probability must fall as the gap behind grows");
            prev = p;
        }
    }

    #[test]
    fn test_closing_pursuer_raises_probability() {
        let calm = pit_probability(&base_inputs());
        let mut inp = base_inputs();
        inp.closing_speed = 5.0;
        assert!(pit_probability(&inp) > calm);
    }

    #[test]
    fn test_select_compound_by_weather_and_distance() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(select_compound(0.9, 20, &mut rng), Compound::Wet);
        assert_eq!(select_compound(0.45, 20, &mut rng), Compound::Intermediate);
        assert_eq!(select_compound(0.0, 5, &mut rng), Compound::Soft);
        assert!(Compound::DRY.contains(&select_compound(0.0, 20, &mut rng)));
    }

    #[test]
    fn test_pit_duration_takes_parallel_maximum() {
        assert_eq!(pit_duration(22.0, 40.0, 0.25), 22.0);
        assert_eq!(pit_duration(22.0, 100.0, 0.25), 25.0);
    }

    #[test]
    fn test_pending_created_only_for_close_rivals() {
        let mut book = UndercutBook::default();
        // rival 1 is 100 m (2 s) ahead, rival 2 half a lap away
        let views = vec![view(0, 5000.0, 3), view(1, 5100.0, 2), view(2, 7500.0, 1)];
        book.on_pit_entry(0, 10, &views);
        assert_eq!(book.pending_count(), 1);
    }

    #[test]
    fn test_pending_requires_same_compound_class() {
        let mut book = UndercutBook::default();
        let mut views = vec![view(0, 5000.0, 2), view(1, 5100.0, 1)];
        views[1].compound = Compound::Wet;
        book.on_pit_entry(0, 10, &views);
        assert_eq!(book.pending_count(), 0);
    }

    #[test]
    fn test_pending_respects_position_window() {
        let mut book = UndercutBook::default();
        let mut views = vec![view(0, 5000.0, 8), view(1, 5100.0, 1)];
        views[1].laps_completed = 10;
        book.on_pit_entry(0, 10, &views);
        assert_eq!(book.pending_count(), 0);
    }

    #[test]
    fn test_at_most_one_pending_per_pair() {
        let mut book = UndercutBook::default();
        let views = vec![view(0, 5000.0, 2), view(1, 5100.0, 1)];
        book.on_pit_entry(0, 10, &views);
        // the rival pits as well before answering; the existing pair entry must survive
        // unduplicated
        book.on_pit_entry(1, 10, &views);
        assert_eq!(book.pending_count(), 1);
    }

    #[test]
    fn test_repeat_stop_discards_stale_pendings() {
        let mut book = UndercutBook::default();
        let views = vec![view(0, 5000.0, 2), view(1, 5100.0, 1)];
        book.on_pit_entry(0, 10, &views);
        assert_eq!(book.pending_count(), 1);

        // initiator stops again two laps later without the rival having answered
        let views_later = vec![view(0, 8000.0, 2), view(1, 8100.0, 1)];
        book.on_pit_entry(0, 12, &views_later);
        assert_eq!(book.pending_count(), 1);
        let resolved = book.on_pit_exit(1, 12, &views_later);
        // the surviving entry is the fresh one from lap 12
        assert!(resolved.is_empty() || resolved[0].lap == 12);
    }

    #[test]
    fn test_immaterial_swing_is_discarded() {
        let mut book = UndercutBook::default();
        let views = vec![view(0, 5000.0, 2), view(1, 5100.0, 1)];
        book.on_pit_entry(0, 10, &views);

        // post-stop gap differs from the pre-stop gap by 0.9 s (45 m at 50 m/s)
        let views_post = vec![view(0, 8000.0, 2), view(1, 8100.0 - 45.0, 1)];
        let resolved = book.on_pit_exit(1, 11, &views_post);
        assert!(resolved.is_empty());
        assert_eq!(book.pending_count(), 0);
    }

    #[test]
    fn test_material_swing_is_resolved_exactly_once() {
        let mut book = UndercutBook::default();
        let views = vec![view(0, 5000.0, 2), view(1, 5100.0, 1)];
        book.on_pit_entry(0, 10, &views);

        // post-stop gap swung by 1.1 s in the initiator's favor (55 m at 50 m/s)
        let views_post = vec![view(0, 8000.0, 2), view(1, 8100.0 - 55.0, 1)];
        let resolved = book.on_pit_exit(1, 11, &views_post);
        assert_eq!(resolved.len(), 1);
        assert!((resolved[0].swing - 1.1).abs() < 1e-9);
        assert!(resolved[0].swing > 0.0);

        // consumed exactly once, a second exit resolves nothing
        assert_eq!(book.pending_count(), 0);
        assert!(book.on_pit_exit(1, 11, &views_post).is_empty());
    }

    #[test]
    fn test_late_answer_outside_lap_window_is_discarded() {
        let mut book = UndercutBook::default();
        let views = vec![view(0, 5000.0, 2), view(1, 5100.0, 1)];
        book.on_pit_entry(0, 10, &views);

        let views_post = vec![view(0, 30000.0, 2), view(1, 29900.0, 1)];
        let resolved = book.on_pit_exit(1, 15, &views_post);
        assert!(resolved.is_empty());
        assert_eq!(book.pending_count(), 0);
    }
}
