use thiserror::Error;

/// Scaling constant of the cornering speed formula v = sqrt(grip * k / curvature).
const CORNER_K: f64 = 12.0;

/// (m/s^2) Acceleration toward the target speed.
const ACCEL: f64 = 6.0;

/// (m/s^2) Braking when moderately above the target speed.
const BRAKE_MODERATE: f64 = 15.0;

/// (m/s^2) Braking when far above the target speed.
const BRAKE_HARD: f64 = 20.0;

/// Straight-line speed gain while DRS is open.
const DRS_BOOST: f64 = 1.10;

/// PhysicsInput bundles everything a physics backend may consult when resolving a car's new
/// speed for one timestep. All interaction-dependent terms (DRS, defending, driver errors)
/// are resolved by the race loop beforehand so backends stay free of car-to-car lookups.
#[derive(Debug, Clone)]
pub struct PhysicsInput {
    pub v: f64,
    pub grip: f64,
    pub curvature: f64,
    pub curvature_ahead: f64,
    pub compound_base: f64,
    pub driver_skill: f64,
    pub fuel: f64,
    pub rain: f64,
    pub wind: f64,
    pub drs_active: bool,
    /// 1.0 when unhindered, < 1.0 while holding up a pursuer on a straight.
    pub defend_factor: f64,
    /// 1.0 without an active driver error, < 1.0 while recovering from one.
    pub error_speed_factor: f64,
    pub dt: f64,
}

/// PhysicsFault is raised by plug-in backends. It is caught per car per tick by the race
/// loop, which then falls back to the built-in model for that car.
#[derive(Debug, Error)]
#[error("physics backend fault: {0}")]
pub struct PhysicsFault(pub String);

/// PhysicsBackend is the capability interface for alternative per-car speed models. The
/// built-in implementation must produce plausible results standalone; plug-ins are injected
/// at construction time.
pub trait PhysicsBackend: Send {
    fn name(&self) -> &'static str;

    /// step_speed resolves the car's speed at the end of the timestep.
    fn step_speed(&self, input: &PhysicsInput) -> Result<f64, PhysicsFault>;
}

/// BuiltinPhysics is the default cornering/straight-line/braking model.
#[derive(Debug, Default)]
pub struct BuiltinPhysics;

impl BuiltinPhysics {
    /// cornering_speed returns the grip-limited corner speed, reduced by fuel load and wind.
    pub fn cornering_speed(grip: f64, curvature: f64, fuel: f64, wind: f64) -> f64 {
        let curv = curvature.max(1e-6);
        let mut v = (grip * CORNER_K / curv).sqrt();
        v *= 1.0 - 0.001 * fuel;
        v *= (1.0 - 0.004 * wind).max(0.9);
        v
    }

    /// straight_speed returns the top speed on a free straight.
    pub fn straight_speed(input: &PhysicsInput) -> f64 {
        let mut base = 80.0 + 20.0 * input.driver_skill;
        base *= 1.0 - 0.25 * input.rain;
        base *= 0.90 + 0.15 * input.compound_base;
        base *= 0.95 + 0.1 * input.grip;
        base *= 1.0 - 0.001 * input.fuel;
        if input.drs_active {
            base *= DRS_BOOST;
        }
        base
    }
}

impl PhysicsBackend for BuiltinPhysics {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn step_speed(&self, input: &PhysicsInput) -> Result<f64, PhysicsFault> {
        let v_corner = Self::cornering_speed(input.grip, input.curvature, input.fuel, input.wind);
        let v_corner_ahead =
            Self::cornering_speed(input.grip, input.curvature_ahead, input.fuel, input.wind);
        let v_straight = Self::straight_speed(input);

        let mut target = v_straight.min(v_corner).min(v_corner_ahead);
        target *= input.defend_factor;
        target *= input.error_speed_factor;

        let mut v = input.v;
        if v > target {
            // brake harder the further the car is above the limit
            let excess = v - target;
            let brake = if excess > 5.0 { BRAKE_HARD } else { BRAKE_MODERATE };
            v -= brake * input.dt;
        } else {
            v += ACCEL * input.dt;
        }

        Ok(v.min(target).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_straight_input() -> PhysicsInput {
        PhysicsInput {
            v: 60.0,
            grip: 0.95,
            curvature: 1e-5,
            curvature_ahead: 1e-5,
            compound_base: 0.95,
            driver_skill: 0.9,
            fuel: 50.0,
            rain: 0.0,
            wind: 0.0,
            drs_active: false,
            defend_factor: 1.0,
            error_speed_factor: 1.0,
            dt: 0.5,
        }
    }

    #[test]
    fn test_tight_corner_limits_speed_below_straight() {
        let corner = BuiltinPhysics::cornering_speed(0.95, 0.02, 50.0, 0.0);
        let straight = BuiltinPhysics::straight_speed(&free_straight_input());
        assert!(corner < straight);
    }

    #[test]
    fn test_drs_raises_straight_speed() {
        let mut input = free_straight_input();
        let without = BuiltinPhysics::straight_speed(&input);
        input.drs_active = true;
        let with = BuiltinPhysics::straight_speed(&input);
        assert!((with / without - 1.10).abs() < 1e-9);
    }

    #[test]
    fn test_braking_is_harder_far_above_target() {
        let backend = BuiltinPhysics;

        let mut slightly_over = free_straight_input();
        slightly_over.curvature = 0.02; // corner limit well below current v
        slightly_over.v = BuiltinPhysics::cornering_speed(0.95, 0.02, 50.0, 0.0) + 2.0;
        let v_after_moderate = backend.step_speed(&slightly_over).unwrap();

        let mut far_over = slightly_over.clone();
        far_over.v = slightly_over.v + 10.0;
        let v_after_hard = backend.step_speed(&far_over).unwrap();

        let moderate_drop = slightly_over.v - v_after_moderate;
        let hard_drop = far_over.v - v_after_hard;
        assert!(hard_drop > moderate_drop);
    }

    #[test]
    fn test_defending_reduces_target_speed() {
        let backend = BuiltinPhysics;

        let free = backend.step_speed(&free_straight_input()).unwrap();
        let mut defended = free_straight_input();
        defended.defend_factor = 0.92;
        let held_up = backend.step_speed(&defended).unwrap();
        assert!(held_up <= free);
    }

    #[test]
    fn test_speed_never_negative() {
        let backend = BuiltinPhysics;
        let mut input = free_straight_input();
        input.v = 0.5;
        input.error_speed_factor = 0.0; // spinning car, target speed zero
        let v = backend.step_speed(&input).unwrap();
        assert!(v >= 0.0);
    }
}
