/// Speed multiplier bounds; values outside are clamped, never rejected.
pub const MIN_SPEED_MULTIPLIER: f64 = 0.1;
pub const MAX_SPEED_MULTIPLIER: f64 = 10.0;

/// SimulationClock converts elapsed wall-clock time into a whole number of fixed-size physics
/// ticks. The speed multiplier scales how many ticks are due per wall-clock interval; the
/// timestep size itself never changes. Fractional ticks are carried over so no simulated time
/// is lost between publication intervals.
#[derive(Debug)]
pub struct SimulationClock {
    timestep_size: f64,
    speed_multiplier: f64,
    tick_debt: f64,
}

impl SimulationClock {
    pub fn new(timestep_size: f64) -> SimulationClock {
        SimulationClock {
            timestep_size,
            speed_multiplier: 1.0,
            tick_debt: 0.0,
        }
    }

    pub fn timestep_size(&self) -> f64 {
        self.timestep_size
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.speed_multiplier
    }

    pub fn set_speed(&mut self, multiplier: f64) {
        self.speed_multiplier = multiplier.clamp(MIN_SPEED_MULTIPLIER, MAX_SPEED_MULTIPLIER);
    }

    /// ticks_due returns how many physics ticks must be stepped for the elapsed wall-clock
    /// time. While the race is not running (not started, paused or finished) no ticks are due
    /// and the carried fraction is dropped, so resuming does not replay the idle period.
    pub fn ticks_due(&mut self, wall_dt: f64, running: bool) -> u32 {
        if !running {
            self.tick_debt = 0.0;
            return 0;
        }

        self.tick_debt += wall_dt * self.speed_multiplier / self.timestep_size;
        let whole = self.tick_debt.floor();
        self.tick_debt -= whole;
        whole as u32
    }
}
