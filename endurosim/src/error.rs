use thiserror::Error;

/// SimError covers the fatal construction errors and the control-surface errors of the
/// simulator. Per-tick modeling faults and transport faults are handled locally and never
/// surface through this type.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("track must be a closed loop of at least 4 waypoints, got {0}")]
    TooFewWaypoints(usize),

    #[error("track waypoints must form a closed loop (first and last point must coincide)")]
    OpenLoop,

    #[error("track has fewer than 3 distinct waypoints")]
    CollapsedWaypoints,

    #[error("track loop has a degenerate (near-zero) total length")]
    DegenerateLength,

    #[error("driver roster is empty")]
    EmptyRoster,

    #[error("could not parse car color {color:?} of driver {driver}")]
    InvalidColor { color: String, driver: String },

    #[error("race has not finished yet")]
    RaceNotFinished,

    #[error("simulation thread is gone (control channel closed)")]
    ControlChannelClosed,
}
