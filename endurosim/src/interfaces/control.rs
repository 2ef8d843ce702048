use crate::core::race::Weather;
use crate::error::SimError;
use crate::interfaces::stream::RaceSnapshot;
use crate::post::race_result::RacePayload;
use flume::{Receiver, Sender};
use serde::Serialize;

/// RaceCommand is the message set of the control surface. Commands are applied by the
/// simulation thread between ticks; queries carry their own reply sender.
#[derive(Debug)]
pub enum RaceCommand {
    Start { weather: Weather },
    Pause,
    Resume,
    SetSpeed(f64),
    Reset,
    Status(Sender<RaceStatus>),
    Subscribe(Sender<RaceSnapshot>),
    InsightsPayload(Sender<Result<RacePayload, SimError>>),
    Shutdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaceStatus {
    pub race_started: bool,
    pub paused: bool,
    pub race_finished: bool,
    /// (s) Simulated race time.
    pub time: f64,
    pub weather: Weather,
    pub total_laps: u32,
    pub speed_multiplier: f64,
}

/// RaceControl is the caller-side handle of the control surface. All methods are cheap
/// channel sends; a closed channel means the simulation thread is gone.
#[derive(Debug, Clone)]
pub struct RaceControl {
    tx: Sender<RaceCommand>,
}

impl RaceControl {
    pub fn new(tx: Sender<RaceCommand>) -> RaceControl {
        RaceControl { tx }
    }

    fn send(&self, cmd: RaceCommand) -> Result<(), SimError> {
        self.tx.send(cmd).map_err(|_| SimError::ControlChannelClosed)
    }

    /// start (re)initializes track, cars and weather and begins ticking.
    pub fn start(&self, weather: Weather) -> Result<(), SimError> {
        self.send(RaceCommand::Start { weather })
    }

    pub fn pause(&self) -> Result<(), SimError> {
        self.send(RaceCommand::Pause)
    }

    pub fn resume(&self) -> Result<(), SimError> {
        self.send(RaceCommand::Resume)
    }

    /// set_speed adjusts the simulation speed multiplier; out-of-range values are clamped.
    pub fn set_speed(&self, multiplier: f64) -> Result<(), SimError> {
        self.send(RaceCommand::SetSpeed(multiplier))
    }

    /// reset reinitializes all race state without starting.
    pub fn reset(&self) -> Result<(), SimError> {
        self.send(RaceCommand::Reset)
    }

    pub fn shutdown(&self) -> Result<(), SimError> {
        self.send(RaceCommand::Shutdown)
    }

    pub fn status(&self) -> Result<RaceStatus, SimError> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        self.send(RaceCommand::Status(reply_tx))?;
        reply_rx.recv().map_err(|_| SimError::ControlChannelClosed)
    }

    /// subscribe registers a new snapshot reader. Delivery is best-effort: a reader that
    /// stops receiving is dropped from the broadcast set without affecting the simulation.
    pub fn subscribe(&self) -> Result<Receiver<RaceSnapshot>, SimError> {
        let (snap_tx, snap_rx) = flume::unbounded();
        self.send(RaceCommand::Subscribe(snap_tx))?;
        Ok(snap_rx)
    }

    /// insights_payload fetches the end-of-race data contract for the narrative generator.
    pub fn insights_payload(&self) -> Result<RacePayload, SimError> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        self.send(RaceCommand::InsightsPayload(reply_tx))?;
        reply_rx.recv().map_err(|_| SimError::ControlChannelClosed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_channel_maps_to_typed_error() {
        let (tx, rx) = flume::unbounded();
        let control = RaceControl::new(tx);
        drop(rx);

        assert!(matches!(
            control.pause(),
            Err(SimError::ControlChannelClosed)
        ));
        assert!(matches!(
            control.status(),
            Err(SimError::ControlChannelClosed)
        ));
        assert!(matches!(
            control.insights_payload(),
            Err(SimError::ControlChannelClosed)
        ));
    }
}
