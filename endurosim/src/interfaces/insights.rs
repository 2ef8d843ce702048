use crate::post::race_result::RacePayload;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// InsightsError is the typed failure surface of the narrative generator. These errors are
/// returned to the on-demand caller only and never reach the tick loop.
#[derive(Debug, Error)]
pub enum InsightsError {
    #[error("insights generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed insights response: {0}")]
    MalformedResponse(String),

    #[error("insights transport failure: {0}")]
    Transport(String),
}

/// ScoredInsight is one generated observation with a model confidence score in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredInsight {
    pub category: String,
    pub score: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverInsights {
    pub driver: String,
    /// (0-1) Overall rating of the executed strategy.
    pub strategy_rating: f64,
    pub insights: Vec<ScoredInsight>,
}

/// InsightsDocument is the structured result of a generation run, covering one or many
/// drivers depending on the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsDocument {
    pub drivers: Vec<DriverInsights>,
}

/// InsightsGenerator is the collaborator contract for the narrative generator backed by an
/// external summarization service. Implementations run fully outside the tick loop, enforce
/// their own timeout and must never block the simulation.
pub trait InsightsGenerator: Send {
    /// generate_insights produces scored insights for every driver in the payload.
    fn generate_insights(&self, payload: &RacePayload) -> Result<InsightsDocument, InsightsError>;

    /// generate_driver_insights produces scored insights for a single driver.
    fn generate_driver_insights(
        &self,
        payload: &RacePayload,
        driver: &str,
    ) -> Result<InsightsDocument, InsightsError>;
}
