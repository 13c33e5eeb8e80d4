use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::date::CivilDate;

/// One logged sleep episode. Owned by the caller; the engine only reads it.
///
/// Timestamps are Unix seconds in the caller's local frame — the engine
/// does no timezone math. The attributed `date` is part of the input
/// contract (a late-evening episode usually belongs to the following day).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepRecord {
    pub id: Uuid,
    /// Episode start, Unix seconds.
    pub start_unix: i64,
    /// Episode end, Unix seconds.
    pub end_unix: i64,
    /// Slept hours. May be less than the in-bed interval.
    pub duration_h: f64,
    /// Quality score in [0, 1].
    pub quality: f64,
    /// False for naps.
    pub is_main_sleep: bool,
    /// Calendar date this episode is attributed to.
    pub date: CivilDate,
}

impl SleepRecord {
    /// Clock hour of the episode midpoint, in [0, 24).
    pub fn midpoint_hour(&self) -> f64 {
        let mid_secs = (self.start_unix + self.end_unix) as f64 / 2.0;
        (mid_secs / 3600.0).rem_euclid(24.0)
    }
}

/// Parse a JSON array of sleep records (camelCase field names).
pub fn records_from_json(json: &str) -> Result<Vec<SleepRecord>, serde_json::Error> {
    serde_json::from_str(json)
}
