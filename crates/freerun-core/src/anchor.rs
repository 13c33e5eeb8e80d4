//! Per-day observation selection and weighting.
//!
//! Each calendar day contributes at most one anchor: the best record
//! attributed to it. Main sleeps beat naps; among records of equal
//! main-sleep status, higher quality × duration wins. Records too short
//! or too poor to say anything about circadian phase are dropped here and
//! never reach the estimators.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::constants::{
    MIN_ANCHOR_DURATION_H, MIN_ANCHOR_QUALITY, MIN_ANCHOR_WEIGHT, NAP_FACTOR, R_BASE,
    R_DENOM_FLOOR,
};
use crate::record::SleepRecord;

/// The representative observation for one calendar day.
#[derive(Clone, Debug)]
pub struct Anchor {
    /// Days since the global epoch (the first record's date).
    pub day: i64,
    /// Episode midpoint as a clock hour in [0, 24).
    pub midpoint: f64,
    /// Regression weight in [0, 1].
    pub weight: f64,
    pub quality: f64,
    pub duration_h: f64,
    pub is_main_sleep: bool,
    /// Source record.
    pub record_id: Uuid,
}

/// Regression weight for a record: duration ramp × quality, naps damped.
///
/// The duration factor ramps linearly from 0 at 4 h to 1 at 7 h. Returns
/// None when the record is below the anchoring floor entirely.
pub fn anchor_weight(record: &SleepRecord) -> Option<f64> {
    if record.duration_h < MIN_ANCHOR_DURATION_H || record.quality < MIN_ANCHOR_QUALITY {
        return None;
    }
    let duration_factor = ((record.duration_h - 4.0) / 3.0).clamp(0.0, 1.0);
    let mut weight = duration_factor * record.quality;
    if !record.is_main_sleep {
        weight *= NAP_FACTOR;
    }
    if weight < MIN_ANCHOR_WEIGHT {
        None
    } else {
        Some(weight)
    }
}

/// Kalman measurement noise for a record, in h².
///
/// Same quality/nap model as the regression weight but with a wider
/// duration ramp (0→1 over 4–9 h): short sleeps are noisy phase
/// observations rather than worthless ones.
pub fn measurement_noise(record: &SleepRecord) -> f64 {
    let duration_factor = ((record.duration_h - 4.0) / 5.0).clamp(0.0, 1.0);
    let main_factor = if record.is_main_sleep { 1.0 } else { NAP_FACTOR };
    let denom = (record.quality * duration_factor * main_factor).max(R_DENOM_FLOOR);
    R_BASE / denom
}

/// True when `candidate` should replace `current` as a day's anchor.
fn beats(candidate: &SleepRecord, current: &SleepRecord) -> bool {
    if candidate.is_main_sleep != current.is_main_sleep {
        return candidate.is_main_sleep;
    }
    candidate.quality * candidate.duration_h > current.quality * current.duration_h
}

/// Select the best record per day and derive anchors, sorted by day number.
pub fn extract_anchors(records: &[SleepRecord], epoch_day: i64) -> Vec<Anchor> {
    let mut best: BTreeMap<i64, &SleepRecord> = BTreeMap::new();

    for record in records {
        if anchor_weight(record).is_none() {
            continue;
        }
        let day = record.date.day_number() - epoch_day;
        match best.get(&day) {
            Some(current) if !beats(record, current) => {}
            _ => {
                best.insert(day, record);
            }
        }
    }

    best.into_iter()
        .map(|(day, record)| Anchor {
            day,
            midpoint: record.midpoint_hour(),
            // anchor_weight was Some above
            weight: anchor_weight(record).unwrap_or(0.0),
            quality: record.quality,
            duration_h: record.duration_h,
            is_main_sleep: record.is_main_sleep,
            record_id: record.id,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::CivilDate;

    fn record(day: i64, start_hour: f64, duration_h: f64, quality: f64, main: bool) -> SleepRecord {
        let start_unix = day * 86400 + (start_hour * 3600.0) as i64;
        SleepRecord {
            id: Uuid::new_v4(),
            start_unix,
            end_unix: start_unix + (duration_h * 3600.0) as i64,
            duration_h,
            quality,
            is_main_sleep: main,
            date: CivilDate::from_day_number(day),
        }
    }

    #[test]
    fn test_weight_duration_ramp() {
        // 4 h floor → zero weight → dropped
        assert!(anchor_weight(&record(0, 23.0, 4.0, 1.0, true)).is_none());
        // 5.5 h → halfway up the ramp
        let w = anchor_weight(&record(0, 23.0, 5.5, 1.0, true)).unwrap();
        assert!((w - 0.5).abs() < 1e-9, "expected 0.5, got {w}");
        // 7 h and beyond → full weight
        let w = anchor_weight(&record(0, 23.0, 9.0, 1.0, true)).unwrap();
        assert!((w - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_scales_with_quality() {
        let w = anchor_weight(&record(0, 23.0, 8.0, 0.6, true)).unwrap();
        assert!((w - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_nap_damping() {
        let main = anchor_weight(&record(0, 13.0, 8.0, 1.0, true)).unwrap();
        let nap = anchor_weight(&record(0, 13.0, 8.0, 1.0, false)).unwrap();
        assert!((nap - main * NAP_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn test_floor_drops_records() {
        assert!(anchor_weight(&record(0, 23.0, 1.5, 1.0, true)).is_none());
        assert!(anchor_weight(&record(0, 23.0, 8.0, 0.05, true)).is_none());
        // nap just above the 4 h ramp start: weight below MIN_ANCHOR_WEIGHT
        assert!(anchor_weight(&record(0, 13.0, 4.5, 0.8, false)).is_none());
    }

    #[test]
    fn test_measurement_noise_ramp() {
        // Full-duration high-quality main sleep → R_BASE
        let r = measurement_noise(&record(0, 23.0, 9.0, 1.0, true));
        assert!((r - R_BASE).abs() < 1e-9);
        // Halved quality doubles the noise
        let r = measurement_noise(&record(0, 23.0, 9.0, 0.5, true));
        assert!((r - 2.0 * R_BASE).abs() < 1e-9);
        // Degenerate denominator is floored, not infinite
        let r = measurement_noise(&record(0, 23.0, 4.0, 1.0, true));
        assert!(r.is_finite());
        assert!((r - R_BASE / R_DENOM_FLOOR).abs() < 1e-9);
    }

    #[test]
    fn test_extract_prefers_main_sleep() {
        let nap = record(5, 14.0, 8.0, 1.0, false);
        let main = record(5, 23.0, 6.0, 0.7, true);
        let anchors = extract_anchors(&[nap, main.clone()], 0);
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].record_id, main.id);
        assert!(anchors[0].is_main_sleep);
    }

    #[test]
    fn test_extract_tie_breaks_on_quality_duration() {
        let weak = record(3, 22.0, 6.0, 0.6, true);
        let strong = record(3, 23.0, 8.0, 0.9, true);
        let anchors = extract_anchors(&[weak, strong.clone()], 0);
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].record_id, strong.id);
    }

    #[test]
    fn test_extract_sorted_by_day() {
        let records = vec![record(9, 23.0, 8.0, 0.9, true), record(2, 23.0, 8.0, 0.9, true)];
        let anchors = extract_anchors(&records, 0);
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[0].day, 2);
        assert_eq!(anchors[1].day, 9);
    }

    #[test]
    fn test_extract_respects_epoch() {
        let anchors = extract_anchors(&[record(100, 23.0, 8.0, 0.9, true)], 100);
        assert_eq!(anchors[0].day, 0);
    }

    #[test]
    fn test_extract_drops_floor_records() {
        let records = vec![record(1, 23.0, 1.0, 0.9, true), record(2, 23.0, 8.0, 0.9, true)];
        let anchors = extract_anchors(&records, 0);
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].day, 2);
    }
}
