//! Gap-based segmentation of a sleep log.

use crate::constants::GAP_THRESHOLD_DAYS;
use crate::record::SleepRecord;

/// A contiguous run of records with no internal attributed-date gap above
/// [`GAP_THRESHOLD_DAYS`], plus its covered day range (absolute Unix-epoch
/// day numbers).
#[derive(Clone, Debug)]
pub struct Segment {
    pub records: Vec<SleepRecord>,
    pub first_day: i64,
    pub last_day: i64,
}

/// Partition records into independently analyzable segments.
///
/// Records are sorted by start time; a new segment begins whenever the
/// attributed date jumps more than the threshold past the latest date
/// seen so far. Pure function: the input is not modified.
pub fn split_segments(records: &[SleepRecord]) -> Vec<Segment> {
    let mut sorted: Vec<SleepRecord> = records.to_vec();
    sorted.sort_by_key(|r| (r.start_unix, r.end_unix));

    let mut segments: Vec<Segment> = Vec::new();
    let mut current: Vec<SleepRecord> = Vec::new();
    let mut latest_day = i64::MIN;

    for record in sorted {
        let day = record.date.day_number();
        if !current.is_empty() && day - latest_day > GAP_THRESHOLD_DAYS {
            segments.push(close_segment(std::mem::take(&mut current)));
        }
        latest_day = latest_day.max(day);
        current.push(record);
    }
    if !current.is_empty() {
        segments.push(close_segment(current));
    }
    segments
}

fn close_segment(records: Vec<SleepRecord>) -> Segment {
    let first_day = records
        .iter()
        .map(|r| r.date.day_number())
        .min()
        .unwrap_or(0);
    let last_day = records
        .iter()
        .map(|r| r.date.day_number())
        .max()
        .unwrap_or(0);
    Segment {
        records,
        first_day,
        last_day,
    }
}
