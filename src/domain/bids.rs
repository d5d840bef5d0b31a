use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// One control period: a calendar hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeSlotKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

impl TimeSlotKey {
    pub fn new(year: i32, month: u32, day: u32, hour: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour,
        }
    }

    /// Start of the slot, if the fields form a valid calendar hour.
    pub fn start(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?.and_hms_opt(self.hour, 0, 0)
    }
}

impl fmt::Display for TimeSlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}",
            self.year, self.month, self.day, self.hour
        )
    }
}

/// One schedule row before aggregation. The bid is kept as its raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidRecord {
    pub slot: TimeSlotKey,
    pub raw_bid: String,
    /// 1-based data row in the source, for diagnostics
    pub row: usize,
}

impl BidRecord {
    pub fn new(slot: TimeSlotKey, raw_bid: impl Into<String>, row: usize) -> Self {
        Self {
            slot,
            raw_bid: raw_bid.into(),
            row,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BidError {
    #[error("row {row}: bid {value:?} for slot {slot} is not a finite number")]
    InvalidBid {
        row: usize,
        slot: TimeSlotKey,
        value: String,
    },
}

/// Target SoC per time slot, in first-seen slot order. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedBids {
    targets: Vec<(TimeSlotKey, f64)>,
}

impl AggregatedBids {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, slot: &TimeSlotKey) -> Option<f64> {
        self.targets
            .iter()
            .find(|(k, _)| k == slot)
            .map(|(_, target)| *target)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TimeSlotKey, f64)> + '_ {
        self.targets.iter().copied()
    }

    pub fn slots(&self) -> impl Iterator<Item = TimeSlotKey> + '_ {
        self.targets.iter().map(|(k, _)| *k)
    }
}

/// Groups records by slot and reduces each group to the arithmetic mean of its bids.
///
/// Fails on the first bid that does not parse as a finite number; there is no
/// partial result.
pub fn aggregate<'a, I>(records: I) -> Result<AggregatedBids, BidError>
where
    I: IntoIterator<Item = &'a BidRecord>,
{
    let mut index: HashMap<TimeSlotKey, usize> = HashMap::new();
    let mut groups: Vec<(TimeSlotKey, f64, usize)> = Vec::new();

    for record in records {
        let value = parse_bid(record)?;
        match index.get(&record.slot) {
            Some(&i) => {
                groups[i].1 += value;
                groups[i].2 += 1;
            }
            None => {
                index.insert(record.slot, groups.len());
                groups.push((record.slot, value, 1));
            }
        }
    }

    Ok(AggregatedBids {
        targets: groups
            .into_iter()
            .map(|(slot, sum, count)| (slot, sum / count as f64))
            .collect(),
    })
}

fn parse_bid(record: &BidRecord) -> Result<f64, BidError> {
    record
        .raw_bid
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| BidError::InvalidBid {
            row: record.row,
            slot: record.slot,
            value: record.raw_bid.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn slot(hour: u32) -> TimeSlotKey {
        TimeSlotKey::new(2024, 1, 1, hour)
    }

    #[test]
    fn test_mean_of_shared_slot() {
        let records = vec![
            BidRecord::new(slot(10), "40", 1),
            BidRecord::new(slot(10), "60", 2),
        ];
        let bids = aggregate(&records).unwrap();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids.get(&slot(10)), Some(50.0));
    }

    #[test]
    fn test_first_seen_order_is_kept() {
        let records = vec![
            BidRecord::new(slot(12), "10", 1),
            BidRecord::new(slot(3), "20", 2),
            BidRecord::new(slot(12), "30", 3),
            BidRecord::new(slot(7), "40", 4),
        ];
        let bids = aggregate(&records).unwrap();
        let order: Vec<_> = bids.slots().map(|k| k.hour).collect();
        assert_eq!(order, vec![12, 3, 7]);
        assert_eq!(bids.get(&slot(12)), Some(20.0));
    }

    #[test]
    fn test_invalid_bid_fails_whole_load() {
        let records = vec![
            BidRecord::new(slot(1), "40", 1),
            BidRecord::new(slot(1), "forty", 2),
        ];
        let err = aggregate(&records).unwrap_err();
        assert_eq!(
            err,
            BidError::InvalidBid {
                row: 2,
                slot: slot(1),
                value: "forty".into()
            }
        );
    }

    #[test]
    fn test_rejects_non_finite_bid() {
        let records = vec![BidRecord::new(slot(1), "NaN", 1)];
        assert!(aggregate(&records).is_err());
    }

    #[test]
    fn test_empty_input_gives_empty_map() {
        let bids = aggregate(&Vec::<BidRecord>::new()).unwrap();
        assert!(bids.is_empty());
    }

    #[test]
    fn test_slot_display_and_start() {
        let k = TimeSlotKey::new(2024, 3, 9, 7);
        assert_eq!(k.to_string(), "2024-03-09T07");
        assert_eq!(
            k.start().map(|t| t.to_string()),
            Some("2024-03-09 07:00:00".to_string())
        );
        assert!(TimeSlotKey::new(2024, 2, 30, 0).start().is_none());
    }

    proptest! {
        #[test]
        fn prop_group_mean_is_order_independent(
            values in prop::collection::vec(0.0f64..100.0, 1..20),
            seed in any::<u64>(),
        ) {
            let forward: Vec<_> = values
                .iter()
                .enumerate()
                .map(|(i, v)| BidRecord::new(slot(5), v.to_string(), i + 1))
                .collect();
            let mut shuffled = forward.clone();
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();

            let expected = values.iter().sum::<f64>() / values.len() as f64;
            let a = aggregate(&forward).unwrap().get(&slot(5)).unwrap();
            let b = aggregate(&shuffled).unwrap().get(&slot(5)).unwrap();
            prop_assert!((a - expected).abs() < 1e-9);
            prop_assert!((a - b).abs() < 1e-9);
        }
    }
}
