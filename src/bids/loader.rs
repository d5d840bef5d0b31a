use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{aggregate, AggregatedBids, BidError, BidRecord, TimeSlotKey};

#[derive(Debug, Error)]
pub enum BidLoadError {
    #[error("failed to open bid file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed bid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: field `{field}` has invalid value {value:?}")]
    InvalidField {
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error(transparent)]
    Bid(#[from] BidError),
    #[error("bid file contains no records")]
    Empty,
}

/// Columns the loader consumes; any other column is ignored.
#[derive(Debug, Deserialize)]
struct BidRow {
    year: String,
    month: String,
    day: String,
    hour: String,
    #[serde(rename = "SoC_bid[%]")]
    soc_bid: String,
}

impl BidRow {
    fn into_record(self, row: usize) -> Result<BidRecord, BidLoadError> {
        let slot = TimeSlotKey::new(
            parse_field(row, "year", &self.year)?,
            parse_field(row, "month", &self.month)?,
            parse_field(row, "day", &self.day)?,
            parse_field(row, "hour", &self.hour)?,
        );
        Ok(BidRecord::new(slot, self.soc_bid, row))
    }
}

fn parse_field<T: std::str::FromStr>(
    row: usize,
    field: &'static str,
    value: &str,
) -> Result<T, BidLoadError> {
    value.parse().map_err(|_| BidLoadError::InvalidField {
        row,
        field,
        value: value.to_string(),
    })
}

/// Reads raw bid records from CSV with a header row.
pub fn read_bid_records<R: Read>(reader: R) -> Result<Vec<BidRecord>, BidLoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for (i, result) in rdr.deserialize::<BidRow>().enumerate() {
        records.push(result?.into_record(i + 1)?);
    }
    Ok(records)
}

/// Reads and aggregates a bid schedule. Any bad row aborts the load.
pub fn load_bids<R: Read>(reader: R) -> Result<AggregatedBids, BidLoadError> {
    let records = read_bid_records(reader)?;
    if records.is_empty() {
        return Err(BidLoadError::Empty);
    }
    debug!(records = records.len(), "bid records read");
    Ok(aggregate(&records)?)
}

/// Loads and aggregates a bid schedule file.
pub fn load_bid_file(path: &Path) -> Result<AggregatedBids, BidLoadError> {
    let file = File::open(path).map_err(|source| BidLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bids = load_bids(file)?;
    info!(path = %path.display(), slots = bids.len(), "bid schedule loaded");
    Ok(bids)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
year,month,day,hour,SoC_bid[%],price
2024,1,1,10,40,12.5
2024,1,1,10,60,12.5
2024,1,1,11, 75 ,13.0
";

    #[test]
    fn test_reads_rows_and_ignores_extra_columns() {
        let records = read_bid_records(SAMPLE.as_bytes()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].slot, TimeSlotKey::new(2024, 1, 1, 10));
        assert_eq!(records[2].raw_bid, "75");
        assert_eq!(records[2].row, 3);
    }

    #[test]
    fn test_aggregates_loaded_rows() {
        let records = read_bid_records(SAMPLE.as_bytes()).unwrap();
        let bids = aggregate(&records).unwrap();
        assert_eq!(bids.get(&TimeSlotKey::new(2024, 1, 1, 10)), Some(50.0));
        assert_eq!(bids.get(&TimeSlotKey::new(2024, 1, 1, 11)), Some(75.0));
    }

    #[test]
    fn test_missing_bid_column_is_csv_error() {
        let input = "year,month,day,hour\n2024,1,1,10\n";
        assert!(matches!(
            read_bid_records(input.as_bytes()),
            Err(BidLoadError::Csv(_))
        ));
    }

    #[test]
    fn test_bad_time_field_names_row() {
        let input = "year,month,day,hour,SoC_bid[%]\n2024,1,1,10,40\n2024,jan,1,11,40\n";
        match read_bid_records(input.as_bytes()) {
            Err(BidLoadError::InvalidField { row, field, value }) => {
                assert_eq!(row, 2);
                assert_eq!(field, "month");
                assert_eq!(value, "jan");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_header_only_input_is_empty() {
        let input = "year,month,day,hour,SoC_bid[%]\n";
        assert!(matches!(
            load_bids(input.as_bytes()),
            Err(BidLoadError::Empty)
        ));
    }

    #[test]
    fn test_non_numeric_bid_aborts_load() {
        let input = "year,month,day,hour,SoC_bid[%]\n2024,1,1,10,40\n2024,1,1,11,abc\n";
        match load_bids(input.as_bytes()) {
            Err(BidLoadError::Bid(BidError::InvalidBid { row, slot, value })) => {
                assert_eq!(row, 2);
                assert_eq!(slot, TimeSlotKey::new(2024, 1, 1, 11));
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_bid_file(Path::new("/nonexistent/bids.csv")).unwrap_err();
        assert!(matches!(err, BidLoadError::Io { .. }));
    }
}
