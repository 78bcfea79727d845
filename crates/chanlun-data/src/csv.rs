//! CSV bar source.
//!
//! Files live under one root directory, one file per symbol and timeframe,
//! named `{symbol}_{label}.csv` (a `/` in the symbol becomes `_`). The first
//! row is a header; columns are matched by name with a positional fallback of
//! `time,open,high,low,close,volume,turnover,turnover_rate`.

use std::path::{Path, PathBuf};

use chanlun_core::{Bar, Timeframe};
use chrono::{NaiveDate, NaiveDateTime};

use crate::source::{BarIter, BarQuery, BarSource};
use crate::SourceError;

/// Loads bars from CSV files under a root directory.
#[derive(Debug, Clone)]
pub struct CsvSource {
    root: PathBuf,
}

impl CsvSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Path of the file holding `symbol` at `timeframe`.
    pub fn file_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.root
            .join(format!("{}_{}.csv", symbol.replace('/', "_"), timeframe.label()))
    }
}

impl BarSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn bars(&self, query: &BarQuery) -> Result<BarIter, SourceError> {
        let path = self.file_path(&query.symbol, query.timeframe);
        if !path.exists() {
            return Err(SourceError::NotFound {
                symbol: query.symbol.clone(),
                timeframe: query.timeframe,
            });
        }
        let bars = load_bars_from_csv(&path, query)?;
        log::debug!("loaded {} bars from {}", bars.len(), path.display());
        Ok(Box::new(bars.into_iter()))
    }
}

struct Columns {
    time: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
    turnover: Option<usize>,
    turnover_rate: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &::csv::StringRecord) -> Self {
        let lower: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |names: &[&str]| lower.iter().position(|h| names.contains(&h.as_str()));
        let optional = |names: &[&str], fallback: usize| {
            find(names).or(if fallback < lower.len() { Some(fallback) } else { None })
        };

        Self {
            time: find(&["time", "time_key", "timestamp", "date", "datetime"]).unwrap_or(0),
            open: find(&["open"]).unwrap_or(1),
            high: find(&["high"]).unwrap_or(2),
            low: find(&["low"]).unwrap_or(3),
            close: find(&["close"]).unwrap_or(4),
            volume: optional(&["volume", "vol"], 5),
            turnover: optional(&["turnover", "amount"], 6),
            turnover_rate: optional(&["turnover_rate", "turnrate"], 7),
        }
    }
}

/// Load and sort the bars of one CSV file, keeping those inside the query range.
pub fn load_bars_from_csv<P: AsRef<Path>>(path: P, query: &BarQuery) -> Result<Vec<Bar>, SourceError> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let columns = Columns::from_headers(reader.headers()?);

    let mut bars = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        // Header is line 1
        let line = i + 2;
        let field = |idx: usize| -> Result<f64, SourceError> {
            let raw = record.get(idx).ok_or_else(|| SourceError::Parse {
                line,
                reason: format!("missing column {idx}"),
            })?;
            raw.trim().parse::<f64>().map_err(|e| SourceError::Parse {
                line,
                reason: format!("{raw:?}: {e}"),
            })
        };
        // Blank or absent cells are missing values; anything else that fails
        // to parse is dropped with a warning.
        let optional = |idx: Option<usize>, name: &str| {
            let raw = idx.and_then(|i| record.get(i))?.trim();
            if raw.is_empty() {
                return None;
            }
            match raw.parse::<f64>() {
                Ok(value) => Some(value),
                Err(e) => {
                    log::warn!("line {line}: ignoring {name} {raw:?}: {e}");
                    None
                }
            }
        };

        let raw_time = record.get(columns.time).unwrap_or("");
        let timestamp = parse_time(raw_time)?;
        if !query.contains(timestamp) {
            continue;
        }

        let bar = Bar::new(
            timestamp,
            field(columns.open)?,
            field(columns.high)?,
            field(columns.low)?,
            field(columns.close)?,
            optional(columns.volume, "volume").unwrap_or(0.0),
        )
        .with_turnover(
            optional(columns.turnover, "turnover"),
            optional(columns.turnover_rate, "turnover_rate"),
        );
        bars.push(bar);
    }

    // Stable, so duplicate timestamps stay visible to the monotonic check downstream.
    bars.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    Ok(bars)
}

/// Parse a CSV time cell into unix seconds.
///
/// Accepted forms: `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, `YYYY/MM/DD HH:MM`,
/// `YYYYMMDDHHMM00000`, and plain unix seconds or milliseconds. A date
/// without a time of day is stamped at 23:59 so it closes after every
/// intraday bar of the same date.
pub fn parse_time(s: &str) -> Result<f64, SourceError> {
    let s = s.trim();
    let invalid = || SourceError::InvalidTime(s.to_string());

    if s.len() == 10 && s.as_bytes().get(4) == Some(&b'-') {
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| invalid())?;
        let dt = date.and_hms_opt(23, 59, 0).ok_or_else(invalid)?;
        return Ok(dt.and_utc().timestamp() as f64);
    }

    let formats: &[(&str, usize)] = &[
        ("%Y-%m-%d %H:%M:%S", 19),
        ("%Y/%m/%d %H:%M", 16),
        ("%Y-%m-%d %H:%M", 16),
    ];
    for (format, len) in formats {
        if s.len() == *len {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(dt.and_utc().timestamp() as f64);
            }
        }
    }

    if s.len() == 17 && s.bytes().all(|b| b.is_ascii_digit()) {
        let dt = NaiveDateTime::parse_from_str(&s[..12], "%Y%m%d%H%M").map_err(|_| invalid())?;
        return Ok(dt.and_utc().timestamp() as f64);
    }

    let ts: f64 = s.parse().map_err(|_| invalid())?;
    // 13-digit values are milliseconds
    Ok(if ts > 1e12 { ts / 1000.0 } else { ts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_time_formats() {
        // 2024-01-02 10:30:00 UTC
        let expected = 1_704_191_400.0;
        assert_eq!(parse_time("2024-01-02 10:30:00").unwrap(), expected);
        assert_eq!(parse_time("2024/01/02 10:30").unwrap(), expected);
        assert_eq!(parse_time("20240102103000000").unwrap(), expected);
        assert_eq!(parse_time("1704191400").unwrap(), expected);
        assert_eq!(parse_time("1704191400000").unwrap(), expected);
    }

    #[test]
    fn test_date_only_closes_at_end_of_day() {
        let day = parse_time("2024-01-02").unwrap();
        let intraday = parse_time("2024-01-02 15:00:00").unwrap();
        assert!(day > intraday);
        assert_eq!(day, 1_704_239_940.0);
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert!(matches!(parse_time("yesterday"), Err(SourceError::InvalidTime(_))));
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("BTC_USDT_1d.csv")).unwrap();
        writeln!(f, "time,open,high,low,close,volume").unwrap();
        writeln!(f, "2024-01-03,11,13,10,12,500").unwrap();
        writeln!(f, "2024-01-02,10,12,9,11,400").unwrap();
        drop(f);

        let source = CsvSource::new(dir.path());
        let bars: Vec<Bar> = source
            .bars(&BarQuery::new("BTC/USDT", Timeframe::Day1))
            .unwrap()
            .collect();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert_eq!(bars[0].close, 11.0);
        assert_eq!(bars[1].volume, 500.0);
        assert_eq!(bars[1].turnover, None);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvSource::new(dir.path());
        let err = match source.bars(&BarQuery::new("X", Timeframe::Min30)) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(err.is_not_found());
    }

    #[test]
    fn test_bad_optional_cells_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("X_1d.csv"),
            "time,open,high,low,close,volume,turnover\n\
             2024-01-02,1,2,0.5,1.5,n/a,300\n\
             2024-01-03,1,2,0.5,1.5,40,\n",
        )
        .unwrap();
        let bars = load_bars_from_csv(dir.path().join("X_1d.csv"), &BarQuery::new("X", Timeframe::Day1)).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!((bars[0].volume, bars[0].turnover), (0.0, Some(300.0)));
        assert_eq!((bars[1].volume, bars[1].turnover), (40.0, None));
    }

    #[test]
    fn test_bad_price_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("X_1d.csv"),
            "time,open,high,low,close\n2024-01-02,1,2,0.5,1.5\n2024-01-03,1,abc,0.5,1.5\n",
        )
        .unwrap();
        let source = CsvSource::new(dir.path());
        match source.bars(&BarQuery::new("X", Timeframe::Day1)) {
            Err(SourceError::Parse { line, .. }) => assert_eq!(line, 3),
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("expected an error"),
        }
    }
}
