//! Catalog row types and the tab-separated table codec.
//!
//! Every persisted table has a canonical column order, microsecond timestamp
//! resolution, and 3-decimal float precision. The codec is deliberately
//! strict on read: a truncated or mis-typed row is a parse error, which the
//! artifact store surfaces as a malformed artifact rather than silently
//! dropping rows.

use std::fmt;
use std::io::{BufRead, Write};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp format shared by all tables (microsecond resolution).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Seismic phase type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    P,
    S,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::P => "P",
            Phase::S => "S",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P" => Some(Phase::P),
            "S" => Some(Phase::S),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase arrival produced by the picking stage. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    /// Station identifier, `NET.STA.LOC`.
    pub station_id: String,
    pub phase: Phase,
    pub time: NaiveDateTime,
    /// Model confidence in [0, 1].
    pub score: f64,
    /// Peak amplitude, when the picker measures one.
    pub amplitude: Option<f64>,
}

/// A located or associated event row in the canonical catalog table.
///
/// `event_index` is unique only within its window until the catalog
/// assembler re-keys it globally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: NaiveDateTime,
    pub magnitude: Option<f64>,
    pub longitude: f64,
    pub latitude: f64,
    pub depth_km: f64,
    pub sigma_time: f64,
    pub sigma_amp: f64,
    pub cov_time_amp: f64,
    pub event_index: i64,
    /// Association quality score.
    pub score: f64,
}

/// Many-to-one edge linking a pick to at most one event per window.
/// An unassigned pick has no assignment row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub pick_index: i64,
    pub event_index: i64,
    pub score: f64,
}

/// A station snapshot with session-scoped local coordinates.
///
/// The planar frame (`x_km`, `y_km`, `z_km`) is tied to one projection
/// center and is not portable across differently-centered runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub elevation_m: f64,
    pub x_km: f64,
    pub y_km: f64,
    pub z_km: f64,
}

/// A relocated hypocenter row parsed from solver output.
///
/// `event_index` is the stable external event id carried through every
/// chunk, so chunked relocation preserves event identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypocenter {
    pub event_index: i64,
    pub time: NaiveDateTime,
    pub longitude: f64,
    pub latitude: f64,
    pub depth_km: f64,
    pub magnitude: Option<f64>,
    pub n_p: u32,
    pub n_s: u32,
    pub gap_deg: f64,
    pub min_dist_km: f64,
    pub rms: f64,
    pub erh_km: f64,
    pub erz_km: f64,
}

/// Row-level parse failure with a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError(pub String);

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A type that can round-trip through one row of a tab-separated table.
pub trait TableRow: Sized {
    /// Canonical column names, in persisted order.
    const COLUMNS: &'static [&'static str];

    fn to_row(&self) -> String;
    fn parse_row(fields: &[&str]) -> std::result::Result<Self, RowError>;
}

fn fmt_f3(v: f64) -> String {
    format!("{v:.3}")
}

fn fmt_opt_f3(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.3}"),
        None => "nan".to_string(),
    }
}

fn fmt_ts(t: &NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_f64(field: &str, column: &str) -> std::result::Result<f64, RowError> {
    field
        .trim()
        .parse::<f64>()
        .map_err(|_| RowError(format!("column `{column}`: invalid float `{field}`")))
}

fn parse_opt_f64(field: &str, column: &str) -> std::result::Result<Option<f64>, RowError> {
    let v = parse_f64(field, column)?;
    Ok(if v.is_nan() { None } else { Some(v) })
}

fn parse_i64(field: &str, column: &str) -> std::result::Result<i64, RowError> {
    field
        .trim()
        .parse::<i64>()
        .map_err(|_| RowError(format!("column `{column}`: invalid integer `{field}`")))
}

fn parse_u32(field: &str, column: &str) -> std::result::Result<u32, RowError> {
    field
        .trim()
        .parse::<u32>()
        .map_err(|_| RowError(format!("column `{column}`: invalid count `{field}`")))
}

fn parse_ts(field: &str, column: &str) -> std::result::Result<NaiveDateTime, RowError> {
    NaiveDateTime::parse_from_str(field.trim(), TIMESTAMP_FORMAT)
        .map_err(|_| RowError(format!("column `{column}`: invalid timestamp `{field}`")))
}

fn expect_width(fields: &[&str], want: usize) -> std::result::Result<(), RowError> {
    if fields.len() == want {
        Ok(())
    } else {
        Err(RowError(format!(
            "expected {want} columns, found {}",
            fields.len()
        )))
    }
}

impl TableRow for Pick {
    const COLUMNS: &'static [&'static str] = &["station", "phase", "time", "score", "amplitude"];

    fn to_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.station_id,
            self.phase,
            fmt_ts(&self.time),
            fmt_f3(self.score),
            fmt_opt_f3(self.amplitude),
        )
    }

    fn parse_row(fields: &[&str]) -> std::result::Result<Self, RowError> {
        expect_width(fields, 5)?;
        let phase = Phase::parse(fields[1])
            .ok_or_else(|| RowError(format!("column `phase`: invalid phase `{}`", fields[1])))?;
        Ok(Pick {
            station_id: fields[0].trim().to_string(),
            phase,
            time: parse_ts(fields[2], "time")?,
            score: parse_f64(fields[3], "score")?,
            amplitude: parse_opt_f64(fields[4], "amplitude")?,
        })
    }
}

impl TableRow for Event {
    const COLUMNS: &'static [&'static str] = &[
        "time",
        "magnitude",
        "longitude",
        "latitude",
        "depth_km",
        "sigma_time",
        "sigma_amp",
        "cov_time_amp",
        "event_index",
        "score",
    ];

    fn to_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            fmt_ts(&self.time),
            fmt_opt_f3(self.magnitude),
            fmt_f3(self.longitude),
            fmt_f3(self.latitude),
            fmt_f3(self.depth_km),
            fmt_f3(self.sigma_time),
            fmt_f3(self.sigma_amp),
            fmt_f3(self.cov_time_amp),
            self.event_index,
            fmt_f3(self.score),
        )
    }

    fn parse_row(fields: &[&str]) -> std::result::Result<Self, RowError> {
        expect_width(fields, 10)?;
        Ok(Event {
            time: parse_ts(fields[0], "time")?,
            magnitude: parse_opt_f64(fields[1], "magnitude")?,
            longitude: parse_f64(fields[2], "longitude")?,
            latitude: parse_f64(fields[3], "latitude")?,
            depth_km: parse_f64(fields[4], "depth_km")?,
            sigma_time: parse_f64(fields[5], "sigma_time")?,
            sigma_amp: parse_f64(fields[6], "sigma_amp")?,
            cov_time_amp: parse_f64(fields[7], "cov_time_amp")?,
            event_index: parse_i64(fields[8], "event_index")?,
            score: parse_f64(fields[9], "score")?,
        })
    }
}

impl TableRow for Assignment {
    const COLUMNS: &'static [&'static str] = &["pick_index", "event_index", "score"];

    fn to_row(&self) -> String {
        format!(
            "{}\t{}\t{}",
            self.pick_index,
            self.event_index,
            fmt_f3(self.score)
        )
    }

    fn parse_row(fields: &[&str]) -> std::result::Result<Self, RowError> {
        expect_width(fields, 3)?;
        Ok(Assignment {
            pick_index: parse_i64(fields[0], "pick_index")?,
            event_index: parse_i64(fields[1], "event_index")?,
            score: parse_f64(fields[2], "score")?,
        })
    }
}

impl TableRow for Station {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "longitude",
        "latitude",
        "elevation_m",
        "x_km",
        "y_km",
        "z_km",
    ];

    fn to_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.id,
            fmt_f3(self.longitude),
            fmt_f3(self.latitude),
            fmt_f3(self.elevation_m),
            fmt_f3(self.x_km),
            fmt_f3(self.y_km),
            fmt_f3(self.z_km),
        )
    }

    fn parse_row(fields: &[&str]) -> std::result::Result<Self, RowError> {
        expect_width(fields, 7)?;
        Ok(Station {
            id: fields[0].trim().to_string(),
            longitude: parse_f64(fields[1], "longitude")?,
            latitude: parse_f64(fields[2], "latitude")?,
            elevation_m: parse_f64(fields[3], "elevation_m")?,
            x_km: parse_f64(fields[4], "x_km")?,
            y_km: parse_f64(fields[5], "y_km")?,
            z_km: parse_f64(fields[6], "z_km")?,
        })
    }
}

impl TableRow for Hypocenter {
    const COLUMNS: &'static [&'static str] = &[
        "event_index",
        "time",
        "longitude",
        "latitude",
        "depth_km",
        "magnitude",
        "n_p",
        "n_s",
        "gap_deg",
        "min_dist_km",
        "rms",
        "erh_km",
        "erz_km",
    ];

    fn to_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.event_index,
            fmt_ts(&self.time),
            fmt_f3(self.longitude),
            fmt_f3(self.latitude),
            fmt_f3(self.depth_km),
            fmt_opt_f3(self.magnitude),
            self.n_p,
            self.n_s,
            fmt_f3(self.gap_deg),
            fmt_f3(self.min_dist_km),
            fmt_f3(self.rms),
            fmt_f3(self.erh_km),
            fmt_f3(self.erz_km),
        )
    }

    fn parse_row(fields: &[&str]) -> std::result::Result<Self, RowError> {
        expect_width(fields, 13)?;
        Ok(Hypocenter {
            event_index: parse_i64(fields[0], "event_index")?,
            time: parse_ts(fields[1], "time")?,
            longitude: parse_f64(fields[2], "longitude")?,
            latitude: parse_f64(fields[3], "latitude")?,
            depth_km: parse_f64(fields[4], "depth_km")?,
            magnitude: parse_opt_f64(fields[5], "magnitude")?,
            n_p: parse_u32(fields[6], "n_p")?,
            n_s: parse_u32(fields[7], "n_s")?,
            gap_deg: parse_f64(fields[8], "gap_deg")?,
            min_dist_km: parse_f64(fields[9], "min_dist_km")?,
            rms: parse_f64(fields[10], "rms")?,
            erh_km: parse_f64(fields[11], "erh_km")?,
            erz_km: parse_f64(fields[12], "erz_km")?,
        })
    }
}

/// Write a full table (header + rows) to a writer.
pub fn write_table<R: TableRow, W: Write>(mut w: W, rows: &[R]) -> std::io::Result<()> {
    writeln!(w, "{}", R::COLUMNS.join("\t"))?;
    for row in rows {
        writeln!(w, "{}", row.to_row())?;
    }
    Ok(())
}

/// Read a full table, validating the header and every row.
///
/// Returns `Err` with a line-numbered detail on any structural problem;
/// the caller decides whether that means a malformed artifact.
pub fn read_table<R: TableRow, B: BufRead>(reader: B) -> std::result::Result<Vec<R>, RowError> {
    let mut lines = reader.lines();
    let header = match lines.next() {
        Some(Ok(line)) => line,
        Some(Err(err)) => return Err(RowError(format!("unreadable header: {err}"))),
        None => return Err(RowError("empty file, expected header".into())),
    };
    let expected = R::COLUMNS.join("\t");
    if header.trim_end() != expected {
        return Err(RowError(format!(
            "header mismatch: expected `{expected}`, found `{header}`"
        )));
    }

    let mut rows = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line.map_err(|err| RowError(format!("line {}: {err}", idx + 2)))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let row =
            R::parse_row(&fields).map_err(|err| RowError(format!("line {}: {err}", idx + 2)))?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    fn sample_pick() -> Pick {
        Pick {
            station_id: "IR.KHMZ.".to_string(),
            phase: Phase::P,
            time: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_micro_opt(12, 30, 45, 123456)
                .unwrap(),
            score: 0.87,
            amplitude: None,
        }
    }

    #[test]
    fn test_pick_round_trip() {
        let pick = sample_pick();
        let mut buf = Vec::new();
        write_table(&mut buf, &[pick.clone()]).unwrap();
        let rows: Vec<Pick> = read_table(buf.as_slice()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].station_id, pick.station_id);
        assert_eq!(rows[0].time, pick.time);
        assert!(rows[0].amplitude.is_none());
    }

    #[test]
    fn test_timestamp_keeps_microseconds() {
        let pick = sample_pick();
        let row = pick.to_row();
        assert!(row.contains("2024-01-01T12:30:45.123456"), "{row}");
    }

    #[test]
    fn test_missing_magnitude_is_nan() {
        let event = Event {
            time: ts("2024-01-01T00:00:01.000000"),
            magnitude: None,
            longitude: 51.25,
            latitude: 35.75,
            depth_km: 11.0,
            sigma_time: 0.2,
            sigma_amp: 0.0,
            cov_time_amp: 0.0,
            event_index: 3,
            score: 19.5,
        };
        let row = event.to_row();
        assert!(row.contains("\tnan\t"));

        let fields: Vec<&str> = row.split('\t').collect();
        let parsed = Event::parse_row(&fields).unwrap();
        assert!(parsed.magnitude.is_none());
    }

    #[test]
    fn test_truncated_row_is_an_error() {
        let text = format!("{}\nIR.KHMZ.\tP\n", Pick::COLUMNS.join("\t"));
        let err = read_table::<Pick, _>(text.as_bytes()).unwrap_err();
        assert!(err.0.contains("line 2"), "{err}");
    }

    #[test]
    fn test_header_mismatch_is_an_error() {
        let text = "a\tb\tc\n";
        let err = read_table::<Assignment, _>(text.as_bytes()).unwrap_err();
        assert!(err.0.contains("header mismatch"));
    }

    #[test]
    fn test_empty_table_round_trip() {
        let mut buf = Vec::new();
        write_table::<Assignment, _>(&mut buf, &[]).unwrap();
        let rows: Vec<Assignment> = read_table(buf.as_slice()).unwrap();
        assert!(rows.is_empty());
    }
}
