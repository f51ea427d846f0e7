//! Legacy solver exchange formats.
//!
//! The location solver consumes a fixed-format phase file: a header, a
//! station block in degree/decimal-minute notation, a velocity model
//! block, a control line, then per-event arrival blocks. Its bulletin
//! output is a fixed-width summary, one row per input event in input
//! order. Both formats are column-exact; every width here is part of the
//! solver contract.

use std::io::Write;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use sl_common::table::Phase;
use sl_common::{Hypocenter, Result, Station};
use sl_common::Error;
use sl_config::{LocationSettings, VelocityModel};
use sl_geo::WeightClass;

/// One arrival fed to the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    pub station_id: String,
    pub phase: Phase,
    pub time: NaiveDateTime,
    pub weight: WeightClass,
}

/// One event in a solver chunk, with its arrivals.
///
/// `event_index` is the global catalog key. The solver never sees it; it
/// is re-attached to the output rows by position.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverEvent {
    pub event_index: i64,
    pub time: NaiveDateTime,
    pub arrivals: Vec<Arrival>,
}

/// Solver station code: the station element of `NET.STA.LOC`, at most
/// four characters.
pub fn station_code(station_id: &str) -> String {
    let station = station_id.split('.').nth(1).unwrap_or(station_id);
    station.chars().take(4).collect()
}

fn deg_min(value: f64) -> (f64, f64) {
    let degrees = value.abs().floor();
    let minutes = (value.abs() - degrees) * 60.0;
    (degrees, minutes)
}

/// Write the full phase file for one chunk.
pub fn write_phase_file<W: Write>(
    mut w: W,
    stations: &[Station],
    model: &VelocityModel,
    control: &LocationSettings,
    events: &[SolverEvent],
) -> std::io::Result<()> {
    writeln!(w, "HEAD                     SEISLOC PHASE DATA")?;
    writeln!(w)?;
    writeln!(w)?;

    for station in stations {
        let (lat_deg, lat_min) = deg_min(station.latitude);
        let (lon_deg, lon_min) = deg_min(station.longitude);
        writeln!(
            w,
            "  {:<4}{:2.0}{:05.2}N {:2.0}{:05.2}E{:4.0}",
            station_code(&station.id),
            lat_deg,
            lat_min,
            lon_deg,
            lon_min,
            station.elevation_m,
        )?;
    }
    writeln!(w)?;

    for (v, z) in model.vp_km_s.iter().zip(model.depths_km.iter()) {
        writeln!(w, " {v:5.2}  {z:6.3}")?;
    }
    writeln!(w)?;

    writeln!(
        w,
        "{:4.0}.{:4.0}.{:4.0}. {:4.2}    4    0    0    1    1    0    0 0111",
        control.trial_depth_km, control.x_near_km, control.x_far_km, control.vp_vs_ratio,
    )?;

    for event in events {
        write_event_arrivals(&mut w, event)?;
    }
    Ok(())
}

/// P arrival timestamp, `%y%m%d%H%M%S.%f` truncated to 15 columns.
fn p_arrival_field(time: &NaiveDateTime) -> String {
    let seconds = time.format("%y%m%d%H%M%S").to_string();
    let micros = time.nanosecond() / 1000;
    let mut field = format!("{seconds}.{micros:06}");
    field.truncate(15);
    field
}

fn write_event_arrivals<W: Write>(w: &mut W, event: &SolverEvent) -> std::io::Result<()> {
    // Stations with both a P and an S arrival share one line; the S time
    // is expressed in seconds on the P minute.
    struct PairedArrivals {
        code: String,
        p_time: NaiveDateTime,
        p_weight: u8,
        s: Option<(NaiveDateTime, u8)>,
    }

    let mut paired: Vec<PairedArrivals> = Vec::new();
    for arrival in &event.arrivals {
        let code = station_code(&arrival.station_id);
        match arrival.phase {
            Phase::P => {
                if !paired.iter().any(|p| p.code == code) {
                    paired.push(PairedArrivals {
                        code,
                        p_time: arrival.time,
                        p_weight: arrival.weight.index(),
                        s: None,
                    });
                }
            }
            Phase::S => {
                if let Some(pair) = paired.iter_mut().find(|p| p.code == code) {
                    if pair.s.is_none() {
                        pair.s = Some((arrival.time, arrival.weight.index()));
                    }
                }
                // An S with no matching P cannot be expressed in this
                // format and is dropped from the solver input.
            }
        }
    }

    for pair in &paired {
        match pair.s {
            Some((s_time, s_weight)) => {
                let p_seconds =
                    f64::from(pair.p_time.second()) + f64::from(pair.p_time.nanosecond()) / 1e9;
                let delta = (s_time - pair.p_time).num_microseconds().unwrap_or(0) as f64 / 1e6;
                let s_field = format!("{:6.2}", p_seconds + delta);
                writeln!(
                    w,
                    "{:<4} P {:1} {:<15}      {:<6} S {:1}          ",
                    pair.code,
                    pair.p_weight,
                    p_arrival_field(&pair.p_time),
                    s_field,
                    s_weight,
                )?;
            }
            None => {
                writeln!(
                    w,
                    "{:<4} P {:1} {:<15}                          ",
                    pair.code,
                    pair.p_weight,
                    p_arrival_field(&pair.p_time),
                )?;
            }
        }
    }
    writeln!(w, "                 10")?;
    Ok(())
}

// Bulletin column widths, in order. Single-width entries are separators.
const BULLETIN_WIDTHS: &[(&str, usize)] = &[
    ("yy", 2),
    ("mo", 2),
    ("dd", 2),
    ("", 1),
    ("hh", 2),
    ("mm", 2),
    ("", 1),
    ("sec", 5),
    ("", 1),
    ("lat_deg", 2),
    ("", 1),
    ("lat_min", 5),
    ("", 1),
    ("lon_deg", 3),
    ("", 1),
    ("lon_min", 5),
    ("", 1),
    ("depth", 6),
    ("", 4),
    ("mag", 3),
    ("", 1),
    ("ns", 2),
    ("", 1),
    ("gap", 3),
    ("", 1),
    ("dmin", 4),
    ("", 1),
    ("rms", 4),
    ("erh", 5),
    ("erz", 5),
];

fn bulletin_field<'a>(line: &'a str, name: &str) -> &'a str {
    let mut cursor = 0usize;
    for (field, width) in BULLETIN_WIDTHS {
        let end = (cursor + width).min(line.len());
        if *field == name {
            return line.get(cursor..end).unwrap_or("").trim();
        }
        cursor += width;
    }
    ""
}

fn numeric(field: &str) -> Option<f64> {
    if field.is_empty() || field.contains('*') {
        return None;
    }
    field.parse::<f64>().ok()
}

fn required(line: &str, path_hint: &str, name: &str) -> Result<f64> {
    numeric(bulletin_field(line, name)).ok_or_else(|| Error::MalformedArtifact {
        path: path_hint.into(),
        detail: format!("bulletin field `{name}` unreadable in: {line}"),
    })
}

/// Parse the solver bulletin into hypocenters, re-attaching global event
/// ids by position.
///
/// The solver must emit exactly one summary row per input event; any
/// other shape means the chunk failed.
pub fn parse_bulletin(
    text: &str,
    path_hint: &str,
    events: &[SolverEvent],
) -> Result<Vec<Hypocenter>> {
    let rows: Vec<&str> = text
        .lines()
        .skip(1) // header row
        .filter(|line| !line.trim().is_empty())
        .collect();

    if rows.len() != events.len() {
        return Err(Error::MalformedArtifact {
            path: path_hint.into(),
            detail: format!(
                "bulletin has {} rows for {} events",
                rows.len(),
                events.len()
            ),
        });
    }

    let mut hypocenters = Vec::with_capacity(rows.len());
    for (line, event) in rows.iter().zip(events) {
        let yy = required(line, path_hint, "yy")?;
        let mo = required(line, path_hint, "mo")?;
        let dd = required(line, path_hint, "dd")?;
        let hh = required(line, path_hint, "hh")?;
        let mm = required(line, path_hint, "mm")?;
        let sec = required(line, path_hint, "sec")?;

        let micros = (sec.fract() * 1e6).round() as u32;
        let time = NaiveDate::from_ymd_opt(2000 + yy as i32, mo as u32, dd as u32)
            .and_then(|d| {
                d.and_hms_micro_opt(hh as u32, mm as u32, sec.trunc() as u32, micros)
            })
            .ok_or_else(|| Error::MalformedArtifact {
                path: path_hint.into(),
                detail: format!("bulletin origin time unreadable in: {line}"),
            })?;

        let latitude =
            required(line, path_hint, "lat_deg")? + required(line, path_hint, "lat_min")? / 60.0;
        let longitude =
            required(line, path_hint, "lon_deg")? + required(line, path_hint, "lon_min")? / 60.0;

        let n_p = event
            .arrivals
            .iter()
            .filter(|a| a.phase == Phase::P)
            .count() as u32;
        let n_s = event
            .arrivals
            .iter()
            .filter(|a| a.phase == Phase::S)
            .count() as u32;

        hypocenters.push(Hypocenter {
            event_index: event.event_index,
            time,
            longitude,
            latitude,
            depth_km: required(line, path_hint, "depth")?,
            magnitude: numeric(bulletin_field(line, "mag")),
            n_p,
            n_s,
            gap_deg: required(line, path_hint, "gap")?,
            min_dist_km: required(line, path_hint, "dmin")?,
            rms: required(line, path_hint, "rms")?,
            erh_km: numeric(bulletin_field(line, "erh")).unwrap_or(f64::NAN),
            erz_km: numeric(bulletin_field(line, "erz")).unwrap_or(f64::NAN),
        });
    }
    Ok(hypocenters)
}
