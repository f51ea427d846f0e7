//! Final catalog export.
//!
//! The relocated catalog is summarized as a whitespace-aligned `xyzm`
//! table, the exchange format the downstream mapping and statistics
//! tooling already reads. One row per hypocenter, fixed column order,
//! `nan` for quantities the solver did not provide.

use std::io::Write;
use std::path::Path;

use chrono::NaiveDateTime;
use sl_common::{Error, Hypocenter, Result};

const COLUMNS: [&str; 14] = [
    "ORT", "Lon", "Lat", "Dep", "Mag", "Nus", "NuP", "NuS", "ADS", "MDS", "GAP", "RMS", "ERH",
    "ERZ",
];

fn origin_time(time: &NaiveDateTime) -> String {
    time.format("%Y-%m-%dT%H:%M:%S.%6fZ").to_string()
}

fn float(value: f64) -> String {
    if value.is_nan() {
        format!("{:>7}", "nan")
    } else {
        format!("{value:7.3}")
    }
}

fn opt_float(value: Option<f64>) -> String {
    match value {
        Some(v) => float(v),
        None => format!("{:>7}", "nan"),
    }
}

/// Render the xyzm table.
pub fn render_xyzm<W: Write>(mut w: W, hypocenters: &[Hypocenter]) -> std::io::Result<()> {
    writeln!(
        w,
        "{:<27} {:>7} {:>7} {:>7} {:>7} {:>4} {:>4} {:>4} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7}",
        COLUMNS[0],
        COLUMNS[1],
        COLUMNS[2],
        COLUMNS[3],
        COLUMNS[4],
        COLUMNS[5],
        COLUMNS[6],
        COLUMNS[7],
        COLUMNS[8],
        COLUMNS[9],
        COLUMNS[10],
        COLUMNS[11],
        COLUMNS[12],
        COLUMNS[13],
    )?;
    for h in hypocenters {
        writeln!(
            w,
            "{:<27} {} {} {} {} {:>4} {:>4} {:>4} {:>7} {} {} {} {} {}",
            origin_time(&h.time),
            float(h.longitude),
            float(h.latitude),
            float(h.depth_km),
            opt_float(h.magnitude),
            h.n_p + h.n_s,
            h.n_p,
            h.n_s,
            "nan",
            float(h.min_dist_km),
            float(h.gap_deg),
            float(h.rms),
            float(h.erh_km),
            float(h.erz_km),
        )?;
    }
    Ok(())
}

/// Write the xyzm artifact atomically.
pub fn write_xyzm(path: &Path, hypocenters: &[Hypocenter]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Config(format!("xyzm path has no parent: {}", path.display())))?;
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    render_xyzm(tmp.as_file_mut(), hypocenters)?;
    tmp.as_file_mut().flush()?;
    tmp.persist(path).map_err(|err| Error::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn hypocenter() -> Hypocenter {
        Hypocenter {
            event_index: 0,
            time: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_micro_opt(12, 30, 45, 120_000)
                .unwrap(),
            longitude: 51.512,
            latitude: 35.761,
            depth_km: 10.84,
            magnitude: None,
            n_p: 6,
            n_s: 3,
            gap_deg: 110.0,
            min_dist_km: 12.0,
            rms: 0.12,
            erh_km: 0.7,
            erz_km: f64::NAN,
        }
    }

    #[test]
    fn test_header_column_order() {
        let mut buf = Vec::new();
        render_xyzm(&mut buf, &[]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let names: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(names, COLUMNS.to_vec());
    }

    #[test]
    fn test_row_values_and_nan_policy() {
        let mut buf = Vec::new();
        render_xyzm(&mut buf, &[hypocenter()]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.starts_with("2024-01-01T12:30:45.120000Z"), "{row}");
        assert!(row.contains(" 51.512"), "{row}");
        assert!(row.contains(" 10.840"), "{row}");
        let fields: Vec<&str> = row.split_whitespace().collect();
        assert_eq!(fields[5], "9", "Nus is total arrivals");
        assert_eq!(fields[6], "6");
        assert_eq!(fields[7], "3");
        assert_eq!(fields[4], "nan", "missing magnitude");
        assert_eq!(fields[8], "nan", "ADS never provided");
        assert_eq!(fields[13], "nan", "unreadable ERZ");
    }

    #[test]
    fn test_write_is_atomic_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("location").join("xyzm.dat");
        write_xyzm(&path, &[hypocenter()]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
