//! Read-only view over the waveform archive.
//!
//! The archive is produced by the acquisition step and laid out per
//! window:
//!
//! ```text
//! DB/
//!   20240101_20240102/
//!     waveforms/*.mseed
//!     stations/stations.csv
//! ```
//!
//! Nothing here writes to the archive. A window whose directory is absent
//! surfaces as `MissingArtifact`, which the sequencer maps to Skipped.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use sl_common::table::{RowError, TableRow};
use sl_common::{Error, Result, Station, Window};
use sl_geo::Projector;
use tracing::debug;

const WAVEFORM_EXTENSION: &str = "mseed";

/// One waveform file recorded by the acquire stage.
///
/// The manifest pins the exact file set a window was processed with, so a
/// re-entered pick stage chunks the same inputs the first attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub file: String,
}

impl TableRow for ManifestEntry {
    const COLUMNS: &'static [&'static str] = &["file"];

    fn to_row(&self) -> String {
        self.file.clone()
    }

    fn parse_row(fields: &[&str]) -> std::result::Result<Self, RowError> {
        match fields {
            [file] => Ok(ManifestEntry {
                file: (*file).to_owned(),
            }),
            _ => Err(RowError(format!(
                "expected 1 field, got {}",
                fields.len()
            ))),
        }
    }
}

/// Inventory row as stored in the archive, before projection.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRow {
    pub id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub elevation_m: f64,
}

/// Handle on the archive root.
#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Archive { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn window_dir(&self, window: &Window) -> PathBuf {
        self.root.join(window.id())
    }

    fn waveform_dir(&self, window: &Window) -> PathBuf {
        self.window_dir(window).join("waveforms")
    }

    fn inventory_path(&self, window: &Window) -> PathBuf {
        self.window_dir(window).join("stations").join("stations.csv")
    }

    /// Waveform files for a window, sorted by file name.
    ///
    /// Sorting makes chunk boundaries deterministic across runs. An empty
    /// list is a valid answer (the window has no data); a missing waveform
    /// directory means acquisition never ran for this window.
    pub fn waveforms(&self, window: &Window) -> Result<Vec<PathBuf>> {
        let dir = self.waveform_dir(window);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::MissingArtifact {
                    window: window.id(),
                    path: dir,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(WAVEFORM_EXTENSION))
            })
            .collect();
        files.sort();
        debug!(window = %window, files = files.len(), "listed waveforms");
        Ok(files)
    }

    /// Station inventory for a window, filtered to the configured
    /// networks and projected into the local frame.
    pub fn stations(
        &self,
        window: &Window,
        networks: &[String],
        projector: &Projector,
    ) -> Result<Vec<Station>> {
        let rows = self.inventory(window)?;
        let mut stations: Vec<Station> = rows
            .into_iter()
            .filter(|row| in_networks(&row.id, networks))
            .map(|row| {
                let (x_km, y_km) = projector.to_local(row.longitude, row.latitude);
                Station {
                    id: row.id,
                    longitude: row.longitude,
                    latitude: row.latitude,
                    elevation_m: row.elevation_m,
                    x_km,
                    y_km,
                    z_km: -row.elevation_m / 1000.0,
                }
            })
            .collect();
        stations.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(stations)
    }

    fn inventory(&self, window: &Window) -> Result<Vec<InventoryRow>> {
        let path = self.inventory_path(window);
        let file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::MissingArtifact {
                    window: window.id(),
                    path,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let malformed = |detail: String| Error::MalformedArtifact {
            path: path.clone(),
            detail,
        };

        let mut lines = std::io::BufReader::new(file).lines();
        match lines.next() {
            Some(Ok(header)) if header.trim() == "id,longitude,latitude,elevation_m" => {}
            Some(Ok(header)) => {
                return Err(malformed(format!("unexpected inventory header: {header}")))
            }
            Some(Err(err)) => return Err(err.into()),
            None => return Err(malformed("empty inventory file".to_owned())),
        }

        let mut rows = Vec::new();
        for (number, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != 4 {
                return Err(malformed(format!(
                    "line {}: expected 4 fields, got {}",
                    number + 2,
                    fields.len()
                )));
            }
            let parse = |field: &str, name: &str| {
                field.trim().parse::<f64>().map_err(|_| {
                    malformed(format!("line {}: invalid {name}: {field}", number + 2))
                })
            };
            rows.push(InventoryRow {
                id: fields[0].trim().to_owned(),
                longitude: parse(fields[1], "longitude")?,
                latitude: parse(fields[2], "latitude")?,
                elevation_m: parse(fields[3], "elevation")?,
            });
        }
        Ok(rows)
    }
}

/// Station ids are `NET.STA` prefixed; an empty network list admits all.
fn in_networks(station_id: &str, networks: &[String]) -> bool {
    if networks.is_empty() {
        return true;
    }
    networks
        .iter()
        .any(|net| station_id.starts_with(&format!("{net}.")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn window() -> Window {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Window::new(start, start + chrono::TimeDelta::days(1))
    }

    fn seeded_archive() -> (tempfile::TempDir, Archive) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("DB");
        let w = window();
        let wdir = root.join(w.id());
        std::fs::create_dir_all(wdir.join("waveforms")).unwrap();
        std::fs::create_dir_all(wdir.join("stations")).unwrap();
        for name in ["b.mseed", "a.mseed", "c.mseed", "notes.txt"] {
            std::fs::write(wdir.join("waveforms").join(name), b"").unwrap();
        }
        std::fs::write(
            wdir.join("stations").join("stations.csv"),
            "id,longitude,latitude,elevation_m\n\
             AB.STA1,45.5,38.2,1200.0\n\
             AB.STA2,45.6,38.3,900.0\n\
             XX.OUT1,45.7,38.4,100.0\n",
        )
        .unwrap();
        (dir, Archive::new(root))
    }

    #[test]
    fn test_waveforms_sorted_and_filtered() {
        let (_dir, archive) = seeded_archive();
        let files = archive.waveforms(&window()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.mseed", "b.mseed", "c.mseed"]);
    }

    #[test]
    fn test_missing_window_dir_is_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::new(dir.path().join("DB"));
        let err = archive.waveforms(&window()).unwrap_err();
        assert_eq!(err.code(), 20);
        assert!(err.skips_window());
    }

    #[test]
    fn test_stations_filtered_and_projected() {
        let (_dir, archive) = seeded_archive();
        let projector = Projector::new(45.5, 38.2);
        let stations = archive
            .stations(&window(), &["AB".to_owned()], &projector)
            .unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].id, "AB.STA1");
        assert!(stations[0].x_km.abs() < 1e-9, "center maps to origin");
        assert!((stations[0].z_km - (-1.2)).abs() < 1e-12);
        assert!(stations[1].y_km > 0.0, "north of center");
    }

    #[test]
    fn test_empty_network_list_admits_all() {
        let (_dir, archive) = seeded_archive();
        let projector = Projector::new(45.5, 38.2);
        let stations = archive.stations(&window(), &[], &projector).unwrap();
        assert_eq!(stations.len(), 3);
    }

    #[test]
    fn test_bad_inventory_header_is_malformed() {
        let (dir, archive) = seeded_archive();
        let w = window();
        let path = dir
            .path()
            .join("DB")
            .join(w.id())
            .join("stations")
            .join("stations.csv");
        std::fs::write(&path, "code;lon;lat\n").unwrap();
        let projector = Projector::new(45.5, 38.2);
        let err = archive.stations(&w, &[], &projector).unwrap_err();
        assert_eq!(err.code(), 21);
    }
}
