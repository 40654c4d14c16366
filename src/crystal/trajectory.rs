//! Optional per-point text log of slip and hardness trajectories.
use crate::crystal::state::PointLocation;
use log::warn;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum TrajectoryRecord {
    /// Slip predictor at the start of an implicit solve.
    Predictor { dt: f64, max_slip: f64, total_slip: f64 },
    MinimizerFailed,
    MinimizerNotConverged,
    /// Maxima (in absolute value) after a successful update.
    Converged {
        max_slip: f64,
        max_hardening: f64,
        max_shear: f64,
    },
}

/// Appends trajectory records to `slips_{cell}_{point}.out` in a fixed directory.
///
/// Points without a location are never logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrajectoryLog {
    directory: PathBuf,
}

impl TrajectoryLog {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn file_path(&self, location: PointLocation) -> PathBuf {
        self.directory
            .join(format!("slips_{}_{}.out", location.cell, location.point))
    }

    /// Appends a record for the point at `location`. Failure to write is logged and otherwise
    /// ignored, since the log is purely diagnostic.
    pub fn append(&self, location: Option<PointLocation>, record: &TrajectoryRecord) {
        let Some(location) = location else {
            return;
        };

        let line = match record {
            TrajectoryRecord::Predictor {
                dt,
                max_slip,
                total_slip,
            } => format!("{} {} {}", dt, max_slip, total_slip),
            TrajectoryRecord::MinimizerFailed => "minimizer failed".to_string(),
            TrajectoryRecord::MinimizerNotConverged => "minimizer not converged".to_string(),
            TrajectoryRecord::Converged {
                max_slip,
                max_hardening,
                max_shear,
            } => format!("{} {} {}", max_slip, max_hardening, max_shear),
        };

        let path = self.file_path(location);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(err) = result {
            warn!("Failed to write trajectory log {}: {}", path.display(), err);
        }
    }
}
