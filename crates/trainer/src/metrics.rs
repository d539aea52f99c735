use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Fraction of positions where `predictions` and `targets` agree.
pub fn accuracy(predictions: &[i64], targets: &[i64]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(targets)
        .filter(|(p, t)| p == t)
        .count();
    correct as f64 / targets.len() as f64
}

/// Multiclass Matthews correlation coefficient. Returns 0.0 when it is
/// undefined (a single predicted or true class).
pub fn matthews_corrcoef(predictions: &[i64], targets: &[i64], num_classes: usize) -> f64 {
    let mut confusion = vec![vec![0f64; num_classes]; num_classes];
    for (&p, &t) in predictions.iter().zip(targets) {
        if (0..num_classes as i64).contains(&p) && (0..num_classes as i64).contains(&t) {
            confusion[t as usize][p as usize] += 1.0;
        }
    }

    let t_sum: Vec<f64> = confusion.iter().map(|row| row.iter().sum()).collect();
    let p_sum: Vec<f64> = (0..num_classes)
        .map(|k| confusion.iter().map(|row| row[k]).sum())
        .collect();
    let correct: f64 = (0..num_classes).map(|k| confusion[k][k]).sum();
    let samples: f64 = t_sum.iter().sum();

    let cov_ytyp = correct * samples - p_sum.iter().zip(&t_sum).map(|(p, t)| p * t).sum::<f64>();
    let cov_ypyp = samples * samples - p_sum.iter().map(|p| p * p).sum::<f64>();
    let cov_ytyt = samples * samples - t_sum.iter().map(|t| t * t).sum::<f64>();

    let denominator = (cov_ytyt * cov_ypyp).sqrt();
    if denominator == 0.0 {
        0.0
    } else {
        cov_ytyp / denominator
    }
}

/// One row of the metrics CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_acc: f64,
    pub val_loss: f64,
    pub val_acc: f64,
    pub val_mcc: f64,
}

/// Appends one CSV row per epoch; the header is written when the file is new.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let csv_path = path.as_ref().to_path_buf();
        if let Some(dir) = csv_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        Ok(Self { csv_path })
    }

    pub fn log(&self, metrics: &EpochMetrics) -> Result<()> {
        let is_new = !self.csv_path.exists()
            || fs::metadata(&self.csv_path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Failed to open metrics file {:?}", self.csv_path))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer.serialize(metrics)?;
        writer.flush()?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

/// Tracks the best validation accuracy seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BestTracker {
    best: f64,
}

impl BestTracker {
    pub fn best(&self) -> f64 {
        self.best
    }

    /// Records `accuracy` and returns true only if it beats the best so far.
    pub fn observe(&mut self, accuracy: f64) -> bool {
        if accuracy > self.best {
            self.best = accuracy;
            true
        } else {
            false
        }
    }
}
