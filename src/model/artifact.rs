//! Persisted model bundle.
//!
//! Everything needed to score new data travels together in one JSON file:
//! the fitted pipeline, the booster, the output feature names and constraint
//! string, the chosen hyperparameters, the evaluation, and training metadata.
//! Writes go to a sibling temporary file that is renamed into place, so a
//! crashed save never leaves a half-written artifact at `path`.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ModelKind, TrainConfig};
use crate::error::AppError;
use crate::features::{ConstraintSummary, Preprocessor};
use crate::fit::{Params, SearchResult};
use crate::gbdt::Booster;
use crate::report::EvaluationReport;

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSizes {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub trained_at: DateTime<Utc>,
    pub crate_version: String,
    pub split: String,
    pub partition_sizes: PartitionSizes,
    /// Rows removed before splitting (missing or unusable target).
    pub rows_dropped: usize,
    pub constraint_summary: ConstraintSummary,
    pub search: SearchResult,
    pub config: TrainConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedArtifact {
    pub format_version: u32,
    pub kind: ModelKind,
    pub target_column: String,
    pub log_target: bool,
    pub objective: String,
    pub eval_metric: String,
    pub feature_names: Vec<String>,
    pub monotone_constraints: String,
    pub best_params: Params,
    pub best_score: f64,
    pub preprocessor: Preprocessor,
    pub booster: Booster,
    pub evaluation: Option<EvaluationReport>,
    pub metadata: TrainingMetadata,
}

impl TrainedArtifact {
    /// Write the artifact as pretty JSON via temp-file + rename.
    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::io(format!("Failed to create directory '{}': {e}", parent.display()))
            })?;
        }

        let tmp = temp_sibling(path);
        let written = self.write_json(&tmp);
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            AppError::io(format!("Failed to move artifact into '{}': {e}", path.display()))
        })
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::io(format!("Failed to open artifact '{}': {e}", path.display())))?;
        let artifact: TrainedArtifact = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| AppError::io(format!("Failed to parse artifact '{}': {e}", path.display())))?;
        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(AppError::config(format!(
                "Artifact format version {} is not supported (expected {ARTIFACT_FORMAT_VERSION}).",
                artifact.format_version
            )));
        }
        Ok(artifact)
    }

    fn write_json(&self, tmp: &Path) -> Result<(), AppError> {
        let file = File::create(tmp)
            .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", tmp.display())))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| AppError::io(format!("Failed to serialize artifact: {e}")))?;
        writer
            .flush()
            .map_err(|e| AppError::io(format!("Failed to write '{}': {e}", tmp.display())))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| AppError::io(format!("Failed to sync '{}': {e}", tmp.display())))
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
