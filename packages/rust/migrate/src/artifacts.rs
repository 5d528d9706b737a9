//! Migration artifacts: plan, reports, backups, and the working directory.
//!
//! All artifacts live at fixed, predictable paths under the migration work
//! directory, which is why two concurrent runs against one source tree are
//! unsafe. JSON artifacts are written atomically (temp file, then rename) and
//! carry sha256 checksums in the final report.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use akuforge_metrics::{AnalysisSummary, ContentAnalysis, Recommendation};
use akuforge_shared::{AkuForgeError, MigrationConfig, Result, Strategy};

use crate::{MigrationRun, STEP_ORDER};

/// Plan artifact file name under the work dir.
pub const PLAN_FILE: &str = "migration-plan.json";
/// Final report artifact file name.
pub const REPORT_FILE: &str = "migration-report.json";
/// Failure report artifact file name.
pub const FAILURE_FILE: &str = "migration-failure.json";
/// Backup directory name under the work dir.
pub const BACKUPS_DIR: &str = "backups";
/// Scratch directory name under the work dir, removed by the cleanup step.
pub const TMP_DIR: &str = "tmp";

// ---------------------------------------------------------------------------
// Artifact metadata
// ---------------------------------------------------------------------------

/// Checksum metadata for a written artifact file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Write a JSON artifact atomically and return its checksum metadata.
pub fn write_json_atomic<T: Serialize>(path: &Path, data: &T) -> Result<ArtifactMeta> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| AkuForgeError::validation(format!("JSON serialization failed: {e}")))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{filename}.tmp"));

    // Write to temp file first, then atomic rename
    std::fs::write(&temp, &json).map_err(|e| AkuForgeError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| AkuForgeError::io(path, e))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    debug!(path = %path.display(), size = json.len(), "wrote artifact");

    Ok(ArtifactMeta {
        filename,
        sha256: hash,
        size_bytes: json.len(),
    })
}

// ---------------------------------------------------------------------------
// Migration plan
// ---------------------------------------------------------------------------

/// One described step in the plan artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub name: String,
    pub description: String,
}

/// The serialized migration plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub created_at: DateTime<Utc>,
    pub strategy: Strategy,
    pub analysis: AnalysisSummary,
    pub steps: Vec<PlanStep>,
    pub estimated_duration_secs: u64,
    pub risks: Vec<String>,
}

/// Build the plan from the run configuration and analysis results.
pub fn build_plan(
    config: &MigrationConfig,
    analysis: &ContentAnalysis,
    files_processed: usize,
) -> MigrationPlan {
    let summary = analysis.summary();

    let steps = STEP_ORDER
        .iter()
        .map(|step| PlanStep {
            name: step.name().to_string(),
            description: step_description(step.name()).to_string(),
        })
        .collect();

    // Crude estimate: 2s per source file, 1s per unit.
    let estimated_duration_secs = 2 * files_processed as u64 + summary.total_units as u64;

    let mut risks = Vec::new();
    if !summary.duplicate_ids.is_empty() {
        risks.push(format!(
            "{} duplicate unit id(s) will be collapsed to a single record",
            summary.duplicate_ids.len()
        ));
    }
    if summary.overall_completion < 50 {
        risks.push(format!(
            "overall completion is {}%, below the 50% threshold",
            summary.overall_completion
        ));
    }
    if !config.create_backup {
        risks.push("backups are disabled; no automatic restore point will exist".to_string());
    }

    MigrationPlan {
        created_at: Utc::now(),
        strategy: config.strategy,
        analysis: summary,
        steps,
        estimated_duration_secs,
        risks,
    }
}

fn step_description(name: &str) -> &'static str {
    match name {
        "analyze-current-content" => "scan the source tree and extract knowledge units",
        "create-backup" => "copy the source tree to a timestamped backup directory",
        "generate-migration-plan" => "write this plan artifact",
        "convert-to-aku-format" => "convert retained units to persisted records",
        "import-to-graph" => "push nodes and validated edges into the graph store",
        "validate-relationships" => "re-check imported edges against imported nodes",
        "generate-reports" => "write the final summary artifact",
        "cleanup" => "remove the temporary working directory",
        _ => "unknown step",
    }
}

/// Write the plan artifact to the work dir.
pub fn write_plan(work_dir: &Path, plan: &MigrationPlan) -> Result<(PathBuf, ArtifactMeta)> {
    let path = work_dir.join(PLAN_FILE);
    let meta = write_json_atomic(&path, plan)?;
    info!(path = %path.display(), risks = plan.risks.len(), "migration plan written");
    Ok((path, meta))
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Serializable configuration slice embedded in report artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub source_root: String,
    pub work_dir: String,
    pub create_backup: bool,
    pub use_graph: bool,
    pub strategy: Strategy,
    pub tool_version: String,
}

impl From<&MigrationConfig> for ConfigSummary {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            source_root: config.source_root.display().to_string(),
            work_dir: config.work_dir.display().to_string(),
            create_backup: config.create_backup,
            use_graph: config.use_graph,
            strategy: config.strategy,
            tool_version: config.tool_version.clone(),
        }
    }
}

/// The final summary artifact.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub run: &'a MigrationRun,
    pub config: ConfigSummary,
    pub analysis: AnalysisSummary,
    pub recommendations: &'a [Recommendation],
    pub warnings: &'a [String],
    /// Checksums of previously written artifacts (currently the plan).
    pub artifacts: Vec<ArtifactMeta>,
}

/// Write the final report artifact.
pub fn write_report(work_dir: &Path, report: &MigrationReport<'_>) -> Result<(PathBuf, ArtifactMeta)> {
    let path = work_dir.join(REPORT_FILE);
    let meta = write_json_atomic(&path, report)?;
    info!(path = %path.display(), "migration report written");
    Ok((path, meta))
}

/// The failure artifact, persisted before any fatal error reaches the caller.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub error: String,
    pub failed_step: Option<&'static str>,
    pub run: &'a MigrationRun,
    pub config: ConfigSummary,
}

/// Write the failure report artifact. Never fails the caller twice: the path
/// is returned best-effort.
pub fn write_failure_report(
    work_dir: &Path,
    run: &MigrationRun,
    failed_step: Option<&'static str>,
    error: &str,
    config: &MigrationConfig,
) -> Result<PathBuf> {
    let report = FailureReport {
        generated_at: Utc::now(),
        error: error.to_string(),
        failed_step,
        run,
        config: config.into(),
    };
    let path = work_dir.join(FAILURE_FILE);
    write_json_atomic(&path, &report)?;
    info!(path = %path.display(), "failure report written");
    Ok(path)
}

// ---------------------------------------------------------------------------
// Backup
// ---------------------------------------------------------------------------

/// Copy the full source tree to a timestamped backup directory under the work
/// dir. The work dir itself is excluded so backups never recurse into
/// themselves. Returns the backup path and the number of files copied.
pub fn create_backup(config: &MigrationConfig) -> Result<(PathBuf, usize)> {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let backup_dir = config
        .work_dir
        .join(BACKUPS_DIR)
        .join(format!("backup-{stamp}"));

    std::fs::create_dir_all(&backup_dir).map_err(|e| AkuForgeError::io(&backup_dir, e))?;

    let copied = copy_tree(&config.source_root, &backup_dir, &config.work_dir)?;
    info!(path = %backup_dir.display(), files = copied, "backup created");

    Ok((backup_dir, copied))
}

/// Recursively copy `src` into `dst`, skipping anything under `exclude`.
fn copy_tree(src: &Path, dst: &Path, exclude: &Path) -> Result<usize> {
    let mut copied = 0;

    for entry in std::fs::read_dir(src).map_err(|e| AkuForgeError::io(src, e))? {
        let entry = entry.map_err(|e| AkuForgeError::io(src, e))?;
        let path = entry.path();
        if path.starts_with(exclude) {
            continue;
        }

        let target = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| AkuForgeError::io(&path, e))?;

        if file_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| AkuForgeError::io(&target, e))?;
            copied += copy_tree(&path, &target, exclude)?;
        } else if file_type.is_file() {
            std::fs::copy(&path, &target).map_err(|e| AkuForgeError::io(&target, e))?;
            copied += 1;
        }
    }

    Ok(copied)
}

// ---------------------------------------------------------------------------
// Scratch directory
// ---------------------------------------------------------------------------

/// Create the scratch directory for a run.
pub fn create_temp(work_dir: &Path) -> Result<PathBuf> {
    let tmp = work_dir.join(TMP_DIR);
    std::fs::create_dir_all(&tmp).map_err(|e| AkuForgeError::io(&tmp, e))?;
    Ok(tmp)
}

/// Remove the scratch directory. Missing is fine; other failures surface to
/// the caller, which treats them as warnings.
pub fn cleanup_temp(work_dir: &Path) -> Result<()> {
    let tmp = work_dir.join(TMP_DIR);
    if !tmp.exists() {
        return Ok(());
    }
    std::fs::remove_dir_all(&tmp).map_err(|e| AkuForgeError::io(&tmp, e))
}
