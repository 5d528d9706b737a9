//! Staged migration pipeline for extracted knowledge units.
//!
//! A migration run walks a fixed, ordered list of named steps (analyze,
//! backup, plan, convert, import, validate, report, cleanup), persisting
//! plan/report artifacts along the way and pausing for an explicit
//! continue-or-abort decision after any failed step.

pub mod artifacts;
pub mod orchestrator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use orchestrator::{
    DecisionHandler, FixedDecision, MigrationOutcome, MigrationProgress, Orchestrator,
    SilentProgress, run_migration,
};

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// The fixed migration steps. Transitions are strictly sequential; there is no
/// branching between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationStep {
    AnalyzeCurrentContent,
    CreateBackup,
    GenerateMigrationPlan,
    ConvertToAkuFormat,
    ImportToGraph,
    ValidateRelationships,
    GenerateReports,
    Cleanup,
}

/// The canonical step order.
pub const STEP_ORDER: [MigrationStep; 8] = [
    MigrationStep::AnalyzeCurrentContent,
    MigrationStep::CreateBackup,
    MigrationStep::GenerateMigrationPlan,
    MigrationStep::ConvertToAkuFormat,
    MigrationStep::ImportToGraph,
    MigrationStep::ValidateRelationships,
    MigrationStep::GenerateReports,
    MigrationStep::Cleanup,
];

impl MigrationStep {
    /// Kebab-case step name used in artifacts and logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::AnalyzeCurrentContent => "analyze-current-content",
            Self::CreateBackup => "create-backup",
            Self::GenerateMigrationPlan => "generate-migration-plan",
            Self::ConvertToAkuFormat => "convert-to-aku-format",
            Self::ImportToGraph => "import-to-graph",
            Self::ValidateRelationships => "validate-relationships",
            Self::GenerateReports => "generate-reports",
            Self::Cleanup => "cleanup",
        }
    }
}

impl std::fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for migration run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recorded step failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepError {
    pub step: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Counters accumulated over one run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MigrationStats {
    pub files_processed: usize,
    pub units_created: usize,
    pub relationships_mapped: usize,
    pub duplicates_resolved: usize,
}

/// Process-wide state for one orchestrator execution.
///
/// Created at orchestrator start, mutated step-by-step, and never persisted
/// mid-run beyond the on-disk plan/report artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRun {
    pub id: RunId,
    /// The fixed step list, by name.
    pub steps: Vec<&'static str>,
    pub current_step_index: usize,
    pub completed_steps: Vec<MigrationStep>,
    /// Steps skipped by explicit configuration (backup/import only).
    pub skipped_steps: Vec<MigrationStep>,
    pub errors: Vec<StepError>,
    pub stats: MigrationStats,
    pub started_at: DateTime<Utc>,
}

impl MigrationRun {
    pub fn new() -> Self {
        Self {
            id: RunId::new(),
            steps: STEP_ORDER.iter().map(|s| s.name()).collect(),
            current_step_index: 0,
            completed_steps: Vec::new(),
            skipped_steps: Vec::new(),
            errors: Vec::new(),
            stats: MigrationStats::default(),
            started_at: Utc::now(),
        }
    }
}

impl Default for MigrationRun {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_names_are_kebab_case() {
        assert_eq!(
            MigrationStep::AnalyzeCurrentContent.name(),
            "analyze-current-content"
        );
        assert_eq!(MigrationStep::Cleanup.name(), "cleanup");
        assert_eq!(
            serde_json::to_value(MigrationStep::ImportToGraph).unwrap(),
            "import-to-graph"
        );
    }

    #[test]
    fn step_order_is_fixed() {
        assert_eq!(STEP_ORDER.len(), 8);
        assert_eq!(STEP_ORDER[0], MigrationStep::AnalyzeCurrentContent);
        assert_eq!(STEP_ORDER[7], MigrationStep::Cleanup);
    }

    #[test]
    fn new_run_starts_clean() {
        let run = MigrationRun::new();
        assert_eq!(run.steps.len(), 8);
        assert!(run.completed_steps.is_empty());
        assert!(run.errors.is_empty());
        assert_eq!(run.stats.units_created, 0);
    }

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed = RunId(s.parse().expect("parse uuid"));
        assert_eq!(id, parsed);
    }
}
