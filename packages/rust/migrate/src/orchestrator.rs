//! The staged migration orchestrator.
//!
//! Drives the fixed step sequence over one mutable [`MigrationRun`]. Each step
//! either succeeds, is skipped by explicit configuration, or fails. A
//! failed step always pauses for the injected continue-or-abort decision
//! before anything else happens. There is no automatic rollback; backups exist
//! so an operator can restore state manually.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use akuforge_extract::extract_batch;
use akuforge_graph::GraphSink;
use akuforge_metrics::{ContentAnalysis, aggregate};
use akuforge_shared::{AkuForgeError, AkuRecord, MigrationConfig, Result, UnitId};

use crate::artifacts::{self, ArtifactMeta};
use crate::{MigrationRun, MigrationStep, STEP_ORDER, StepError};

// ---------------------------------------------------------------------------
// Injected collaborators
// ---------------------------------------------------------------------------

/// The continue-or-abort decision point, injected so the orchestrator is fully
/// testable without interactive input.
pub trait DecisionHandler: Send + Sync {
    /// Decide whether the run proceeds past a failed step.
    fn continue_after_failure(&self, step: MigrationStep, error: &AkuForgeError) -> bool;
}

/// Fixed-policy decision handler for headless runs and tests.
pub struct FixedDecision(pub bool);

impl DecisionHandler for FixedDecision {
    fn continue_after_failure(&self, _step: MigrationStep, _error: &AkuForgeError) -> bool {
        self.0
    }
}

/// Progress callback for reporting run status.
pub trait MigrationProgress: Send + Sync {
    /// Called when a step begins.
    fn step(&self, name: &str, current: usize, total: usize);
    /// Called when the run completes successfully.
    fn done(&self, outcome: &MigrationOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl MigrationProgress for SilentProgress {
    fn step(&self, _name: &str, _current: usize, _total: usize) {}
    fn done(&self, _outcome: &MigrationOutcome) {}
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of a completed migration run.
#[derive(Debug)]
pub struct MigrationOutcome {
    /// Final run state, including any errors that were continued past.
    pub run: MigrationRun,
    /// Path of the final report artifact.
    pub report_path: Option<PathBuf>,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Whether a step ran or was skipped by configuration.
enum StepStatus {
    Completed,
    Skipped,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Sequential, named-step migration pipeline over one source tree.
///
/// Holds the single mutable run-state value for the duration of one
/// invocation. Artifact paths are fixed, so concurrent runs against the same
/// source tree must be serialized by the caller.
pub struct Orchestrator<'a> {
    config: &'a MigrationConfig,
    sink: Option<Arc<dyn GraphSink>>,
    decisions: &'a dyn DecisionHandler,
    progress: &'a dyn MigrationProgress,
    run: MigrationRun,
    analysis: Option<ContentAnalysis>,
    records: Vec<AkuRecord>,
    warnings: Vec<String>,
    plan_meta: Option<ArtifactMeta>,
    report_path: Option<PathBuf>,
    #[cfg(test)]
    force_fail: Option<MigrationStep>,
}

/// Run the full migration pipeline. Convenience wrapper over [`Orchestrator`].
pub async fn run_migration(
    config: &MigrationConfig,
    sink: Option<Arc<dyn GraphSink>>,
    decisions: &dyn DecisionHandler,
    progress: &dyn MigrationProgress,
) -> Result<MigrationOutcome> {
    Orchestrator::new(config, sink, decisions, progress).run().await
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a MigrationConfig,
        sink: Option<Arc<dyn GraphSink>>,
        decisions: &'a dyn DecisionHandler,
        progress: &'a dyn MigrationProgress,
    ) -> Self {
        Self {
            config,
            sink,
            decisions,
            progress,
            run: MigrationRun::new(),
            analysis: None,
            records: Vec::new(),
            warnings: Vec::new(),
            plan_meta: None,
            report_path: None,
            #[cfg(test)]
            force_fail: None,
        }
    }

    #[cfg(test)]
    fn with_forced_failure(mut self, step: MigrationStep) -> Self {
        self.force_fail = Some(step);
        self
    }

    /// Execute the fixed step sequence to completion or abort.
    #[instrument(skip_all, fields(run_id = %self.run.id, source = %self.config.source_root.display()))]
    pub async fn run(mut self) -> Result<MigrationOutcome> {
        let start = Instant::now();

        artifacts::create_temp(&self.config.work_dir)?;
        info!(work_dir = %self.config.work_dir.display(), "starting migration run");

        let total = STEP_ORDER.len();
        for (index, step) in STEP_ORDER.into_iter().enumerate() {
            self.run.current_step_index = index;
            self.progress.step(step.name(), index + 1, total);

            match self.execute_step(step).await {
                Ok(StepStatus::Completed) => {
                    debug!(step = step.name(), "step completed");
                    self.run.completed_steps.push(step);
                }
                Ok(StepStatus::Skipped) => {
                    info!(step = step.name(), "step skipped by configuration");
                    self.run.skipped_steps.push(step);
                }
                Err(error) => {
                    warn!(step = step.name(), error = %error, "step failed");
                    self.run.errors.push(StepError {
                        step: step.name().to_string(),
                        message: error.to_string(),
                        timestamp: Utc::now(),
                    });

                    if !self.decisions.continue_after_failure(step, &error) {
                        info!(step = step.name(), "abort chosen, terminating run");
                        return Err(self.fail(Some(step), error));
                    }
                    info!(step = step.name(), "continue chosen despite failure");
                }
            }
        }

        // A fully "successful" run that produced nothing indicates an upstream
        // extraction problem and is a hard failure.
        if self.run.stats.units_created == 0 {
            let error = AkuForgeError::validation(
                "migration completed but zero units were created",
            );
            return Err(self.fail(None, error));
        }

        let progress = self.progress;
        let outcome = MigrationOutcome {
            run: self.run,
            report_path: self.report_path,
            elapsed: start.elapsed(),
        };
        progress.done(&outcome);

        info!(
            run_id = %outcome.run.id,
            units = outcome.run.stats.units_created,
            errors = outcome.run.errors.len(),
            elapsed_ms = outcome.elapsed.as_millis(),
            "migration run complete"
        );

        Ok(outcome)
    }

    /// Persist the failure report, then hand the error back to the caller.
    fn fail(self, step: Option<MigrationStep>, error: AkuForgeError) -> AkuForgeError {
        let written = artifacts::write_failure_report(
            &self.config.work_dir,
            &self.run,
            step.map(MigrationStep::name),
            &error.to_string(),
            self.config,
        );
        if let Err(report_error) = written {
            warn!(error = %report_error, "could not persist failure report");
        }
        error
    }

    async fn execute_step(&mut self, step: MigrationStep) -> Result<StepStatus> {
        #[cfg(test)]
        if self.force_fail == Some(step) {
            return Err(AkuForgeError::migration(step.name(), "injected failure"));
        }

        match step {
            MigrationStep::AnalyzeCurrentContent => self.step_analyze(),
            MigrationStep::CreateBackup => self.step_backup(),
            MigrationStep::GenerateMigrationPlan => self.step_plan(),
            MigrationStep::ConvertToAkuFormat => self.step_convert(),
            MigrationStep::ImportToGraph => self.step_import().await,
            MigrationStep::ValidateRelationships => self.step_validate().await,
            MigrationStep::GenerateReports => self.step_reports(),
            MigrationStep::Cleanup => Ok(self.step_cleanup()),
        }
    }

    // -----------------------------------------------------------------------
    // Step implementations
    // -----------------------------------------------------------------------

    /// Scan the source tree, extract units per file, and aggregate.
    fn step_analyze(&mut self) -> Result<StepStatus> {
        // The work dir usually lives inside the source root; artifacts and
        // backups from earlier runs are never unit candidates.
        let descriptors: Vec<_> = akuforge_scanner::scan(&self.config.source_root)?
            .into_iter()
            .filter(|d| !d.absolute_path.starts_with(&self.config.work_dir))
            .collect();
        self.run.stats.files_processed = descriptors.len();

        let (units, issues) = extract_batch(&descriptors);
        let analysis = aggregate(units, issues);

        self.run.stats.units_created = analysis.units.len();
        self.run.stats.relationships_mapped = analysis.edges.len();

        info!(
            files = self.run.stats.files_processed,
            units = self.run.stats.units_created,
            edges = self.run.stats.relationships_mapped,
            issues = analysis.issues.len(),
            "content analysis complete"
        );

        self.analysis = Some(analysis);
        Ok(StepStatus::Completed)
    }

    /// Full recursive copy of the source tree, when enabled.
    fn step_backup(&mut self) -> Result<StepStatus> {
        if !self.config.create_backup {
            return Ok(StepStatus::Skipped);
        }
        artifacts::create_backup(self.config)?;
        Ok(StepStatus::Completed)
    }

    /// Serialize the migration plan artifact.
    fn step_plan(&mut self) -> Result<StepStatus> {
        let analysis = self.require_analysis(MigrationStep::GenerateMigrationPlan)?;
        let plan = artifacts::build_plan(self.config, analysis, self.run.stats.files_processed);
        let (_path, meta) = artifacts::write_plan(&self.config.work_dir, &plan)?;
        self.plan_meta = Some(meta);
        Ok(StepStatus::Completed)
    }

    /// Convert retained units into persisted records, collapsing exact id
    /// collisions (first record wins).
    fn step_convert(&mut self) -> Result<StepStatus> {
        let analysis = self.require_analysis(MigrationStep::ConvertToAkuFormat)?;

        let mut seen: std::collections::HashSet<UnitId> = std::collections::HashSet::new();
        let mut records = Vec::with_capacity(analysis.units.len());
        let mut duplicates = 0;

        for unit in &analysis.units {
            if seen.insert(unit.id.clone()) {
                records.push(AkuRecord::from_unit(unit.clone()));
            } else {
                duplicates += 1;
            }
        }

        self.run.stats.duplicates_resolved = duplicates;
        info!(records = records.len(), duplicates, "units converted to records");
        self.records = records;
        Ok(StepStatus::Completed)
    }

    /// Push nodes and validated edges into the graph sink, when enabled.
    async fn step_import(&mut self) -> Result<StepStatus> {
        if !self.config.use_graph {
            return Ok(StepStatus::Skipped);
        }
        let sink = self.sink.clone().ok_or_else(|| {
            AkuForgeError::migration(
                MigrationStep::ImportToGraph.name(),
                "graph import enabled but no sink was provided",
            )
        })?;

        for record in &self.records {
            let attrs = serde_json::to_value(record).map_err(|e| {
                AkuForgeError::migration(
                    MigrationStep::ImportToGraph.name(),
                    format!("record serialization: {e}"),
                )
            })?;
            sink.add_node(&record.unit.id.0, record.unit.unit_type.as_str(), &attrs)
                .await?;
        }

        let edges = self
            .analysis
            .as_ref()
            .map(|a| a.edges.clone())
            .unwrap_or_default();
        for edge in &edges {
            sink.add_edge(edge.kind.as_str(), &edge.source_id.0, &edge.target_id.0)
                .await?;
        }

        info!(nodes = self.records.len(), edges = edges.len(), "graph import complete");
        Ok(StepStatus::Completed)
    }

    /// Re-confirm that imported edges reference imported nodes. Dangling edges
    /// are recorded warnings, not failures.
    async fn step_validate(&mut self) -> Result<StepStatus> {
        let Some(sink) = self.sink.clone().filter(|_| self.config.use_graph) else {
            debug!("graph import disabled, nothing to validate");
            return Ok(StepStatus::Completed);
        };

        let mut dangling = 0;
        for (kind, source_id, target_id) in sink.list_edges().await? {
            for endpoint in [&source_id, &target_id] {
                if !sink.node_exists(endpoint).await? {
                    dangling += 1;
                    let message =
                        format!("dangling {kind} edge endpoint: {endpoint} (from {source_id})");
                    warn!("{message}");
                    self.warnings.push(message);
                }
            }
        }

        info!(dangling, "relationship validation complete");
        Ok(StepStatus::Completed)
    }

    /// Write the final summary artifact.
    fn step_reports(&mut self) -> Result<StepStatus> {
        let analysis = self.require_analysis(MigrationStep::GenerateReports)?;
        let report = artifacts::MigrationReport {
            generated_at: Utc::now(),
            run: &self.run,
            config: self.config.into(),
            analysis: analysis.summary(),
            recommendations: &analysis.recommendations,
            warnings: &self.warnings,
            artifacts: self.plan_meta.clone().into_iter().collect(),
        };

        let (path, _meta) = artifacts::write_report(&self.config.work_dir, &report)?;
        self.report_path = Some(path);
        Ok(StepStatus::Completed)
    }

    /// Best-effort scratch removal. A cleanup failure is a warning only; the
    /// run is already complete at this point.
    fn step_cleanup(&mut self) -> StepStatus {
        if let Err(error) = artifacts::cleanup_temp(&self.config.work_dir) {
            warn!(error = %error, "cleanup failed");
            self.warnings.push(format!("cleanup failed: {error}"));
        }
        StepStatus::Completed
    }

    fn require_analysis(&self, step: MigrationStep) -> Result<&ContentAnalysis> {
        self.analysis.as_ref().ok_or_else(|| {
            AkuForgeError::migration(step.name(), "no content analysis available")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use akuforge_graph::MemorySink;
    use akuforge_shared::AppConfig;
    use std::path::Path;

    /// A small source tree with classifiable documents that reference each
    /// other by title.
    fn make_tree() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        std::fs::create_dir_all(root.join("aiq/modules")).unwrap();
        std::fs::create_dir_all(root.join("aiq/foundation")).unwrap();

        std::fs::write(
            root.join("aiq/modules/router.md"),
            "---\ntitle: Message Router\ntype: capability\nstatus: active\nversion: \"1.0\"\n---\n\
             \n## Overview\n\nRoutes messages between nodes using declared topics.\n\
             \nThis capability depends on Transport Core.\n\n```rust\nfn route() {}\n```\n",
        )
        .unwrap();
        std::fs::write(
            root.join("aiq/foundation/transport.md"),
            "---\ntitle: Transport Core\ntype: knowledge\n---\n\
             \nBaseline knowledge about the transport substrate and its guarantees.\n",
        )
        .unwrap();
        tmp
    }

    fn make_config(root: &Path) -> MigrationConfig {
        MigrationConfig::resolve(&AppConfig::default(), root, "0.1.0-test").unwrap()
    }

    #[tokio::test]
    async fn full_run_succeeds_and_imports() {
        let tmp = make_tree();
        let config = make_config(tmp.path());
        let sink = Arc::new(MemorySink::new());

        let outcome = run_migration(
            &config,
            Some(sink.clone()),
            &FixedDecision(false),
            &SilentProgress,
        )
        .await
        .expect("run succeeds");

        // Every step completed, in the fixed order.
        assert_eq!(outcome.run.completed_steps, STEP_ORDER);
        assert!(outcome.run.skipped_steps.is_empty());
        assert!(outcome.run.errors.is_empty());

        assert_eq!(outcome.run.stats.files_processed, 2);
        assert_eq!(outcome.run.stats.units_created, 2);
        assert_eq!(outcome.run.stats.relationships_mapped, 1);

        // Nodes and the validated edge landed in the sink.
        assert_eq!(sink.node_count().await.unwrap(), 2);
        let edges = sink.list_edges().await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].0, "requires");

        // Artifacts exist at their fixed paths.
        assert!(config.work_dir.join(artifacts::PLAN_FILE).exists());
        assert!(config.work_dir.join(artifacts::REPORT_FILE).exists());
        assert!(!config.work_dir.join(artifacts::FAILURE_FILE).exists());
        assert!(config.work_dir.join(artifacts::BACKUPS_DIR).exists());
        // Scratch dir was cleaned up.
        assert!(!config.work_dir.join(artifacts::TMP_DIR).exists());
    }

    #[tokio::test]
    async fn disabled_steps_are_skipped_in_order() {
        let tmp = make_tree();
        let mut config = make_config(tmp.path());
        config.create_backup = false;
        config.use_graph = false;

        let outcome = run_migration(&config, None, &FixedDecision(false), &SilentProgress)
            .await
            .expect("run succeeds");

        assert_eq!(
            outcome.run.skipped_steps,
            [MigrationStep::CreateBackup, MigrationStep::ImportToGraph]
        );
        // Completed steps remain an ordered subsequence of the fixed order
        // with only the config-gated steps missing.
        assert_eq!(
            outcome.run.completed_steps,
            [
                MigrationStep::AnalyzeCurrentContent,
                MigrationStep::GenerateMigrationPlan,
                MigrationStep::ConvertToAkuFormat,
                MigrationStep::ValidateRelationships,
                MigrationStep::GenerateReports,
                MigrationStep::Cleanup,
            ]
        );
        assert!(!config.work_dir.join(artifacts::BACKUPS_DIR).exists());
    }

    #[tokio::test]
    async fn zero_units_is_a_hard_failure() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "plain prose about nothing\n").unwrap();
        let config = make_config(tmp.path());

        let error = run_migration(&config, None, &FixedDecision(true), &SilentProgress)
            .await
            .expect_err("zero units must fail");

        assert!(error.to_string().contains("zero units"));
        // Evidence persisted before the error propagated.
        let failure = std::fs::read_to_string(config.work_dir.join(artifacts::FAILURE_FILE))
            .expect("failure report exists");
        assert!(failure.contains("zero units"));
    }

    #[tokio::test]
    async fn failed_step_with_abort_terminates_immediately() {
        let tmp = make_tree();
        let config = make_config(tmp.path());
        let sink = Arc::new(MemorySink::new());

        let error = Orchestrator::new(
            &config,
            Some(sink.clone()),
            &FixedDecision(false),
            &SilentProgress,
        )
        .with_forced_failure(MigrationStep::ConvertToAkuFormat)
        .run()
        .await
        .expect_err("abort must fail the run");

        assert!(error.to_string().contains("convert-to-aku-format"));

        // import-to-graph never executed.
        assert_eq!(sink.node_count().await.unwrap(), 0);

        // Failure report carries the failed step's error.
        let failure = std::fs::read_to_string(config.work_dir.join(artifacts::FAILURE_FILE))
            .expect("failure report exists");
        assert!(failure.contains("convert-to-aku-format"));
        assert!(failure.contains("injected failure"));

        // No final report was written.
        assert!(!config.work_dir.join(artifacts::REPORT_FILE).exists());
    }

    #[tokio::test]
    async fn failed_step_with_continue_reaches_final_report() {
        let tmp = make_tree();
        let config = make_config(tmp.path());
        let sink = Arc::new(MemorySink::new());

        let outcome = Orchestrator::new(
            &config,
            Some(sink),
            &FixedDecision(true),
            &SilentProgress,
        )
        .with_forced_failure(MigrationStep::ConvertToAkuFormat)
        .run()
        .await
        .expect("continue must finish the run");

        // The error is retained in the run state and the final report.
        assert_eq!(outcome.run.errors.len(), 1);
        assert_eq!(outcome.run.errors[0].step, "convert-to-aku-format");

        let report = std::fs::read_to_string(
            outcome.report_path.expect("report path"),
        )
        .unwrap();
        assert!(report.contains("convert-to-aku-format"));
        assert!(report.contains("injected failure"));

        // The failed step is absent from completed_steps; later steps ran.
        assert!(
            !outcome
                .run
                .completed_steps
                .contains(&MigrationStep::ConvertToAkuFormat)
        );
        assert!(
            outcome
                .run
                .completed_steps
                .contains(&MigrationStep::GenerateReports)
        );
    }

    #[tokio::test]
    async fn run_is_deterministic_across_invocations() {
        let tmp = make_tree();
        let config = make_config(tmp.path());

        let mut first_ids: Vec<String> = Vec::new();
        for _ in 0..2 {
            let sink = Arc::new(MemorySink::new());
            let outcome = run_migration(
                &config,
                Some(sink.clone()),
                &FixedDecision(false),
                &SilentProgress,
            )
            .await
            .unwrap();
            assert_eq!(outcome.run.stats.units_created, 2);

            let mut ids = sink.node_ids();
            ids.sort();
            if first_ids.is_empty() {
                first_ids = ids;
            } else {
                assert_eq!(first_ids, ids);
            }
        }
    }
}
