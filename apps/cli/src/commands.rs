//! CLI command definitions, routing, and tracing setup.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use akuforge_graph::GraphStore;
use akuforge_metrics::aggregate;
use akuforge_migrate::{
    DecisionHandler, FixedDecision, MigrationOutcome, MigrationProgress, MigrationStep,
    run_migration,
};
use akuforge_shared::{
    AkuForgeError, MigrationConfig, Strategy, config_file_path, init_config, load_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// akuforge: extract knowledge units from documents and migrate them into a graph store.
#[derive(Parser)]
#[command(
    name = "akuforge",
    version,
    about = "Extract typed knowledge units from a document tree and migrate them into a graph-backed store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Analyze a document tree and print extraction metrics without migrating.
    Analyze {
        /// Root of the document tree.
        path: String,
    },

    /// Run the staged migration pipeline over a document tree.
    Migrate {
        /// Root of the document tree.
        path: String,

        /// Skip the source-tree backup step.
        #[arg(long)]
        no_backup: bool,

        /// Skip the graph import step.
        #[arg(long)]
        no_graph: bool,

        /// Migration strategy: conservative, aggressive, or custom.
        #[arg(long)]
        strategy: Option<String>,

        /// Skip all prompts; abort on the first failed step.
        #[arg(long)]
        non_interactive: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "akuforge=info",
        1 => "akuforge=debug",
        _ => "akuforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Analyze { path } => cmd_analyze(&path).await,
        Command::Migrate {
            path,
            no_backup,
            no_graph,
            strategy,
            non_interactive,
        } => {
            cmd_migrate(
                &path,
                no_backup,
                no_graph,
                strategy.as_deref(),
                non_interactive,
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

async fn cmd_analyze(path: &str) -> Result<()> {
    let config = load_config()?;
    let source_root = resolve_root(path)?;
    let migration = MigrationConfig::resolve(
        &config,
        &source_root,
        env!("CARGO_PKG_VERSION"),
    )?;

    info!(root = %source_root.display(), "analyzing document tree");

    let descriptors: Vec<_> = akuforge_scanner::scan(&source_root)?
        .into_iter()
        .filter(|d| !d.absolute_path.starts_with(&migration.work_dir))
        .collect();
    let file_count = descriptors.len();

    let (units, issues) = akuforge_extract::extract_batch(&descriptors);
    let analysis = aggregate(units, issues);

    println!();
    println!("  Files scanned:       {file_count}");
    println!("  Units extracted:     {}", analysis.units.len());
    println!("  Relationships:       {}", analysis.edges.len());
    println!("  Dropped references:  {}", analysis.dropped_references);
    println!("  Issues:              {}", analysis.issues.len());
    println!("  Overall completion:  {}%", analysis.overall_completion);

    if !analysis.completion_by_node.is_empty() {
        println!();
        println!("  Completion by node:");
        for (node, completion) in &analysis.completion_by_node {
            println!("    {node:<24} {completion}%");
        }
    }

    if !analysis.recommendations.is_empty() {
        println!();
        println!("  Recommendations:");
        for rec in &analysis.recommendations {
            println!("    - {}", rec.message);
        }
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// migrate
// ---------------------------------------------------------------------------

async fn cmd_migrate(
    path: &str,
    no_backup: bool,
    no_graph: bool,
    strategy: Option<&str>,
    non_interactive: bool,
) -> Result<()> {
    let config = load_config()?;
    let source_root = resolve_root(path)?;
    let mut migration = MigrationConfig::resolve(
        &config,
        &source_root,
        env!("CARGO_PKG_VERSION"),
    )?;

    // CLI flags override the config file.
    if no_backup {
        migration.create_backup = false;
    }
    if no_graph {
        migration.use_graph = false;
    }
    if let Some(s) = strategy {
        migration.strategy = s.parse()?;
    }

    // One-time upfront configuration prompt.
    if !non_interactive {
        migration.create_backup =
            prompt_bool("Create a full backup before converting?", migration.create_backup)?;
        migration.use_graph =
            prompt_bool("Import units into the graph store?", migration.use_graph)?;
        migration.strategy = prompt_strategy(migration.strategy)?;
    }

    info!(
        root = %source_root.display(),
        backup = migration.create_backup,
        graph = migration.use_graph,
        strategy = migration.strategy.as_str(),
        "starting migration"
    );

    let sink: Option<Arc<dyn akuforge_graph::GraphSink>> = if migration.use_graph {
        Some(Arc::new(GraphStore::open(&migration.db_path).await?))
    } else {
        None
    };

    let reporter = CliProgress::new();
    let outcome = if non_interactive {
        run_migration(&migration, sink, &FixedDecision(false), &reporter).await?
    } else {
        run_migration(&migration, sink, &PromptDecision, &reporter).await?
    };

    // Print summary
    println!();
    println!("  Migration complete!");
    println!("  Run:            {}", outcome.run.id);
    println!("  Files:          {}", outcome.run.stats.files_processed);
    println!("  Units:          {}", outcome.run.stats.units_created);
    println!("  Relationships:  {}", outcome.run.stats.relationships_mapped);
    println!("  Duplicates:     {}", outcome.run.stats.duplicates_resolved);
    println!("  Steps:          {} completed, {} skipped", outcome.run.completed_steps.len(), outcome.run.skipped_steps.len());
    if !outcome.run.errors.is_empty() {
        println!("  Errors:         {} (see report)", outcome.run.errors.len());
    }
    if let Some(report) = &outcome.report_path {
        println!("  Report:         {}", report.display());
    }
    println!("  Time:           {:.1}s", outcome.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn resolve_root(path: &str) -> Result<PathBuf> {
    let root = PathBuf::from(path);
    if !root.is_dir() {
        return Err(eyre!("'{path}' is not a directory"));
    }
    Ok(root)
}

// ---------------------------------------------------------------------------
// Interactive prompts
// ---------------------------------------------------------------------------

fn prompt_bool(question: &str, default: bool) -> Result<bool> {
    let suffix = if default { "[Y/n]" } else { "[y/N]" };
    let answer = prompt_line(&format!("{question} {suffix} "))?;
    Ok(match answer.to_ascii_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    })
}

fn prompt_strategy(default: Strategy) -> Result<Strategy> {
    let answer = prompt_line(&format!(
        "Strategy (conservative/aggressive/custom) [{}] ",
        default.as_str()
    ))?;
    if answer.is_empty() {
        return Ok(default);
    }
    Ok(answer.parse::<Strategy>()?)
}

fn prompt_line(question: &str) -> Result<String> {
    print!("{question}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Interactive continue-or-abort decision after a failed step.
struct PromptDecision;

impl DecisionHandler for PromptDecision {
    fn continue_after_failure(&self, step: MigrationStep, error: &AkuForgeError) -> bool {
        eprintln!();
        eprintln!("  Step '{step}' failed: {error}");
        prompt_bool("Continue with the next step?", false).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl MigrationProgress for CliProgress {
    fn step(&self, name: &str, current: usize, total: usize) {
        self.spinner.set_message(format!("[{current}/{total}] {name}"));
    }

    fn done(&self, _outcome: &MigrationOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("created {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let path = config_file_path()?;
    let config = load_config()?;
    let rendered = toml::to_string_pretty(&config)?;
    println!("# {}", path.display());
    println!("{rendered}");
    Ok(())
}
