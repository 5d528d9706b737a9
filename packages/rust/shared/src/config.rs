//! Application configuration for akuforge.
//!
//! User config lives at `~/.akuforge/akuforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AkuForgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "akuforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".akuforge";

// ---------------------------------------------------------------------------
// Config structs (matching akuforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Migration policies.
    #[serde(default)]
    pub migration: MigrationPoliciesConfig,

    /// Graph store settings.
    #[serde(default)]
    pub graph: GraphConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Working directory for migration artifacts, relative to the source root.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// Default migration strategy.
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            strategy: default_strategy(),
        }
    }
}

fn default_work_dir() -> String {
    "tools/migration".into()
}
fn default_strategy() -> String {
    "conservative".into()
}

/// `[migration]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPoliciesConfig {
    /// Whether to create a full source-tree backup before converting.
    #[serde(default = "default_true")]
    pub create_backup: bool,

    /// Whether to import converted units into the graph store.
    #[serde(default = "default_true")]
    pub use_graph: bool,
}

impl Default for MigrationPoliciesConfig {
    fn default() -> Self {
        Self {
            create_backup: true,
            use_graph: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// `[graph]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Graph database file, relative to the work dir.
    #[serde(default = "default_db_file")]
    pub db_file: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            db_file: default_db_file(),
        }
    }
}

fn default_db_file() -> String {
    "graph.db".into()
}

// ---------------------------------------------------------------------------
// Migration strategy
// ---------------------------------------------------------------------------

/// Migration strategy selected at run configuration time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Conservative,
    Aggressive,
    Custom,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Aggressive => "aggressive",
            Self::Custom => "custom",
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = AkuForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "aggressive" => Ok(Self::Aggressive),
            "custom" => Ok(Self::Custom),
            other => Err(AkuForgeError::config(format!(
                "unknown strategy '{other}' (expected conservative, aggressive, or custom)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Migration config (runtime, merged from config + CLI flags + prompts)
// ---------------------------------------------------------------------------

/// Runtime migration configuration, merged from config file, CLI flags, and
/// the one-time upfront prompt.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Root of the document tree to migrate.
    pub source_root: PathBuf,
    /// Working directory for plan/report/backup artifacts.
    pub work_dir: PathBuf,
    /// Whether to create a full source-tree backup.
    pub create_backup: bool,
    /// Whether to import into the graph store.
    pub use_graph: bool,
    /// Selected strategy.
    pub strategy: Strategy,
    /// Graph database path.
    pub db_path: PathBuf,
    /// Tool version string for artifacts.
    pub tool_version: String,
}

impl MigrationConfig {
    /// Resolve a runtime config from the app config and a source root.
    pub fn resolve(config: &AppConfig, source_root: &Path, tool_version: &str) -> Result<Self> {
        let strategy: Strategy = config.defaults.strategy.parse()?;
        let work_dir = source_root.join(&config.defaults.work_dir);
        let db_path = work_dir.join(&config.graph.db_file);

        Ok(Self {
            source_root: source_root.to_path_buf(),
            work_dir,
            create_backup: config.migration.create_backup,
            use_graph: config.migration.use_graph,
            strategy,
            db_path,
            tool_version: tool_version.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.akuforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AkuForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.akuforge/akuforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AkuForgeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        AkuForgeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AkuForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AkuForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AkuForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("work_dir"));
        assert!(toml_str.contains("create_backup"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.work_dir, "tools/migration");
        assert!(parsed.migration.create_backup);
        assert!(parsed.migration.use_graph);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[migration]
create_backup = false
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert!(!config.migration.create_backup);
        assert!(config.migration.use_graph);
        assert_eq!(config.defaults.strategy, "conservative");
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("aggressive".parse::<Strategy>().unwrap(), Strategy::Aggressive);
        assert_eq!("Conservative".parse::<Strategy>().unwrap(), Strategy::Conservative);
        assert!("yolo".parse::<Strategy>().is_err());
    }

    #[test]
    fn migration_config_resolution() {
        let app = AppConfig::default();
        let resolved =
            MigrationConfig::resolve(&app, Path::new("/data/docs"), "0.1.0-test").unwrap();
        assert_eq!(resolved.source_root, Path::new("/data/docs"));
        assert_eq!(
            resolved.work_dir,
            Path::new("/data/docs/tools/migration")
        );
        assert_eq!(
            resolved.db_path,
            Path::new("/data/docs/tools/migration/graph.db")
        );
        assert_eq!(resolved.strategy, Strategy::Conservative);
    }

    #[test]
    fn bad_strategy_in_config_errors() {
        let toml_str = r#"
[defaults]
strategy = "reckless"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        let result = MigrationConfig::resolve(&config, Path::new("/tmp"), "0.1.0");
        assert!(result.is_err());
    }
}
