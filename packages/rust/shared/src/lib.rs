//! Shared types, configuration, and errors for akuforge.
//!
//! This crate has no I/O beyond config file loading; every other crate in the
//! workspace depends on it for the core domain model.

mod config;
mod error;
mod types;

pub use config::{
    AppConfig, DefaultsConfig, GraphConfig, MigrationConfig, MigrationPoliciesConfig, Strategy,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{AkuForgeError, Result};
pub use types::{
    AkuRecord, AnalysisIssue, CURRENT_RECORD_VERSION, Capabilities, CompletionMap,
    DocumentDescriptor, Implementation, IssueKind, KnowledgeUnit, RELATIONSHIP_KINDS,
    RelationshipEdge, RelationshipKind, RelationshipMap, TopicClass, UnitId, UnitMetadata,
    UnitStatus, UnitType,
};
