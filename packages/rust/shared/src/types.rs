//! Core domain types for akuforge knowledge units.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version for persisted AKU records.
pub const CURRENT_RECORD_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// UnitId
// ---------------------------------------------------------------------------

/// Stable identifier for a knowledge unit.
///
/// Format: `aku://{namespace}/{category}/{slug}/v1.0`. Derived deterministically
/// from a document's relative path, so re-extraction of an unchanged tree
/// produces identical ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub String);

impl UnitId {
    /// Build an id from its three deterministic components.
    pub fn derive(namespace: &str, category: &str, slug: &str) -> Self {
        Self(format!("aku://{namespace}/{category}/{slug}/v1.0"))
    }

    /// The namespace segment (the unit's "node" grouping for metrics).
    pub fn namespace(&self) -> &str {
        self.segments().next().unwrap_or("aiq")
    }

    /// The category segment.
    pub fn category(&self) -> &str {
        self.segments().nth(1).unwrap_or("general")
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.0
            .strip_prefix("aku://")
            .unwrap_or(&self.0)
            .split('/')
            .filter(|s| !s.is_empty())
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Unit classification enums
// ---------------------------------------------------------------------------

/// The four mutually-exclusive unit type categories.
///
/// Determined once at extraction time; documents matching no classification
/// rule are not unit candidates at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Capability,
    Knowledge,
    Pattern,
    Workflow,
}

impl UnitType {
    /// Kebab/lowercase name as persisted in records and graph nodes.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Capability => "capability",
            Self::Knowledge => "knowledge",
            Self::Pattern => "pattern",
            Self::Workflow => "workflow",
        }
    }

    /// Parse a declared type string, case-insensitively.
    /// Returns `None` for anything outside the fixed enumeration.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "capability" => Some(Self::Capability),
            "knowledge" => Some(Self::Knowledge),
            "pattern" => Some(Self::Pattern),
            "workflow" => Some(Self::Workflow),
            _ => None,
        }
    }
}

/// Lifecycle status of a unit. Defaults to `Draft` when undeclared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

impl UnitStatus {
    /// Parse a declared status string, case-insensitively.
    /// Unknown values fall back to `Draft`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Self::Active,
            "archived" => Self::Archived,
            _ => Self::Draft,
        }
    }
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// The four relationship kinds between units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Requires,
    Composes,
    Enhances,
    Conflicts,
}

/// All kinds, in the order they are extracted and reported.
pub const RELATIONSHIP_KINDS: [RelationshipKind; 4] = [
    RelationshipKind::Requires,
    RelationshipKind::Composes,
    RelationshipKind::Enhances,
    RelationshipKind::Conflicts,
];

impl RelationshipKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requires => "requires",
            Self::Composes => "composes",
            Self::Enhances => "enhances",
            Self::Conflicts => "conflicts",
        }
    }
}

/// Per-kind reference lists attached to a unit.
///
/// Holds raw free-text references straight after extraction; the aggregator
/// replaces the lists with validated unit ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipMap {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub composes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enhances: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
}

impl RelationshipMap {
    pub fn get(&self, kind: RelationshipKind) -> &[String] {
        match kind {
            RelationshipKind::Requires => &self.requires,
            RelationshipKind::Composes => &self.composes,
            RelationshipKind::Enhances => &self.enhances,
            RelationshipKind::Conflicts => &self.conflicts,
        }
    }

    pub fn get_mut(&mut self, kind: RelationshipKind) -> &mut Vec<String> {
        match kind {
            RelationshipKind::Requires => &mut self.requires,
            RelationshipKind::Composes => &mut self.composes,
            RelationshipKind::Enhances => &mut self.enhances,
            RelationshipKind::Conflicts => &mut self.conflicts,
        }
    }

    /// Total reference count across all four kinds.
    pub fn len(&self) -> usize {
        RELATIONSHIP_KINDS.iter().map(|k| self.get(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A validated (kind, source, target) link between two units.
///
/// Only produced by the aggregator once the target reference has been matched
/// against a known unit; raw references never become edges directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub kind: RelationshipKind,
    pub source_id: UnitId,
    pub target_id: UnitId,
}

// ---------------------------------------------------------------------------
// Unit sub-records
// ---------------------------------------------------------------------------

/// Declared capabilities of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<String>,
    /// Declared reliability in `0.0..=1.0`.
    #[serde(default = "default_reliability")]
    pub reliability: f64,
}

fn default_reliability() -> f64 {
    0.8
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            input: Vec::new(),
            output: Vec::new(),
            performance: None,
            reliability: default_reliability(),
        }
    }
}

/// One embedded implementation fragment found in a document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Fenced-code-block language tag.
    pub language: String,
    /// Inferred source path for the fragment.
    pub source_path: String,
    /// Inferred test path for the fragment.
    pub test_path: String,
}

/// Provenance metadata carried by every unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitMetadata {
    /// Source document path relative to the scanned root.
    pub source_path: String,
    /// Declared creation time, or the extraction time when undeclared.
    pub created: DateTime<Utc>,
    /// Declared update time, or the extraction time when undeclared.
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

// ---------------------------------------------------------------------------
// KnowledgeUnit
// ---------------------------------------------------------------------------

/// One classified, scored record extracted from a single source document.
///
/// Units are created once per source file per extraction run and never mutated
/// in place afterwards; the aggregator reconciles across the full set. Cross-run
/// identity is by `id` equality only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeUnit {
    pub id: UnitId,
    #[serde(rename = "type")]
    pub unit_type: UnitType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: UnitStatus,
    /// Rubric-based completion score, `0..=100`.
    pub completion: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implementations: Vec<Implementation>,
    #[serde(default)]
    pub relationships: RelationshipMap,
    pub metadata: UnitMetadata,
}

impl KnowledgeUnit {
    /// Display title, falling back to the id's slug.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(self.id.0.as_str())
    }
}

/// The persisted unit record shape produced by the convert step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AkuRecord {
    /// Record schema version for forward compatibility.
    pub record_version: u32,
    #[serde(flatten)]
    pub unit: KnowledgeUnit,
}

impl AkuRecord {
    pub fn from_unit(unit: KnowledgeUnit) -> Self {
        Self {
            record_version: CURRENT_RECORD_VERSION,
            unit,
        }
    }
}

// ---------------------------------------------------------------------------
// Scanner types
// ---------------------------------------------------------------------------

/// Advisory topic classification of a source subdirectory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicClass {
    Foundation,
    Protocols,
    Nodes,
    Modules,
    Implementation,
    Deployment,
    Quality,
    Tools,
    #[default]
    Other,
}

/// Descriptor for one candidate document found by the scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    /// Absolute filesystem path.
    pub absolute_path: std::path::PathBuf,
    /// Path relative to the scanned root, with `/` separators.
    pub relative_path: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
    /// Advisory topic of the containing directory; never filters scanning.
    pub topic: TopicClass,
}

// ---------------------------------------------------------------------------
// Analysis issues
// ---------------------------------------------------------------------------

/// Issue classes recorded during analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    FileAnalysisError,
}

/// A recoverable, per-file problem recorded during extraction.
/// Recording an issue never aborts the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisIssue {
    pub file: String,
    pub error: String,
    pub kind: IssueKind,
}

/// Per-category or per-node completion rollup, keyed by segment name.
pub type CompletionMap = BTreeMap<String, u32>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_id_derivation_is_deterministic() {
        let a = UnitId::derive("aiq", "protocols", "message-routing");
        let b = UnitId::derive("aiq", "protocols", "message-routing");
        assert_eq!(a, b);
        assert_eq!(a.0, "aku://aiq/protocols/message-routing/v1.0");
    }

    #[test]
    fn unit_id_segment_accessors() {
        let id = UnitId::derive("core", "patterns", "retry-loop");
        assert_eq!(id.namespace(), "core");
        assert_eq!(id.category(), "patterns");
    }

    #[test]
    fn unit_type_parse_rejects_unknown() {
        assert_eq!(UnitType::parse("Capability"), Some(UnitType::Capability));
        assert_eq!(UnitType::parse("WORKFLOW"), Some(UnitType::Workflow));
        assert_eq!(UnitType::parse("gadget"), None);
        assert_eq!(UnitType::parse(""), None);
    }

    #[test]
    fn unit_status_defaults_to_draft() {
        assert_eq!(UnitStatus::default(), UnitStatus::Draft);
        assert_eq!(UnitStatus::parse("active"), UnitStatus::Active);
        assert_eq!(UnitStatus::parse("bogus"), UnitStatus::Draft);
    }

    #[test]
    fn relationship_map_accessors() {
        let mut map = RelationshipMap::default();
        assert!(map.is_empty());
        map.get_mut(RelationshipKind::Requires).push("parser".into());
        map.get_mut(RelationshipKind::Conflicts).push("legacy".into());
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(RelationshipKind::Requires), ["parser"]);
    }

    #[test]
    fn capabilities_default_reliability() {
        let caps = Capabilities::default();
        assert!((caps.reliability - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn unit_serialization_roundtrip() {
        let now = Utc::now();
        let unit = KnowledgeUnit {
            id: UnitId::derive("aiq", "general", "example"),
            unit_type: UnitType::Knowledge,
            title: Some("Example".into()),
            description: None,
            status: UnitStatus::Draft,
            completion: 40,
            dependencies: vec!["parser".into()],
            capabilities: Capabilities::default(),
            implementations: vec![],
            relationships: RelationshipMap::default(),
            metadata: UnitMetadata {
                source_path: "general/example.md".into(),
                created: now,
                updated: now,
                author: None,
                version: None,
            },
        };

        let json = serde_json::to_string_pretty(&unit).expect("serialize");
        assert!(json.contains("\"type\": \"knowledge\""));
        let parsed: KnowledgeUnit = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, unit);
    }

    #[test]
    fn record_carries_schema_version() {
        let now = Utc::now();
        let unit = KnowledgeUnit {
            id: UnitId::derive("aiq", "general", "r"),
            unit_type: UnitType::Pattern,
            title: None,
            description: None,
            status: UnitStatus::default(),
            completion: 0,
            dependencies: vec![],
            capabilities: Capabilities::default(),
            implementations: vec![],
            relationships: RelationshipMap::default(),
            metadata: UnitMetadata {
                source_path: "r.md".into(),
                created: now,
                updated: now,
                author: None,
                version: None,
            },
        };
        let record = AkuRecord::from_unit(unit);
        assert_eq!(record.record_version, CURRENT_RECORD_VERSION);

        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["record_version"], 1);
        assert_eq!(json["type"], "pattern");
    }
}
