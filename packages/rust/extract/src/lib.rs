//! Knowledge unit extraction.
//!
//! Turns one scanned document into at most one typed [`KnowledgeUnit`]:
//! front matter and body are separated, the document is classified into a unit
//! type by an ordered precedence of rules, and every unit field is derived
//! from explicit, reproducible pattern rules. Nothing here is probabilistic.

mod frontmatter;
pub mod relationships;

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, instrument};

use akuforge_shared::{
    AkuForgeError, AnalysisIssue, Capabilities, DocumentDescriptor, Implementation, IssueKind,
    KnowledgeUnit, Result, UnitId, UnitMetadata, UnitStatus, UnitType,
};

pub use frontmatter::{FrontMatter, split_front_matter};
pub use relationships::extract_relationships;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A scanned document together with its loaded content.
#[derive(Debug, Clone)]
pub struct Document {
    pub descriptor: DocumentDescriptor,
    pub content: String,
}

impl Document {
    /// Load a document's content from disk.
    pub fn read(descriptor: DocumentDescriptor) -> Result<Self> {
        let content = std::fs::read_to_string(&descriptor.absolute_path)
            .map_err(|e| AkuForgeError::io(&descriptor.absolute_path, e))?;
        Ok(Self {
            descriptor,
            content,
        })
    }
}

// ---------------------------------------------------------------------------
// Type classification rule tables
// ---------------------------------------------------------------------------

/// Keyword groups shared by the path and body classification passes.
const TYPE_KEYWORDS: &[(UnitType, &[&str])] = &[
    (UnitType::Capability, &["capability", "feature"]),
    (UnitType::Knowledge, &["knowledge", "wisdom"]),
    (UnitType::Pattern, &["pattern", "template"]),
    (UnitType::Workflow, &["workflow", "process"]),
];

/// Parent-directory fallback convention, consulted last.
const PARENT_DIR_TYPES: &[(&str, UnitType)] = &[
    ("modules", UnitType::Capability),
    ("capabilities", UnitType::Capability),
    ("foundation", UnitType::Knowledge),
    ("principles", UnitType::Knowledge),
];

/// Classify a document into a unit type, or `None` if it is not a unit
/// candidate at all.
///
/// Precedence is deliberate: explicit declaration > structural location >
/// content inference > directory convention. Each pass is first-match-wins.
pub fn classify_unit_type(
    front: Option<&FrontMatter>,
    relative_path: &str,
    body: &str,
) -> Option<UnitType> {
    if let Some(declared) = front
        .and_then(|fm| fm.get_str("type"))
        .and_then(|t| UnitType::parse(&t))
    {
        return Some(declared);
    }

    let path_lc = relative_path.to_lowercase();
    for (unit_type, keywords) in TYPE_KEYWORDS {
        if keywords.iter().any(|k| path_lc.contains(k)) {
            return Some(*unit_type);
        }
    }

    let body_lc = body.to_lowercase();
    for (unit_type, keywords) in TYPE_KEYWORDS {
        if keywords.iter().any(|k| body_lc.contains(k)) {
            return Some(*unit_type);
        }
    }

    let parent = parent_dir_name(relative_path)?.to_lowercase();
    PARENT_DIR_TYPES
        .iter()
        .find(|(name, _)| *name == parent)
        .map(|(_, unit_type)| *unit_type)
}

/// Immediate parent directory name of a relative path, if any.
fn parent_dir_name(relative_path: &str) -> Option<&str> {
    let mut segments: Vec<&str> = relative_path.split('/').collect();
    segments.pop()?;
    segments.pop()
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract a knowledge unit from one document.
///
/// Returns `Ok(None)` when the document matches no classification rule;
/// it is then simply not a unit candidate, which is not an error.
#[instrument(skip_all, fields(path = %doc.descriptor.relative_path))]
pub fn extract(doc: &Document) -> Result<Option<KnowledgeUnit>> {
    let (front, body) = split_front_matter(&doc.content);
    let relative_path = doc.descriptor.relative_path.as_str();

    let Some(unit_type) = classify_unit_type(front.as_ref(), relative_path, body) else {
        debug!("no classification rule matched, not a unit candidate");
        return Ok(None);
    };

    let id = derive_id(relative_path);

    // Scoring counts only declared-or-derived titles; the filename fallback
    // applied below does not contribute to completion.
    let derived_title = front
        .as_ref()
        .and_then(|fm| fm.get_str("title"))
        .or_else(|| first_heading(body));
    let description = front
        .as_ref()
        .and_then(|fm| fm.get_str("description"))
        .or_else(|| first_paragraph(body));

    let status_declared = front.as_ref().is_some_and(|fm| fm.contains("status"));
    let version_declared = front.as_ref().is_some_and(|fm| fm.contains("version"));

    let completion = completion_score(
        derived_title.is_some(),
        description.is_some(),
        status_declared,
        version_declared,
        body,
    );

    let status = front
        .as_ref()
        .and_then(|fm| fm.get_str("status"))
        .map(|s| UnitStatus::parse(&s))
        .unwrap_or_default();

    let title = derived_title.or_else(|| Some(file_stem(relative_path).to_string()));

    let now = Utc::now();
    let metadata = UnitMetadata {
        source_path: relative_path.to_string(),
        created: front
            .as_ref()
            .and_then(|fm| fm.get_str("created"))
            .and_then(|s| parse_timestamp(&s))
            .unwrap_or(now),
        updated: front
            .as_ref()
            .and_then(|fm| fm.get_str("updated"))
            .and_then(|s| parse_timestamp(&s))
            .unwrap_or(now),
        author: front.as_ref().and_then(|fm| fm.get_str("author")),
        version: front.as_ref().and_then(|fm| fm.get_str("version")),
    };

    let mut capabilities = extract_capabilities(body);
    if let Some(fm) = front.as_ref() {
        capabilities.performance = fm.get_str("performance").or(capabilities.performance);
        if let Some(reliability) = fm
            .get_str("reliability")
            .and_then(|s| s.parse::<f64>().ok())
        {
            capabilities.reliability = reliability.clamp(0.0, 1.0);
        }
    }

    Ok(Some(KnowledgeUnit {
        id,
        unit_type,
        title,
        description,
        status,
        completion,
        dependencies: extract_dependencies(body),
        capabilities,
        implementations: extract_implementations(body, relative_path),
        relationships: relationships::extract_relationships(body),
        metadata,
    }))
}

/// Read and extract a whole batch of scanned documents.
///
/// A failure on any single file is recorded as an issue and the batch
/// continues. One malformed document never aborts the run.
pub fn extract_batch(descriptors: &[DocumentDescriptor]) -> (Vec<KnowledgeUnit>, Vec<AnalysisIssue>) {
    let mut units = Vec::new();
    let mut issues = Vec::new();

    for descriptor in descriptors {
        match Document::read(descriptor.clone()).and_then(|doc| extract(&doc)) {
            Ok(Some(unit)) => units.push(unit),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(file = %descriptor.relative_path, error = %e, "file analysis failed");
                issues.push(AnalysisIssue {
                    file: descriptor.relative_path.clone(),
                    error: e.to_string(),
                    kind: IssueKind::FileAnalysisError,
                });
            }
        }
    }

    (units, issues)
}

// ---------------------------------------------------------------------------
// Identifier derivation
// ---------------------------------------------------------------------------

/// Derive the stable unit id from a relative path.
///
/// Namespace and category come from the first two directory segments,
/// defaulting to `aiq`/`general` when the path is too shallow.
pub fn derive_id(relative_path: &str) -> UnitId {
    let segments: Vec<&str> = relative_path.split('/').collect();
    let dirs = &segments[..segments.len().saturating_sub(1)];
    let namespace = dirs.first().copied().unwrap_or("aiq");
    let category = dirs.get(1).copied().unwrap_or("general");
    UnitId::derive(namespace, category, &slugify(file_stem(relative_path)))
}

/// Lowercase alphanumerics-and-hyphens slug of a name.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_hyphen = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn file_stem(relative_path: &str) -> &str {
    let name = relative_path.rsplit('/').next().unwrap_or(relative_path);
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

// ---------------------------------------------------------------------------
// Title & description derivation
// ---------------------------------------------------------------------------

/// First Markdown heading line, with markers stripped.
fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|t| !t.is_empty())
}

/// First prose paragraph of 20–500 characters, after stripping heading markers.
/// Fenced code blocks are not prose and never qualify.
fn first_paragraph(body: &str) -> Option<String> {
    for paragraph in body.split("\n\n") {
        if paragraph.trim_start().starts_with("```") {
            continue;
        }
        let text = paragraph
            .lines()
            .map(|line| line.trim_start_matches('#').trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if (20..=500).contains(&text.len()) {
            return Some(text);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Completion scoring
// ---------------------------------------------------------------------------

/// Weighted completion rubric, capped at 100.
///
/// Deterministic and order-independent: the same document always scores the
/// same value.
pub fn completion_score(
    has_title: bool,
    has_description: bool,
    status_declared: bool,
    version_declared: bool,
    body: &str,
) -> u8 {
    let mut score: u32 = 0;
    if has_title {
        score += 20;
    }
    if has_description {
        score += 20;
    }
    if status_declared {
        score += 10;
    }
    if version_declared {
        score += 10;
    }
    if body.len() > 500 {
        score += 20;
    }
    if body.contains("## ") {
        score += 10;
    }
    if body.contains("```") {
        score += 10;
    }
    score.min(100) as u8
}

// ---------------------------------------------------------------------------
// Capabilities & dependencies
// ---------------------------------------------------------------------------

/// Matches `input(s): ...` / `output(s): ...` lines, case-insensitively.
static CAPABILITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*[-*]?\s*(inputs?|outputs?)\s*:\s*(.+)$").expect("capability regex")
});

/// Matches dependency declaration phrases at line level.
static DEPENDENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^.*?\b(?:depends\s+on|requires?|needs?)\b:?\s+(.+)$")
        .expect("dependency regex")
});

/// Extract declared input/output capability lines from the body.
fn extract_capabilities(body: &str) -> Capabilities {
    let mut capabilities = Capabilities::default();

    for caps in CAPABILITY_RE.captures_iter(body) {
        let value = caps[2].trim().to_string();
        if caps[1].to_ascii_lowercase().starts_with("input") {
            capabilities.input.push(value);
        } else {
            capabilities.output.push(value);
        }
    }

    capabilities
}

/// Extract free-text dependency references, splitting matched lines on commas.
fn extract_dependencies(body: &str) -> Vec<String> {
    let mut dependencies = Vec::new();

    for caps in DEPENDENCY_RE.captures_iter(body) {
        for part in caps[1].split(',') {
            let dep = part.trim().trim_end_matches('.').trim();
            if !dep.is_empty() {
                dependencies.push(dep.to_string());
            }
        }
    }

    dependencies
}

// ---------------------------------------------------------------------------
// Implementation fragments
// ---------------------------------------------------------------------------

/// Record one implementation entry per fenced code block.
///
/// The source path substitutes the document's extension with the fragment's
/// language tag; the test path is synthesized under `tests/`.
fn extract_implementations(body: &str, relative_path: &str) -> Vec<Implementation> {
    let mut implementations = Vec::new();
    let mut in_block = false;

    for line in body.lines() {
        let Some(rest) = line.trim_start().strip_prefix("```") else {
            continue;
        };
        if in_block {
            in_block = false;
            continue;
        }
        in_block = true;

        let tag = rest.trim().split_whitespace().next().unwrap_or("");
        let language = if tag.is_empty() { "text" } else { tag }.to_ascii_lowercase();

        let base = relative_path
            .rsplit_once('.')
            .map(|(base, _)| base)
            .unwrap_or(relative_path);

        implementations.push(Implementation {
            source_path: format!("{base}.{language}"),
            test_path: format!("tests/{}_test.{language}", file_stem(relative_path)),
            language,
        });
    }

    implementations
}

/// Parse a declared timestamp, accepting RFC 3339 or a bare date.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use akuforge_shared::TopicClass;

    fn make_doc(relative_path: &str, content: &str) -> Document {
        Document {
            descriptor: DocumentDescriptor {
                absolute_path: std::path::PathBuf::from(format!("/src/{relative_path}")),
                relative_path: relative_path.to_string(),
                size_bytes: content.len() as u64,
                modified: Utc::now(),
                topic: TopicClass::Other,
            },
            content: content.to_string(),
        }
    }

    #[test]
    fn clean_extraction_scores_eighty() {
        // Title + status + version declared, 600-char body with one section
        // heading and one fenced block, but no qualifying description
        // paragraph: 20 + 10 + 10 + 20 + 10 + 10 = 80.
        let filler = "x".repeat(560);
        let content = format!(
            "---\ntitle: \"Foo\"\nstatus: \"active\"\nversion: \"1.0\"\n---\n\
             ## Section\n\n{filler}\n\n```rust\nfn main() {{}}\n```\n"
        );
        let doc = make_doc("modules/foo.md", &content);
        let unit = extract(&doc).unwrap().expect("unit");

        assert_eq!(unit.unit_type, UnitType::Capability);
        assert_eq!(unit.title.as_deref(), Some("Foo"));
        assert!(unit.description.is_none());
        assert_eq!(unit.status, UnitStatus::Active);
        assert_eq!(unit.completion, 80);
        assert_eq!(unit.metadata.version.as_deref(), Some("1.0"));
    }

    #[test]
    fn full_document_scores_one_hundred() {
        let filler = "y".repeat(520);
        let content = format!(
            "---\ntitle: Bar\ndescription: A fully filled-in unit document.\n\
             status: active\nversion: \"2.0\"\n---\n\
             ## Overview\n\n{filler}\n\n```python\npass\n```\n"
        );
        let unit = extract(&make_doc("modules/bar.md", &content))
            .unwrap()
            .expect("unit");
        assert_eq!(unit.completion, 100);
    }

    #[test]
    fn empty_document_scores_zero() {
        let doc = make_doc("foundation/empty.md", "");
        let unit = extract(&doc).unwrap().expect("unit via parent dir rule");
        assert_eq!(unit.unit_type, UnitType::Knowledge);
        assert_eq!(unit.completion, 0);
        // Filename fallback still names the unit without affecting the score.
        assert_eq!(unit.title.as_deref(), Some("empty"));
    }

    #[test]
    fn extraction_is_deterministic() {
        let content = "---\ntitle: Stable\n---\n\n## Body\n\nSome description over twenty chars.\n";
        let doc = make_doc("aiq/patterns/stable-thing.md", content);
        let a = extract(&doc).unwrap().unwrap();
        let b = extract(&doc).unwrap().unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.completion, b.completion);
        assert_eq!(a.id.0, "aku://aiq/patterns/stable-thing/v1.0");
    }

    #[test]
    fn declared_type_beats_path_inference() {
        // The path says "patterns" but the declaration wins.
        let content = "---\ntype: workflow\n---\nBody.\n";
        let unit = extract(&make_doc("aiq/patterns/deploy.md", content))
            .unwrap()
            .unwrap();
        assert_eq!(unit.unit_type, UnitType::Workflow);
    }

    #[test]
    fn invalid_declared_type_falls_through_to_path() {
        let content = "---\ntype: gadget\n---\nBody.\n";
        let unit = extract(&make_doc("aiq/patterns/deploy.md", content))
            .unwrap()
            .unwrap();
        assert_eq!(unit.unit_type, UnitType::Pattern);
    }

    #[test]
    fn body_keywords_classify_when_path_is_neutral() {
        let content = "This document describes the release workflow in detail.\n";
        let unit = extract(&make_doc("docs/release.md", content))
            .unwrap()
            .unwrap();
        assert_eq!(unit.unit_type, UnitType::Workflow);
    }

    #[test]
    fn unclassifiable_document_yields_none() {
        let content = "Nothing to see here. Plain prose about gardening.\n";
        let result = extract(&make_doc("docs/garden.md", content)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn id_defaults_for_shallow_paths() {
        assert_eq!(derive_id("note.md").0, "aku://aiq/general/note/v1.0");
        assert_eq!(derive_id("core/note.md").0, "aku://core/general/note/v1.0");
        assert_eq!(
            derive_id("core/patterns/My Note.md").0,
            "aku://core/patterns/my-note/v1.0"
        );
    }

    #[test]
    fn capabilities_from_prefix_lines() {
        let content = "\
---
type: capability
---
Inputs: raw documents, scan config
Output: typed units
";
        let unit = extract(&make_doc("docs/io.md", content)).unwrap().unwrap();
        assert_eq!(
            unit.capabilities.input,
            ["raw documents, scan config"]
        );
        assert_eq!(unit.capabilities.output, ["typed units"]);
        assert!((unit.capabilities.reliability - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn dependencies_split_on_commas() {
        let content = "---\ntype: capability\n---\nThis depends on the scanner, the parser, and the store.\n";
        let unit = extract(&make_doc("docs/deps.md", content)).unwrap().unwrap();
        assert_eq!(
            unit.dependencies,
            ["the scanner", "the parser", "and the store"]
        );
    }

    #[test]
    fn implementations_substitute_extension() {
        let content = "---\ntype: pattern\n---\n```rust\nfn f() {}\n```\n\n```\nplain\n```\n";
        let unit = extract(&make_doc("core/patterns/retry.md", content))
            .unwrap()
            .unwrap();
        assert_eq!(unit.implementations.len(), 2);
        assert_eq!(unit.implementations[0].language, "rust");
        assert_eq!(
            unit.implementations[0].source_path,
            "core/patterns/retry.rust"
        );
        assert_eq!(unit.implementations[0].test_path, "tests/retry_test.rust");
        assert_eq!(unit.implementations[1].language, "text");
    }

    #[test]
    fn malformed_front_matter_degrades_gracefully() {
        let content = "---\ntitle: [broken\n---\nThe capability described here has a body paragraph.\n";
        let unit = extract(&make_doc("docs/broken.md", content))
            .unwrap()
            .expect("still classified from body text");
        // No declared title survives the failed parse; the first heading is
        // absent too, so the filename fallback applies.
        assert_eq!(unit.title.as_deref(), Some("broken"));
        assert_eq!(unit.unit_type, UnitType::Capability);
    }

    #[test]
    fn batch_isolates_unreadable_files() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("good.md");
        std::fs::write(&good, "---\ntype: knowledge\n---\nGood body.\n").unwrap();

        let descriptors = vec![
            DocumentDescriptor {
                absolute_path: good,
                relative_path: "good.md".into(),
                size_bytes: 10,
                modified: Utc::now(),
                topic: TopicClass::Other,
            },
            DocumentDescriptor {
                absolute_path: tmp.path().join("missing.md"),
                relative_path: "missing.md".into(),
                size_bytes: 0,
                modified: Utc::now(),
                topic: TopicClass::Other,
            },
        ];

        let (units, issues) = extract_batch(&descriptors);
        assert_eq!(units.len(), 1);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].file, "missing.md");
        assert_eq!(issues[0].kind, IssueKind::FileAnalysisError);
    }

    #[test]
    fn declared_timestamps_are_kept() {
        let content = "---\ntype: knowledge\ncreated: 2024-03-01\nupdated: 2024-06-15T12:00:00Z\nauthor: avery\n---\nBody.\n";
        let unit = extract(&make_doc("docs/meta.md", content)).unwrap().unwrap();
        assert_eq!(unit.metadata.created.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert_eq!(unit.metadata.updated.to_rfc3339(), "2024-06-15T12:00:00+00:00");
        assert_eq!(unit.metadata.author.as_deref(), Some("avery"));
    }
}
