//! Document tree scanner.
//!
//! Walks a source directory with `walkdir`, collects descriptors for candidate
//! text files, and classifies subdirectories by topic using an ordered
//! name-pattern rule table. A fresh scan is cheap and always safe to restart;
//! unreadable entries are skipped with a warning, never fatal.

use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use akuforge_shared::{AkuForgeError, DocumentDescriptor, Result, TopicClass};

/// File extensions considered document candidates.
pub const TEXT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

// ---------------------------------------------------------------------------
// Directory topic classification
// ---------------------------------------------------------------------------

/// Ordered classification rules. First match wins.
static TOPIC_RULES: LazyLock<Vec<(Regex, TopicClass)>> = LazyLock::new(|| {
    let rule = |pattern: &str, topic: TopicClass| {
        (Regex::new(pattern).expect("topic rule regex"), topic)
    };
    vec![
        rule(r"(?i)foundation|principle|core", TopicClass::Foundation),
        rule(r"(?i)protocol|interface|api", TopicClass::Protocols),
        rule(r"(?i)node|agent", TopicClass::Nodes),
        rule(r"(?i)module|capabilit|feature", TopicClass::Modules),
        rule(r"(?i)impl|source|src", TopicClass::Implementation),
        rule(r"(?i)deploy|infra|ops", TopicClass::Deployment),
        rule(r"(?i)quality|test|valid", TopicClass::Quality),
        rule(r"(?i)tool|script|util", TopicClass::Tools),
    ]
});

/// Classify a directory base name into a topic.
///
/// Pure function over the ordered rule table; advisory metadata only, it never
/// decides which files get scanned.
pub fn classify_dir(name: &str) -> TopicClass {
    TOPIC_RULES
        .iter()
        .find(|(re, _)| re.is_match(name))
        .map(|(_, topic)| *topic)
        .unwrap_or(TopicClass::Other)
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

/// Scan a document tree and return descriptors for every candidate file.
///
/// Bounded by filesystem contents at call time. Entries that cannot be read
/// (permissions, dangling symlinks) are skipped with a warning.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn scan(root: &Path) -> Result<Vec<DocumentDescriptor>> {
    if !root.is_dir() {
        return Err(AkuForgeError::Scan(format!(
            "source root {} is not a directory",
            root.display()
        )));
    }

    let mut documents = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() || !is_text_candidate(entry.path()) {
            continue;
        }

        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping file without metadata");
                continue;
            }
        };

        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let relative_path = relative_path_of(root, entry.path());
        let topic = entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(classify_dir)
            .unwrap_or_default();

        documents.push(DocumentDescriptor {
            absolute_path: entry.path().to_path_buf(),
            relative_path,
            size_bytes: meta.len(),
            modified,
            topic,
        });
    }

    documents.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    debug!(count = documents.len(), "scan complete");
    Ok(documents)
}

/// Check whether a path carries one of the candidate text extensions.
fn is_text_candidate(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Root-relative path with forward-slash separators.
fn relative_path_of(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
