//! Aggregation and completion metrics for one extraction run.
//!
//! Consumes the full set of extracted units, validates raw relationship
//! references against the known-unit set, computes per-unit / per-category /
//! per-node completion percentages, and produces prioritized recommendations.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use akuforge_shared::{
    AnalysisIssue, CompletionMap, KnowledgeUnit, RELATIONSHIP_KINDS, RelationshipEdge,
    RelationshipMap, UnitId,
};

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Recommendation classes, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    LowCompletion,
    MissingRelationships,
    MissingImplementations,
}

/// One prioritized recommendation with the units it affects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub message: String,
    pub unit_ids: Vec<UnitId>,
}

/// Aggregate result of one analysis run.
#[derive(Debug, Clone)]
pub struct ContentAnalysis {
    /// Units with relationship lists rewritten to validated target ids.
    pub units: Vec<KnowledgeUnit>,
    /// Validated relationship edges.
    pub edges: Vec<RelationshipEdge>,
    /// Per-file issues carried over from extraction.
    pub issues: Vec<AnalysisIssue>,
    /// Mean completion across all units, 0 for an empty run.
    pub overall_completion: u32,
    pub completion_by_category: CompletionMap,
    pub completion_by_node: CompletionMap,
    pub recommendations: Vec<Recommendation>,
    /// Raw references that matched no known unit.
    pub dropped_references: usize,
    /// Ids extracted from more than one source document.
    pub duplicate_ids: Vec<UnitId>,
}

/// Serializable summary slice of an analysis, embedded in plan/report artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_units: usize,
    pub total_edges: usize,
    pub total_issues: usize,
    pub overall_completion: u32,
    pub completion_by_category: CompletionMap,
    pub completion_by_node: CompletionMap,
    pub dropped_references: usize,
    pub duplicate_ids: Vec<UnitId>,
}

impl ContentAnalysis {
    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            total_units: self.units.len(),
            total_edges: self.edges.len(),
            total_issues: self.issues.len(),
            overall_completion: self.overall_completion,
            completion_by_category: self.completion_by_category.clone(),
            completion_by_node: self.completion_by_node.clone(),
            dropped_references: self.dropped_references,
            duplicate_ids: self.duplicate_ids.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Aggregate one run's extracted units into validated relationships, completion
/// metrics, and recommendations.
#[instrument(skip_all, fields(units = units.len(), issues = issues.len()))]
pub fn aggregate(mut units: Vec<KnowledgeUnit>, issues: Vec<AnalysisIssue>) -> ContentAnalysis {
    let (edges, dropped_references) = validate_relationships(&mut units);

    let overall_completion = mean_completion(units.iter().map(|u| u.completion));
    let completion_by_category = rollup(&units, |u| u.id.category().to_string());
    let completion_by_node = rollup(&units, |u| u.id.namespace().to_string());
    let recommendations = build_recommendations(&units);
    let duplicate_ids = find_duplicate_ids(&units);

    debug!(
        edges = edges.len(),
        dropped = dropped_references,
        overall = overall_completion,
        "aggregation complete"
    );

    ContentAnalysis {
        units,
        edges,
        issues,
        overall_completion,
        completion_by_category,
        completion_by_node,
        recommendations,
        dropped_references,
        duplicate_ids,
    }
}

/// Promote raw references to validated edges and rewrite each unit's
/// relationship lists to the matched target ids.
///
/// A reference is kept only when it case-insensitively substring-matches the
/// id or title of a known unit other than its source. Unmatched references are
/// dropped without error, but counted.
fn validate_relationships(units: &mut [KnowledgeUnit]) -> (Vec<RelationshipEdge>, usize) {
    // Snapshot of the known-unit set, taken before any rewrite.
    let known: Vec<(UnitId, String, Option<String>)> = units
        .iter()
        .map(|u| {
            (
                u.id.clone(),
                u.id.0.to_lowercase(),
                u.title.as_ref().map(|t| t.to_lowercase()),
            )
        })
        .collect();

    let mut edges = Vec::new();
    let mut dropped = 0;

    for (index, unit) in units.iter_mut().enumerate() {
        let mut validated = RelationshipMap::default();

        for kind in RELATIONSHIP_KINDS {
            let mut seen: HashSet<UnitId> = HashSet::new();
            for reference in unit.relationships.get(kind) {
                let needle = reference.to_lowercase();
                let target = known
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != index)
                    .find(|(_, (_, id_lc, title_lc))| {
                        id_lc.contains(&needle)
                            || title_lc.as_ref().is_some_and(|t| {
                                t.contains(&needle) || needle.contains(t.as_str())
                            })
                    })
                    .map(|(_, (id, _, _))| id.clone());

                match target {
                    Some(target_id) if seen.insert(target_id.clone()) => {
                        validated.get_mut(kind).push(target_id.0.clone());
                        edges.push(RelationshipEdge {
                            kind,
                            source_id: unit.id.clone(),
                            target_id,
                        });
                    }
                    Some(_) => {} // already matched this target for this kind
                    None => dropped += 1,
                }
            }
        }

        unit.relationships = validated;
    }

    (edges, dropped)
}

/// Mean of an iterator of completion scores, rounded; exactly 0 when empty.
fn mean_completion(scores: impl Iterator<Item = u8>) -> u32 {
    let (sum, count) = scores.fold((0u64, 0u64), |(s, c), v| (s + u64::from(v), c + 1));
    if count == 0 {
        return 0;
    }
    ((sum as f64 / count as f64).round()) as u32
}

/// Mean completion per key group, rounded to the nearest integer.
fn rollup(units: &[KnowledgeUnit], key: impl Fn(&KnowledgeUnit) -> String) -> CompletionMap {
    let mut groups: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    for unit in units {
        groups.entry(key(unit)).or_default().push(unit.completion);
    }
    groups
        .into_iter()
        .map(|(k, scores)| (k, mean_completion(scores.into_iter())))
        .collect()
}

/// Emit the ordered recommendation list; a class with no affected units is
/// omitted entirely.
fn build_recommendations(units: &[KnowledgeUnit]) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    let low: Vec<UnitId> = units
        .iter()
        .filter(|u| u.completion < 50)
        .map(|u| u.id.clone())
        .collect();
    if !low.is_empty() {
        recommendations.push(Recommendation {
            kind: RecommendationKind::LowCompletion,
            message: format!("{} unit(s) are below 50% completion", low.len()),
            unit_ids: low,
        });
    }

    let unlinked: Vec<UnitId> = units
        .iter()
        .filter(|u| u.relationships.requires.is_empty() && u.relationships.composes.is_empty())
        .map(|u| u.id.clone())
        .collect();
    if !unlinked.is_empty() {
        recommendations.push(Recommendation {
            kind: RecommendationKind::MissingRelationships,
            message: format!(
                "{} unit(s) declare no requires/composes relationships",
                unlinked.len()
            ),
            unit_ids: unlinked,
        });
    }

    let unimplemented: Vec<UnitId> = units
        .iter()
        .filter(|u| u.implementations.is_empty())
        .map(|u| u.id.clone())
        .collect();
    if !unimplemented.is_empty() {
        recommendations.push(Recommendation {
            kind: RecommendationKind::MissingImplementations,
            message: format!(
                "{} unit(s) have no embedded implementation fragments",
                unimplemented.len()
            ),
            unit_ids: unimplemented,
        });
    }

    recommendations
}

/// Ids produced by more than one source document.
fn find_duplicate_ids(units: &[KnowledgeUnit]) -> Vec<UnitId> {
    let mut counts: BTreeMap<&UnitId, usize> = BTreeMap::new();
    for unit in units {
        *counts.entry(&unit.id).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id.clone())
        .collect()
}
