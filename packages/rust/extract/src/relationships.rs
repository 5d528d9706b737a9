//! Relationship phrase extraction.
//!
//! Scans body text for relationship-indicating phrases and collects the
//! trigger-stripped remainder of each match as a raw reference string. This is
//! deliberately high-recall / low-precision: false positives are expected and
//! filtered downstream by the aggregator, never here.

use std::sync::LazyLock;

use regex::Regex;

use akuforge_shared::{RelationshipKind, RelationshipMap};

/// Ordered trigger table: one dedicated phrase regex per relationship kind.
static TRIGGERS: LazyLock<Vec<(RelationshipKind, Regex)>> = LazyLock::new(|| {
    let trigger = |kind: RelationshipKind, pattern: &str| {
        (kind, Regex::new(pattern).expect("trigger regex"))
    };
    vec![
        trigger(
            RelationshipKind::Requires,
            r"(?i)(?:depends\s+on|requires?|needs?)\s+([^.\n]+)",
        ),
        trigger(
            RelationshipKind::Composes,
            r"(?i)(?:composed\s+of|consists\s+of|contains|includes)\s+([^.\n]+)",
        ),
        trigger(
            RelationshipKind::Enhances,
            r"(?i)(?:enhances|improves|extends)\s+([^.\n]+)",
        ),
        trigger(
            RelationshipKind::Conflicts,
            r"(?i)(?:conflicts\s+with|incompatible\s+with)\s+([^.\n]+)",
        ),
    ]
});

/// Extract raw relationship references from body text.
pub fn extract_relationships(body: &str) -> RelationshipMap {
    let mut map = RelationshipMap::default();

    for (kind, re) in TRIGGERS.iter() {
        let refs = map.get_mut(*kind);
        for caps in re.captures_iter(body) {
            let reference = caps[1].trim();
            if !reference.is_empty() {
                refs.push(reference.to_string());
            }
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_all_four_kinds() {
        let body = "\
This module depends on the message router.
It is composed of three sub-handlers.
It enhances the base dispatcher.
It conflicts with the legacy queue.
";
        let map = extract_relationships(body);
        assert_eq!(map.requires, ["the message router"]);
        assert_eq!(map.composes, ["three sub-handlers"]);
        assert_eq!(map.enhances, ["the base dispatcher"]);
        assert_eq!(map.conflicts, ["the legacy queue"]);
    }

    #[test]
    fn trigger_matching_is_case_insensitive() {
        let map = extract_relationships("REQUIRES stable storage\n");
        assert_eq!(map.requires, ["stable storage"]);
    }

    #[test]
    fn multiple_matches_per_kind() {
        let body = "Needs a scheduler. Also requires a clock source.\n";
        let map = extract_relationships(body);
        assert_eq!(map.requires.len(), 2);
        assert_eq!(map.requires[0], "a scheduler");
        assert_eq!(map.requires[1], "a clock source");
    }

    #[test]
    fn empty_body_yields_empty_map() {
        let map = extract_relationships("");
        assert!(map.is_empty());
    }

    #[test]
    fn false_positives_are_kept() {
        // "includes" in ordinary prose still matches; filtering is the
        // aggregator's job.
        let map = extract_relationships("The appendix includes a glossary\n");
        assert_eq!(map.composes, ["a glossary"]);
    }
}
