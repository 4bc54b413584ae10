use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::harvest::{CandidateIdentifier, SourceTag};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedDuplicate {
    pub identifier: String,
    pub kept: SourceTag,
    pub dropped: SourceTag,
}

#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// Survivors, highest source priority first. Equal priorities keep input order.
    pub unique: Vec<CandidateIdentifier>,
    pub duplicates: Vec<DroppedDuplicate>,
}

/// Collapses a batch to one candidate per identifier, keeping the one from
/// the highest-priority source.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchDeduplicator;

impl BatchDeduplicator {
    pub fn new() -> Self {
        Self
    }

    pub fn dedup(&self, candidates: Vec<CandidateIdentifier>) -> DedupOutcome {
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut unique: Vec<CandidateIdentifier> = Vec::with_capacity(candidates.len());
        let mut duplicates = Vec::new();

        for candidate in candidates {
            let Some(&slot) = slots.get(&candidate.identifier) else {
                slots.insert(candidate.identifier.clone(), unique.len());
                unique.push(candidate);
                continue;
            };

            let existing = &mut unique[slot];
            let (kept, dropped) = if candidate.source.priority() > existing.source.priority() {
                let mut replaced = std::mem::replace(existing, candidate);
                existing.merged_from.push(replaced.source);
                existing.merged_from.append(&mut replaced.merged_from);
                (existing.source, replaced.source)
            } else {
                existing.merged_from.push(candidate.source);
                existing.merged_from.extend(candidate.merged_from);
                (existing.source, candidate.source)
            };
            warn!(identifier = %existing.identifier, %kept, %dropped, "duplicate candidate");
            duplicates.push(DroppedDuplicate {
                identifier: existing.identifier.clone(),
                kept,
                dropped,
            });
        }

        // stable: equal priorities stay in first-seen order
        unique.sort_by_key(|c| std::cmp::Reverse(c.source.priority()));
        DedupOutcome { unique, duplicates }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, source: SourceTag) -> CandidateIdentifier {
        CandidateIdentifier::new(id, source).unwrap()
    }

    #[test]
    fn higher_priority_source_survives_regardless_of_order() {
        let forward = BatchDeduplicator::new().dedup(vec![
            candidate("10.1101/x", SourceTag::Biorxiv),
            candidate("10.1101/X", SourceTag::Crossref),
        ]);
        let backward = BatchDeduplicator::new().dedup(vec![
            candidate("10.1101/x", SourceTag::Crossref),
            candidate("10.1101/x", SourceTag::Biorxiv),
        ]);

        for outcome in [forward, backward] {
            assert_eq!(outcome.unique.len(), 1);
            assert_eq!(outcome.unique[0].source, SourceTag::Crossref);
            assert_eq!(outcome.unique[0].merged_from, vec![SourceTag::Biorxiv]);
            assert_eq!(
                outcome.duplicates,
                vec![DroppedDuplicate {
                    identifier: "10.1101/x".to_string(),
                    kept: SourceTag::Crossref,
                    dropped: SourceTag::Biorxiv,
                }]
            );
        }
    }

    #[test]
    fn survivors_are_ordered_by_priority_then_input() {
        let outcome = BatchDeduplicator::new().dedup(vec![
            candidate("10.1/a", SourceTag::File),
            candidate("10.1/b", SourceTag::Crossref),
            candidate("10.1/c", SourceTag::File),
            candidate("10.1/d", SourceTag::Departmental),
        ]);
        let ids: Vec<_> = outcome.unique.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(ids, vec!["10.1/b", "10.1/d", "10.1/a", "10.1/c"]);
        assert!(outcome.duplicates.is_empty());
    }

    #[test]
    fn collapsed_sources_are_remembered_on_the_survivor() {
        let outcome = BatchDeduplicator::new().dedup(vec![
            candidate("10.25378/janelia.1", SourceTag::Departmental),
            candidate("10.25378/janelia.1", SourceTag::Stored),
            candidate("10.25378/janelia.1", SourceTag::Crossref),
        ]);
        let survivor = &outcome.unique[0];
        assert_eq!(survivor.source, SourceTag::Crossref);
        let sources: Vec<_> = survivor.sources().collect();
        assert_eq!(
            sources,
            vec![SourceTag::Crossref, SourceTag::Departmental, SourceTag::Stored]
        );
        assert_eq!(outcome.duplicates.len(), 2);
    }

    #[test]
    fn same_source_twice_counts_one_duplicate() {
        let outcome = BatchDeduplicator::new().dedup(vec![
            candidate("10.1/a", SourceTag::File),
            candidate("doi:10.1/a", SourceTag::File),
        ]);
        assert_eq!(outcome.unique.len(), 1);
        assert_eq!(outcome.duplicates.len(), 1);
    }
}
