//! Preprint → primary-publication matching.
//!
//! Declared registry relations are taken as-is. Everything else is paired by
//! fuzzy comparison of a composite key (first author surname, last author
//! surname, title) with a greedy one-to-one assignment.

pub mod similarity;
pub mod unloaded;

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use pubscope_core::config::MatcherConfig;
use pubscope_core::{Author, CanonicalRecord, EdgeOrigin, RelationEdge, RelationKind};
use serde::Serialize;
use tracing::{debug, info};

pub use similarity::{normalize, token_set_ratio};
pub use unloaded::{UnloadedRelation, find_unloaded_relations, unloaded_identifier_lines};

/// Confidence recorded on edges the registry itself declares.
pub const DECLARED_CONFIDENCE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Borderline,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditReason {
    /// Scored just under the threshold.
    Borderline,
    /// Above the threshold, but one side was already taken by a better pair.
    Demoted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidatePair {
    pub preprint: String,
    pub primary: String,
    pub score: f64,
    pub title_score: f64,
    pub first_author_score: f64,
    pub last_author_score: f64,
    pub reason: AuditReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchAudit {
    pub pairs: Vec<CandidatePair>,
    pub unmatched_preprints: Vec<String>,
    pub unmatched_primaries: Vec<String>,
    /// Declared relation targets that are not among the compared records.
    pub declared_outside: Vec<String>,
}

impl MatchAudit {
    pub fn count(&self, reason: AuditReason) -> usize {
        self.pairs.iter().filter(|p| p.reason == reason).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Sorted by (preprint, primary).
    pub edges: Vec<RelationEdge>,
    pub audit: MatchAudit,
    pub comparisons: usize,
}

impl MatchOutcome {
    pub fn count(&self, origin: EdgeOrigin) -> usize {
        self.edges.iter().filter(|e| e.origin == origin).count()
    }
}

struct Keyed<'a> {
    record: &'a CanonicalRecord,
    key: String,
}

impl<'a> Keyed<'a> {
    fn new(record: &'a CanonicalRecord) -> Self {
        Self {
            record,
            key: normalize(&composite_key(record)),
        }
    }

    fn id(&self) -> &'a str {
        &self.record.identifier
    }
}

struct Scored<'a> {
    preprint: &'a Keyed<'a>,
    primary: &'a Keyed<'a>,
    score: f64,
}

/// Descending score; ties go to the lower (preprint, primary) identifiers.
fn best_first(a: &Scored<'_>, b: &Scored<'_>) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.preprint.id().cmp(b.preprint.id()))
        .then_with(|| a.primary.id().cmp(b.primary.id()))
}

fn surname(author: Option<&Author>) -> &str {
    author.map(Author::surname_key).unwrap_or_default()
}

/// `first-surname last-surname title`, before normalization.
pub fn composite_key(record: &CanonicalRecord) -> String {
    let first = surname(record.first_author());
    let last = surname(record.last_author());
    format!("{first} {last} {}", record.title)
}

#[derive(Debug, Clone, Copy)]
pub struct PreprintMatcher {
    threshold: f64,
    audit_margin: f64,
}

impl Default for PreprintMatcher {
    fn default() -> Self {
        Self::from_config(&MatcherConfig::default())
    }
}

impl PreprintMatcher {
    pub fn new(threshold: u8, audit_margin: u8) -> Self {
        Self {
            threshold: f64::from(threshold.min(100)),
            audit_margin: f64::from(audit_margin),
        }
    }

    pub fn from_config(config: &MatcherConfig) -> Self {
        Self::new(config.threshold, config.audit_margin)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Inclusive at the threshold.
    pub fn classify(&self, score: f64) -> Verdict {
        if score >= self.threshold {
            Verdict::Accept
        } else if score >= self.threshold - self.audit_margin {
            Verdict::Borderline
        } else {
            Verdict::Reject
        }
    }

    pub fn match_all(
        &self,
        preprints: &[CanonicalRecord],
        primaries: &[CanonicalRecord],
    ) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        let (declared, outside) = declared_pairs(preprints, primaries);
        outcome.audit.declared_outside = outside;

        let mut paired: HashSet<&str> = HashSet::new();
        for (preprint, primary) in &declared {
            paired.insert(*preprint);
            paired.insert(*primary);
            outcome.edges.push(RelationEdge::preprint_of(
                *preprint,
                *primary,
                DECLARED_CONFIDENCE,
                EdgeOrigin::Declared,
            ));
        }

        let open_preprints: Vec<Keyed> = preprints
            .iter()
            .filter(|r| !paired.contains(r.identifier.as_str()))
            .map(Keyed::new)
            .collect();
        let open_primaries: Vec<Keyed> = primaries
            .iter()
            .filter(|r| !paired.contains(r.identifier.as_str()))
            .map(Keyed::new)
            .collect();

        let mut accepted = Vec::new();
        let mut borderline = Vec::new();
        for preprint in &open_preprints {
            for primary in &open_primaries {
                outcome.comparisons += 1;
                let score = token_set_ratio(&preprint.key, &primary.key);
                let scored = Scored {
                    preprint,
                    primary,
                    score,
                };
                match self.classify(score) {
                    Verdict::Accept => accepted.push(scored),
                    Verdict::Borderline => borderline.push(scored),
                    Verdict::Reject => {}
                }
            }
        }

        // Greedy one-to-one assignment.
        accepted.sort_by(best_first);
        let mut used: HashSet<&str> = HashSet::new();
        for scored in &accepted {
            let (p, r) = (scored.preprint.id(), scored.primary.id());
            if used.contains(p) || used.contains(r) {
                debug!(preprint = p, primary = r, score = scored.score, "demoted");
                outcome.audit.pairs.push(audit_entry(scored, AuditReason::Demoted));
                continue;
            }
            used.insert(p);
            used.insert(r);
            outcome.edges.push(RelationEdge::preprint_of(
                p,
                r,
                scored.score,
                EdgeOrigin::Matched,
            ));
        }

        borderline.sort_by(best_first);
        outcome.audit.pairs.extend(
            borderline
                .iter()
                .map(|scored| audit_entry(scored, AuditReason::Borderline)),
        );

        outcome.audit.unmatched_preprints = unmatched(&open_preprints, &used);
        outcome.audit.unmatched_primaries = unmatched(&open_primaries, &used);
        outcome.edges.sort_by(|a, b| {
            a.identifier_a
                .cmp(&b.identifier_a)
                .then_with(|| a.identifier_b.cmp(&b.identifier_b))
        });

        info!(
            preprints = preprints.len(),
            primaries = primaries.len(),
            comparisons = outcome.comparisons,
            declared = outcome.count(EdgeOrigin::Declared),
            matched = outcome.count(EdgeOrigin::Matched),
            audited = outcome.audit.pairs.len(),
            "matching complete"
        );
        outcome
    }
}

/// Declared (preprint, primary) pairs among the compared records, plus the
/// declared targets that fall outside them.
fn declared_pairs<'a>(
    preprints: &'a [CanonicalRecord],
    primaries: &'a [CanonicalRecord],
) -> (BTreeSet<(&'a str, &'a str)>, Vec<String>) {
    let preprint_ids: HashSet<&str> = preprints.iter().map(|r| r.identifier.as_str()).collect();
    let primary_ids: HashSet<&str> = primaries.iter().map(|r| r.identifier.as_str()).collect();

    let mut pairs = BTreeSet::new();
    let mut outside = BTreeSet::new();
    for primary in primaries {
        for target in primary.declared(RelationKind::HasPreprint) {
            match preprint_ids.get(target) {
                Some(preprint) => {
                    pairs.insert((*preprint, primary.identifier.as_str()));
                }
                None => {
                    outside.insert(target.to_string());
                }
            }
        }
    }
    for preprint in preprints {
        for target in preprint.declared(RelationKind::IsPreprintOf) {
            match primary_ids.get(target) {
                Some(primary) => {
                    pairs.insert((preprint.identifier.as_str(), *primary));
                }
                None => {
                    outside.insert(target.to_string());
                }
            }
        }
    }
    (pairs, outside.into_iter().collect())
}

fn audit_entry(scored: &Scored<'_>, reason: AuditReason) -> CandidatePair {
    let (p, r) = (scored.preprint.record, scored.primary.record);
    CandidatePair {
        preprint: p.identifier.clone(),
        primary: r.identifier.clone(),
        score: scored.score,
        title_score: token_set_ratio(&p.title, &r.title),
        first_author_score: token_set_ratio(surname(p.first_author()), surname(r.first_author())),
        last_author_score: token_set_ratio(surname(p.last_author()), surname(r.last_author())),
        reason,
    }
}

fn unmatched(records: &[Keyed<'_>], used: &HashSet<&str>) -> Vec<String> {
    let mut ids: Vec<String> = records
        .iter()
        .map(Keyed::id)
        .filter(|id| !used.contains(id))
        .map(str::to_string)
        .collect();
    ids.sort();
    ids
}
