use std::collections::HashSet;

use pubscope_core::{RelationKind, StoredRecord};
use serde::Serialize;

/// A declared relation whose target is not in the store yet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnloadedRelation {
    pub target: String,
    pub declared_by: String,
    pub kind: RelationKind,
}

/// Declared preprint and supplement relations pointing outside the store,
/// sorted by target.
pub fn find_unloaded_relations(records: &[StoredRecord]) -> Vec<UnloadedRelation> {
    let loaded: HashSet<&str> = records.iter().map(StoredRecord::identifier).collect();

    let mut unloaded: Vec<UnloadedRelation> = records
        .iter()
        .flat_map(|record| {
            record.metadata.relations.iter().map(move |rel| (record, rel))
        })
        .filter(|(_, rel)| !loaded.contains(rel.identifier.as_str()))
        .map(|(record, rel)| UnloadedRelation {
            target: rel.identifier.clone(),
            declared_by: record.identifier().to_string(),
            kind: rel.kind,
        })
        .collect();
    unloaded.sort();
    unloaded.dedup();
    unloaded
}

/// Unique targets, one per line, ready to feed back as an identifier file.
pub fn unloaded_identifier_lines(unloaded: &[UnloadedRelation]) -> String {
    let mut targets: Vec<&str> = unloaded.iter().map(|u| u.target.as_str()).collect();
    targets.dedup();
    let mut out = targets.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}
