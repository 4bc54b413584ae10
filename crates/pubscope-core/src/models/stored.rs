use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::record::{CanonicalRecord, WorkType};

/// Institution-owned fields. A registry refresh never touches these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub curated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newsletter: Option<NaiveDate>,
    /// Institution people identifiers attributed to this work.
    #[serde(default)]
    pub derived_authors: Vec<String>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && !self.curated
            && self.newsletter.is_none()
            && self.derived_authors.is_empty()
    }
}

/// The persisted document: latest registry snapshot plus enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub metadata: CanonicalRecord,

    #[serde(default)]
    pub enrichment: Enrichment,

    /// Harvest source that first brought the identifier in.
    pub source: String,

    pub first_seen: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn new(metadata: CanonicalRecord, source: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            metadata,
            enrichment: Enrichment::default(),
            source: source.into(),
            first_seen: now,
            updated_at: now,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.metadata.identifier
    }

    pub fn work_type(&self) -> WorkType {
        self.metadata.work_type
    }

    /// Timestamp used for change detection.
    pub fn stored_last_modified(&self) -> DateTime<Utc> {
        self.metadata.registry_last_modified
    }

    /// True when `fresh` carries a strictly newer registry timestamp.
    pub fn is_stale_against(&self, fresh: &CanonicalRecord) -> bool {
        fresh.registry_last_modified > self.stored_last_modified()
    }

    /// Replaces the registry-owned snapshot, leaving enrichment and provenance alone.
    /// Returns false (and changes nothing) unless `fresh` is strictly newer.
    pub fn apply_refresh(&mut self, fresh: CanonicalRecord) -> bool {
        if !self.is_stale_against(&fresh) {
            return false;
        }
        self.metadata = fresh;
        self.updated_at = Utc::now();
        true
    }
}
