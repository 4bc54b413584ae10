use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use pubscope_core::CanonicalRecord;
use pubscope_core::config::InstitutionConfig;
use tracing::{debug, info};

use crate::error::{Result, ScienceError};
use crate::harvest::{CandidateIdentifier, SourceTag};
use crate::harvest::file::identifier_lines;
use crate::registry::bare_orcid;

/// Lookup of people known to belong to the institution.
pub trait IdentityStore: Send + Sync {
    fn is_affiliated(&self, orcid: &str) -> bool;
}

/// ORCIDs loaded from a line-delimited roster.
#[derive(Debug, Clone, Default)]
pub struct OrcidRoster {
    orcids: HashSet<String>,
}

impl OrcidRoster {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let roster: Self = identifier_lines(&contents).collect();
        info!(path = %path.display(), count = roster.len(), "loaded identity roster");
        Ok(roster)
    }

    pub fn len(&self) -> usize {
        self.orcids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orcids.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for OrcidRoster {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            orcids: iter
                .into_iter()
                .filter_map(|o| bare_orcid(o.as_ref()))
                .collect(),
        }
    }
}

impl IdentityStore for OrcidRoster {
    fn is_affiliated(&self, orcid: &str) -> bool {
        bare_orcid(orcid).is_some_and(|o| self.orcids.contains(&o))
    }
}

/// Decides whether a resolved record belongs to the institution.
pub struct EligibilityFilter {
    institution: String,
    identities: Arc<dyn IdentityStore>,
    exempt: HashSet<SourceTag>,
}

impl EligibilityFilter {
    pub fn new(institution: &str, identities: Arc<dyn IdentityStore>) -> Self {
        Self {
            institution: institution.trim().to_lowercase(),
            identities,
            exempt: HashSet::from([SourceTag::Stored]),
        }
    }

    pub fn exempting(mut self, source: SourceTag) -> Self {
        self.exempt.insert(source);
        self
    }

    pub fn from_config(config: &InstitutionConfig) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(ScienceError::Configuration(
                "institution name must be set".to_string(),
            ));
        }
        let roster = match &config.identity_file {
            Some(path) => OrcidRoster::from_file(Path::new(path))?,
            None => OrcidRoster::default(),
        };
        let filter = Self::new(&config.name, Arc::new(roster));
        Ok(match config.exempt_source.trim() {
            "" => filter,
            name => filter.exempting(name.parse()?),
        })
    }

    pub fn is_exempt(&self, source: SourceTag) -> bool {
        self.exempt.contains(&source)
    }

    /// Eligibility for a deduplicated candidate: exempt when any source that
    /// proposed the identifier is exempt, even if a higher-priority source
    /// won the merge.
    pub fn admits(&self, record: &CanonicalRecord, candidate: &CandidateIdentifier) -> bool {
        candidate.sources().any(|source| self.is_exempt(source))
            || self.is_eligible(record, candidate.source)
    }

    pub fn is_eligible(&self, record: &CanonicalRecord, source: SourceTag) -> bool {
        if self.is_exempt(source) {
            return true;
        }

        let eligible = record.authors.iter().any(|author| {
            author
                .affiliations
                .iter()
                .any(|aff| aff.to_lowercase().contains(&self.institution))
                || author
                    .orcid
                    .as_deref()
                    .is_some_and(|orcid| self.identities.is_affiliated(orcid))
        });
        if !eligible {
            debug!(identifier = %record.identifier, %source, "no institution author");
        }
        eligible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pubscope_core::{Author, Registry, WorkType};
    use tempfile::NamedTempFile;

    fn record(authors: Vec<Author>) -> CanonicalRecord {
        CanonicalRecord::new("10.1/x", "T", Registry::Crossref, Utc::now(), WorkType::Primary)
            .with_authors(authors)
    }

    fn filter() -> EligibilityFilter {
        let roster: OrcidRoster = ["0000-0001-0000-0001"].into_iter().collect();
        EligibilityFilter::new("Janelia", Arc::new(roster)).exempting(SourceTag::Departmental)
    }

    #[test]
    fn affiliation_substring_is_case_insensitive() {
        let r = record(vec![Author::new("A").with_affiliation("HHMI JANELIA Research Campus")]);
        assert!(filter().is_eligible(&r, SourceTag::Crossref));
    }

    #[test]
    fn roster_orcid_makes_record_eligible() {
        let r = record(vec![
            Author::new("A").with_orcid("https://orcid.org/0000-0001-0000-0001"),
        ]);
        assert!(filter().is_eligible(&r, SourceTag::Biorxiv));
    }

    #[test]
    fn unrelated_record_is_ineligible() {
        let r = record(vec![
            Author::new("B")
                .with_affiliation("Elsewhere University")
                .with_orcid("0000-0009-9999-9999"),
        ]);
        assert!(!filter().is_eligible(&r, SourceTag::Arxiv));
    }

    #[test]
    fn exempt_sources_skip_the_check() {
        let r = record(vec![]);
        assert!(filter().is_eligible(&r, SourceTag::Departmental));
        assert!(filter().is_eligible(&r, SourceTag::Stored));
        assert!(!filter().is_eligible(&r, SourceTag::File));
    }

    #[test]
    fn exemption_survives_a_merge_with_a_registry_candidate() {
        let r = record(vec![Author::new("B").with_affiliation("Elsewhere University")]);
        let mut merged = CandidateIdentifier::new("10.1/x", SourceTag::Crossref).unwrap();
        assert!(!filter().admits(&r, &merged));

        merged.merged_from.push(SourceTag::Departmental);
        assert!(filter().admits(&r, &merged));
    }

    #[test]
    fn from_config_loads_roster_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "# staff\nhttps://orcid.org/0000-0002-0000-0002\n").unwrap();
        let config = InstitutionConfig {
            name: "Janelia".to_string(),
            identity_file: Some(file.path().to_string_lossy().to_string()),
            exempt_source: "departmental".to_string(),
        };

        let filter = EligibilityFilter::from_config(&config).unwrap();
        let r = record(vec![Author::new("C").with_orcid("0000-0002-0000-0002")]);
        assert!(filter.is_eligible(&r, SourceTag::Crossref));
        assert!(filter.is_exempt(SourceTag::Departmental));
    }

    #[test]
    fn from_config_rejects_unknown_exempt_source() {
        let config = InstitutionConfig {
            name: "Janelia".to_string(),
            identity_file: None,
            exempt_source: "pubmed".to_string(),
        };
        assert!(EligibilityFilter::from_config(&config).is_err());
    }
}
