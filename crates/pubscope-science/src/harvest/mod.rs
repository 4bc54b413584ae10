//! Candidate harvesters. Each source yields identifiers to reconcile; none of
//! them writes to the store.

pub mod arxiv;
pub mod biorxiv;
pub mod crossref;
pub mod datacite;
pub mod departmental;
pub mod file;
pub mod openalex;
pub mod stored;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pubscope_core::Registry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ScienceError};
use crate::identifiers::doi;

pub use arxiv::ArxivHarvester;
pub use biorxiv::BiorxivHarvester;
pub use crossref::CrossrefHarvester;
pub use datacite::DataCiteHarvester;
pub use departmental::DepartmentalHarvester;
pub use file::FileHarvester;
pub use openalex::OpenAlexHarvester;
pub use stored::StoredHarvester;

/// Where a candidate came from. Higher `priority()` wins when the same
/// identifier shows up more than once in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum SourceTag {
    File = 20,
    Manual = 25,
    Stored = 30,
    Arxiv = 40,
    Biorxiv = 45,
    OpenAlex = 60,
    Departmental = 70,
    DataCite = 85,
    Crossref = 90,
}

impl SourceTag {
    pub const ALL: [SourceTag; 9] = [
        Self::Crossref,
        Self::DataCite,
        Self::Departmental,
        Self::OpenAlex,
        Self::Biorxiv,
        Self::Arxiv,
        Self::Stored,
        Self::Manual,
        Self::File,
    ];

    pub fn priority(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Manual => "manual",
            Self::Stored => "stored",
            Self::Arxiv => "arxiv",
            Self::Biorxiv => "biorxiv",
            Self::OpenAlex => "openalex",
            Self::Departmental => "departmental",
            Self::DataCite => "datacite",
            Self::Crossref => "crossref",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceTag {
    type Err = ScienceError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str() == wanted)
            .ok_or_else(|| ScienceError::Configuration(format!("unknown source: {s}")))
    }
}

/// Full registry record a bulk harvester already holds for a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Prefetched {
    pub registry: Registry,
    pub payload: Value,
}

/// An identifier proposed for reconciliation. Normalized on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateIdentifier {
    pub identifier: String,
    pub source: SourceTag,
    pub discovered_at: DateTime<Utc>,
    pub prefetched: Option<Prefetched>,
    /// Sources whose duplicates of this identifier were collapsed into it.
    pub merged_from: Vec<SourceTag>,
}

impl CandidateIdentifier {
    pub fn new(raw: &str, source: SourceTag) -> Result<Self> {
        Ok(Self {
            identifier: doi::normalize(raw)?,
            source,
            discovered_at: Utc::now(),
            prefetched: None,
            merged_from: Vec::new(),
        })
    }

    pub fn with_prefetched(mut self, prefetched: Prefetched) -> Self {
        self.prefetched = Some(prefetched);
        self
    }

    /// Every source that proposed this identifier, the surviving one first.
    pub fn sources(&self) -> impl Iterator<Item = SourceTag> + '_ {
        std::iter::once(self.source).chain(self.merged_from.iter().copied())
    }
}

#[async_trait]
pub trait Harvester: Send + Sync {
    fn source(&self) -> SourceTag;

    async fn fetch_candidates(&self) -> Result<Vec<CandidateIdentifier>>;
}

/// Builds candidates from raw identifiers, dropping (and logging) the ones
/// that do not parse.
pub(crate) fn candidates_from<I, S>(raw: I, source: SourceTag) -> Vec<CandidateIdentifier>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|id| match CandidateIdentifier::new(id.as_ref(), source) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                tracing::warn!(source = %source, error = %e, "skipping identifier");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registries_outrank_preprint_servers() {
        assert!(SourceTag::Crossref.priority() > SourceTag::DataCite.priority());
        assert!(SourceTag::DataCite.priority() > SourceTag::Departmental.priority());
        assert!(SourceTag::Departmental.priority() > SourceTag::OpenAlex.priority());
        assert!(SourceTag::OpenAlex.priority() > SourceTag::Biorxiv.priority());
        assert!(SourceTag::Arxiv.priority() > SourceTag::File.priority());
    }

    #[test]
    fn source_tags_parse_by_name() {
        for tag in SourceTag::ALL {
            assert_eq!(tag.as_str().parse::<SourceTag>().unwrap(), tag);
        }
        assert_eq!("OpenAlex".parse::<SourceTag>().unwrap(), SourceTag::OpenAlex);
        assert!("pubmed".parse::<SourceTag>().is_err());
    }

    #[test]
    fn candidates_are_normalized() {
        let c = CandidateIdentifier::new("https://doi.org/10.1101/2024.01.01.ABC", SourceTag::File)
            .unwrap();
        assert_eq!(c.identifier, "10.1101/2024.01.01.abc");
        assert!(c.prefetched.is_none());
    }

    #[test]
    fn unparsable_identifiers_are_dropped() {
        let candidates = candidates_from(["10.1/a", "in prep", "doi:10.1/B"], SourceTag::File);
        let ids: Vec<_> = candidates.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(ids, vec!["10.1/a", "10.1/b"]);
    }
}
