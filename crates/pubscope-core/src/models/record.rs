use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PubscopeError;

/// Bibliographic registry that owns the authoritative metadata for an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Registry {
    Crossref,
    DataCite,
}

impl Registry {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crossref => "crossref",
            Self::DataCite => "datacite",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Crossref => "Crossref",
            Self::DataCite => "DataCite",
        }
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Registry {
    type Err = PubscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crossref" => Ok(Self::Crossref),
            "datacite" => Ok(Self::DataCite),
            other => Err(PubscopeError::ValidationError(format!(
                "unknown registry: {other}"
            ))),
        }
    }
}

/// Work-type classification used to split the store for preprint matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    /// Peer-reviewed, published work (journal article).
    Primary,
    Preprint,
    Dataset,
    #[default]
    Other,
}

impl WorkType {
    pub fn from_crossref_type(s: &str) -> Self {
        match s {
            "journal-article" => Self::Primary,
            "posted-content" => Self::Preprint,
            "dataset" => Self::Dataset,
            _ => Self::Other,
        }
    }

    pub fn from_datacite_type(resource_type_general: Option<&str>) -> Self {
        match resource_type_general {
            Some("Preprint") | Some("Text") => Self::Preprint,
            Some("JournalArticle") => Self::Primary,
            Some("Dataset") => Self::Dataset,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Preprint => "preprint",
            Self::Dataset => "dataset",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for WorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkType {
    type Err = PubscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Self::Primary),
            "preprint" => Ok(Self::Preprint),
            "dataset" => Ok(Self::Dataset),
            "other" => Ok(Self::Other),
            other => Err(PubscopeError::ValidationError(format!(
                "unknown work type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    /// Display name as the registry reports it.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affiliations: Vec<String>,
    /// External identity code (bare ORCID, no URL prefix).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliations.push(affiliation.into());
        self
    }

    pub fn with_orcid(mut self, orcid: impl Into<String>) -> Self {
        self.orcid = Some(orcid.into());
        self
    }

    /// Surname used for matching keys; falls back to the display name when the
    /// registry did not split the name.
    pub fn surname_key(&self) -> &str {
        self.family
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    HasPreprint,
    IsPreprintOf,
    IsSupplementTo,
    IsSupplementedBy,
}

impl RelationKind {
    pub const ALL: [RelationKind; 4] = [
        Self::HasPreprint,
        Self::IsPreprintOf,
        Self::IsSupplementTo,
        Self::IsSupplementedBy,
    ];

    /// Key used by Crossref in the `relation` object.
    pub fn crossref_key(&self) -> &'static str {
        match self {
            Self::HasPreprint => "has-preprint",
            Self::IsPreprintOf => "is-preprint-of",
            Self::IsSupplementTo => "is-supplement-to",
            Self::IsSupplementedBy => "is-supplemented-by",
        }
    }

    /// `relationType` value used by DataCite `relatedIdentifiers`.
    pub fn datacite_type(&self) -> &'static str {
        match self {
            Self::HasPreprint => "HasPreprint",
            Self::IsPreprintOf => "IsPreprintOf",
            Self::IsSupplementTo => "IsSupplementTo",
            Self::IsSupplementedBy => "IsSupplementedBy",
        }
    }
}

/// A relation the registry itself asserts, e.g. a journal article listing its preprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeclaredRelation {
    pub kind: RelationKind,
    pub identifier: String,
}

/// Normalized registry view of one work. Immutable snapshot per resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub identifier: String,
    pub title: String,
    pub authors: Vec<Author>,
    pub registry: Registry,
    pub registry_last_modified: DateTime<Utc>,
    pub work_type: WorkType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publishing_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<DeclaredRelation>,
}

impl CanonicalRecord {
    pub fn new(
        identifier: impl Into<String>,
        title: impl Into<String>,
        registry: Registry,
        registry_last_modified: DateTime<Utc>,
        work_type: WorkType,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
            authors: Vec::new(),
            registry,
            registry_last_modified,
            work_type,
            publishing_date: None,
            journal: None,
            relations: Vec::new(),
        }
    }

    pub fn with_authors(mut self, authors: Vec<Author>) -> Self {
        self.authors = authors;
        self
    }

    pub fn first_author(&self) -> Option<&Author> {
        self.authors.first()
    }

    pub fn last_author(&self) -> Option<&Author> {
        self.authors.last()
    }

    pub fn declared(&self, kind: RelationKind) -> impl Iterator<Item = &str> {
        self.relations
            .iter()
            .filter(move |r| r.kind == kind)
            .map(|r| r.identifier.as_str())
    }
}
