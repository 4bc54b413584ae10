use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PubscopeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    PreprintOf,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreprintOf => "preprint_of",
        }
    }
}

impl FromStr for RelationType {
    type Err = PubscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preprint_of" => Ok(Self::PreprintOf),
            other => Err(PubscopeError::ValidationError(format!(
                "unknown relation type: {other}"
            ))),
        }
    }
}

/// How an edge was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOrigin {
    /// Asserted by registry relation metadata.
    Declared,
    /// Accepted by approximate title/author matching.
    Matched,
}

impl EdgeOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Declared => "declared",
            Self::Matched => "matched",
        }
    }
}

impl FromStr for EdgeOrigin {
    type Err = PubscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "declared" => Ok(Self::Declared),
            "matched" => Ok(Self::Matched),
            other => Err(PubscopeError::ValidationError(format!(
                "unknown edge origin: {other}"
            ))),
        }
    }
}

/// Undirected relation between two stored records. `identifier_a` is the preprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub identifier_a: String,
    pub identifier_b: String,
    pub relation_type: RelationType,
    /// 0–100
    pub match_confidence: f64,
    pub origin: EdgeOrigin,
}

impl RelationEdge {
    pub fn preprint_of(
        preprint: impl Into<String>,
        primary: impl Into<String>,
        match_confidence: f64,
        origin: EdgeOrigin,
    ) -> Self {
        Self {
            identifier_a: preprint.into(),
            identifier_b: primary.into(),
            relation_type: RelationType::PreprintOf,
            match_confidence,
            origin,
        }
    }

    /// Order-independent key; two edges with the same key describe the same pair.
    pub fn pair_key(&self) -> (&str, &str) {
        if self.identifier_a <= self.identifier_b {
            (&self.identifier_a, &self.identifier_b)
        } else {
            (&self.identifier_b, &self.identifier_a)
        }
    }

    /// The endpoint opposite `identifier`, if the edge touches it.
    pub fn other(&self, identifier: &str) -> Option<&str> {
        if self.identifier_a == identifier {
            Some(&self.identifier_b)
        } else if self.identifier_b == identifier {
            Some(&self.identifier_a)
        } else {
            None
        }
    }
}

impl fmt::Display for RelationEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -[{} {:.0}]-> {}",
            self.identifier_a,
            self.relation_type.as_str(),
            self.match_confidence,
            self.identifier_b
        )
    }
}
