use crate::error::{Result, ScienceError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// New format: YYMM.NNNNN or YYMM.NNNNNN (with optional version)
static NEW_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}\.\d{4,5})(v(\d+))?$").expect("valid regex"));

// Old format: category/YYMMNNN
static OLD_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z\-]+(?:\.[A-Z]{2})?/\d{7})(v(\d+))?$").expect("valid regex")
});

/// DataCite prefix arXiv registers its DOIs under.
pub const ARXIV_DOI_PREFIX: &str = "10.48550";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArxivId {
    pub raw: String,
    pub id: String,
    pub version: Option<u8>,
}

impl ArxivId {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let stripped = [
            "https://arxiv.org/abs/",
            "http://arxiv.org/abs/",
            "arXiv:",
            "arxiv:",
        ]
        .iter()
        .find_map(|prefix| input.strip_prefix(prefix))
        .unwrap_or(input);

        let caps = NEW_FORMAT
            .captures(stripped)
            .or_else(|| OLD_FORMAT.captures(stripped))
            .ok_or_else(|| ScienceError::InvalidArxivId(input.to_string()))?;

        let id = caps
            .get(1)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ScienceError::InvalidArxivId(input.to_string()))?;
        let version = caps.get(3).and_then(|v| v.as_str().parse::<u8>().ok());

        Ok(Self {
            raw: input.to_string(),
            id,
            version,
        })
    }

    /// The registered DOI, already in normalized (lowercase) form.
    pub fn doi(&self) -> String {
        format!("{ARXIV_DOI_PREFIX}/arxiv.{}", self.id.to_lowercase())
    }
}
