use crate::error::{Result, ScienceError};
use serde::{Deserialize, Serialize};

/// A DOI in canonical form: prefixes stripped, lowercased.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Doi {
    pub raw: String,
    pub normalized: String,
}

const URL_PREFIXES: [&str; 4] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
];

impl Doi {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let mut stripped = input;
        for prefix in URL_PREFIXES {
            if has_prefix_ignore_case(stripped, prefix) {
                stripped = &stripped[prefix.len()..];
                break;
            }
        }
        if has_prefix_ignore_case(stripped, "doi:") {
            stripped = stripped[4..].trim_start();
        }

        // Must start with "10.", contain "/", and have a non-empty suffix
        if !stripped.starts_with("10.") {
            return Err(ScienceError::InvalidDoi(input.to_string()));
        }
        let slash_pos = stripped
            .find('/')
            .ok_or_else(|| ScienceError::InvalidDoi(input.to_string()))?;
        let suffix = stripped[slash_pos + 1..].trim();
        if suffix.is_empty() || stripped.chars().any(char::is_whitespace) {
            return Err(ScienceError::InvalidDoi(input.to_string()));
        }

        Ok(Self {
            raw: input.to_string(),
            normalized: stripped.to_lowercase(),
        })
    }
}

fn has_prefix_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Normalizes `input` to a canonical DOI string.
pub fn normalize(input: &str) -> Result<String> {
    Doi::parse(input).map(|doi| doi.normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_doi() {
        let doi = Doi::parse("10.1000/xyz123").unwrap();
        assert_eq!(doi.normalized, "10.1000/xyz123");
        assert_eq!(doi.raw, "10.1000/xyz123");
    }

    #[test]
    fn resolver_urls_are_stripped() {
        assert_eq!(normalize("https://doi.org/10.1000/xyz123").unwrap(), "10.1000/xyz123");
        assert_eq!(normalize("http://dx.doi.org/10.1000/xyz123").unwrap(), "10.1000/xyz123");
        assert_eq!(normalize("HTTPS://DOI.ORG/10.1000/XYZ").unwrap(), "10.1000/xyz");
    }

    #[test]
    fn doi_scheme_prefix_is_stripped() {
        assert_eq!(normalize("doi:10.1000/xyz123").unwrap(), "10.1000/xyz123");
        assert_eq!(normalize("DOI: 10.1000/xyz123").unwrap(), "10.1000/xyz123");
    }

    #[test]
    fn case_variants_normalize_identically() {
        assert_eq!(
            normalize("10.1101/2024.01.01.XYZ").unwrap(),
            normalize(" 10.1101/2024.01.01.xyz ").unwrap()
        );
    }

    #[test]
    fn reject_malformed() {
        assert!(Doi::parse("not-a-doi").is_err());
        assert!(Doi::parse("10.1000").is_err());
        assert!(Doi::parse("10.1000/").is_err());
        assert!(Doi::parse("10.1000/in prep").is_err());
        assert!(Doi::parse("").is_err());
    }
}
