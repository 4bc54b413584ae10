use async_trait::async_trait;
use chrono::NaiveDate;
use pubscope_core::{Author, CanonicalRecord, DeclaredRelation, Registry, RelationKind, WorkType};
use serde_json::Value;

use super::{RegistryClient, bare_orcid, non_blank, parse_timestamp};
use crate::error::{Result, ScienceError};
use crate::http::RateLimitedClient;

pub struct DataCiteClient {
    client: RateLimitedClient,
    base_url: String,
}

impl DataCiteClient {
    pub fn new(client: RateLimitedClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RegistryClient for DataCiteClient {
    fn registry(&self) -> Registry {
        Registry::DataCite
    }

    /// `GET /dois/{doi}`; the payload is the `data` object.
    async fn fetch(&self, identifier: &str) -> Result<Value> {
        let url = format!("{}/dois/{}", self.base_url, identifier);
        let mut body: Value = self.client.get_json(&url).await?;
        Ok(body["data"].take())
    }

    fn requests_sent(&self) -> usize {
        self.client.requests_sent()
    }

    fn normalize(&self, identifier: &str, payload: &Value) -> Result<CanonicalRecord> {
        normalize_doi(identifier, payload)
    }
}

/// Maps a DataCite `data` object (the one carrying `attributes`) to a
/// [`CanonicalRecord`].
pub fn normalize_doi(requested: &str, data: &Value) -> Result<CanonicalRecord> {
    let attrs = &data["attributes"];
    let identifier = non_blank(&attrs["doi"])
        .or_else(|| non_blank(&data["id"]))
        .map(|doi| doi.to_lowercase())
        .unwrap_or_else(|| requested.to_string());

    let title = attrs["titles"]
        .as_array()
        .and_then(|titles| titles.iter().find_map(|t| non_blank(&t["title"])))
        .ok_or_else(|| ScienceError::malformed(&identifier, "no titles"))?;

    let last_modified = attrs["updated"]
        .as_str()
        .and_then(parse_timestamp)
        .ok_or_else(|| ScienceError::malformed(&identifier, "no updated timestamp"))?;

    let work_type = WorkType::from_datacite_type(attrs["types"]["resourceTypeGeneral"].as_str());

    let mut record = CanonicalRecord::new(
        identifier,
        title,
        Registry::DataCite,
        last_modified,
        work_type,
    )
    .with_authors(parse_creators(attrs));
    record.publishing_date = attrs["registered"]
        .as_str()
        .and_then(|s| s.get(..10))
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok());
    record.journal = non_blank(&attrs["publisher"]).or_else(|| non_blank(&attrs["publisher"]["name"]));
    record.relations = parse_related(attrs);
    Ok(record)
}

fn parse_creators(attrs: &Value) -> Vec<Author> {
    let Some(creators) = attrs["creators"].as_array() else {
        return Vec::new();
    };

    creators
        .iter()
        .filter_map(|c| {
            let given = non_blank(&c["givenName"]);
            let family = non_blank(&c["familyName"]);
            let name = match (&given, &family) {
                (Some(g), Some(f)) => format!("{g} {f}"),
                _ => non_blank(&c["name"])?,
            };
            // affiliation is either a list of strings or a list of {name}
            let affiliations = c["affiliation"]
                .as_array()
                .map(|affs| {
                    affs.iter()
                        .filter_map(|a| non_blank(a).or_else(|| non_blank(&a["name"])))
                        .collect()
                })
                .unwrap_or_default();
            let orcid = c["nameIdentifiers"].as_array().and_then(|ids| {
                ids.iter()
                    .filter(|id| {
                        id["nameIdentifierScheme"]
                            .as_str()
                            .is_some_and(|s| s.eq_ignore_ascii_case("orcid"))
                    })
                    .find_map(|id| id["nameIdentifier"].as_str().and_then(bare_orcid))
            });
            Some(Author {
                name,
                family,
                given,
                affiliations,
                orcid,
            })
        })
        .collect()
}

fn parse_related(attrs: &Value) -> Vec<DeclaredRelation> {
    let Some(related) = attrs["relatedIdentifiers"].as_array() else {
        return Vec::new();
    };

    related
        .iter()
        .filter(|r| r["relatedIdentifierType"].as_str() == Some("DOI"))
        .filter_map(|r| {
            let relation_type = r["relationType"].as_str()?;
            let kind = RelationKind::ALL
                .into_iter()
                .find(|k| k.datacite_type() == relation_type)?;
            let identifier = non_blank(&r["relatedIdentifier"])?.to_lowercase();
            Some(DeclaredRelation { kind, identifier })
        })
        .collect()
}
