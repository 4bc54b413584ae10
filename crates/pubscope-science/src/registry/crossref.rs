use async_trait::async_trait;
use chrono::NaiveDate;
use pubscope_core::{Author, CanonicalRecord, DeclaredRelation, Registry, RelationKind, WorkType};
use serde_json::Value;

use super::{RegistryClient, bare_orcid, non_blank, parse_timestamp};
use crate::error::{Result, ScienceError};
use crate::http::RateLimitedClient;

const DATE_FIELDS: [&str; 5] = [
    "published",
    "published-print",
    "published-online",
    "posted",
    "created",
];

pub struct CrossrefClient {
    client: RateLimitedClient,
    base_url: String,
}

impl CrossrefClient {
    pub fn new(client: RateLimitedClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RegistryClient for CrossrefClient {
    fn registry(&self) -> Registry {
        Registry::Crossref
    }

    /// `GET /works/{doi}`. Crossref occasionally serves a record without its
    /// title; those responses are retried like any other transient failure.
    async fn fetch(&self, identifier: &str) -> Result<Value> {
        let url = format!("{}/works/{}", self.base_url, identifier);
        let mut body: Value = self
            .client
            .get_json_complete(&url, |body: &Value| {
                first_string(&body["message"]["title"]).is_some()
            })
            .await?;
        Ok(body["message"].take())
    }

    fn requests_sent(&self) -> usize {
        self.client.requests_sent()
    }

    fn normalize(&self, identifier: &str, payload: &Value) -> Result<CanonicalRecord> {
        normalize_work(identifier, payload)
    }
}

/// Maps a Crossref `message` object to a [`CanonicalRecord`].
pub fn normalize_work(requested: &str, message: &Value) -> Result<CanonicalRecord> {
    let identifier = non_blank(&message["DOI"])
        .map(|doi| doi.to_lowercase())
        .unwrap_or_else(|| requested.to_string());

    let title = first_string(&message["title"])
        .ok_or_else(|| ScienceError::malformed(&identifier, "no title"))?;

    let authors = parse_authors(message);
    if authors.is_empty() {
        return Err(ScienceError::malformed(&identifier, "no author"));
    }

    let last_modified = message["deposited"]["date-time"]
        .as_str()
        .and_then(parse_timestamp)
        .ok_or_else(|| ScienceError::malformed(&identifier, "no deposited timestamp"))?;

    let work_type = message["type"]
        .as_str()
        .map(WorkType::from_crossref_type)
        .unwrap_or_default();

    let mut record = CanonicalRecord::new(
        identifier,
        title,
        Registry::Crossref,
        last_modified,
        work_type,
    )
    .with_authors(authors);
    record.publishing_date = DATE_FIELDS
        .iter()
        .find_map(|field| parse_date_parts(&message[*field]));
    record.journal = first_string(&message["short-container-title"])
        .or_else(|| first_string(&message["container-title"]))
        .or_else(|| message["institution"][0]["name"].as_str().map(str::to_string));
    record.relations = parse_relations(message);
    Ok(record)
}

fn first_string(value: &Value) -> Option<String> {
    value
        .as_array()
        .and_then(|items| items.iter().find_map(non_blank))
}

fn parse_authors(message: &Value) -> Vec<Author> {
    let Some(list) = message["author"].as_array() else {
        return Vec::new();
    };

    list.iter()
        .filter_map(|a| {
            let given = non_blank(&a["given"]);
            let family = non_blank(&a["family"]);
            let name = match (&given, &family) {
                (Some(g), Some(f)) => format!("{g} {f}"),
                (None, Some(f)) => f.clone(),
                _ => non_blank(&a["name"])?,
            };
            let affiliations = a["affiliation"]
                .as_array()
                .map(|affs| affs.iter().filter_map(|aff| non_blank(&aff["name"])).collect())
                .unwrap_or_default();
            Some(Author {
                name,
                family,
                given,
                affiliations,
                orcid: a["ORCID"].as_str().and_then(bare_orcid),
            })
        })
        .collect()
}

/// `{"date-parts": [[2024, 3, 1]]}`; a date missing month or day is skipped.
fn parse_date_parts(value: &Value) -> Option<NaiveDate> {
    let parts = value["date-parts"].get(0)?.as_array()?;
    let part = |i: usize| parts.get(i).and_then(Value::as_i64);
    NaiveDate::from_ymd_opt(
        i32::try_from(part(0)?).ok()?,
        u32::try_from(part(1)?).ok()?,
        u32::try_from(part(2)?).ok()?,
    )
}

fn parse_relations(message: &Value) -> Vec<DeclaredRelation> {
    let mut relations = Vec::new();
    for kind in RelationKind::ALL {
        let Some(entries) = message["relation"][kind.crossref_key()].as_array() else {
            continue;
        };
        for entry in entries {
            if entry["id-type"].as_str() != Some("doi") {
                continue;
            }
            if let Some(id) = non_blank(&entry["id"]) {
                relations.push(DeclaredRelation {
                    kind,
                    identifier: id.to_lowercase(),
                });
            }
        }
    }
    relations
}
