use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{CandidateIdentifier, Harvester, SourceTag, candidates_from};
use crate::error::Result;
use crate::http::RateLimitedClient;

#[derive(Debug, Deserialize)]
struct DetailsPage {
    #[serde(default)]
    messages: Vec<PageMessage>,
    #[serde(default)]
    collection: Vec<Preprint>,
}

#[derive(Debug, Deserialize)]
struct PageMessage {
    #[serde(default)]
    count: Option<Value>,
    #[serde(default)]
    total: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Preprint {
    doi: String,
    #[serde(default)]
    author_corresponding_institution: Option<String>,
}

/// Accepts either `100` or `"100"`; the details API uses both.
fn as_count(value: &Option<Value>) -> usize {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as usize,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// bioRxiv preprints posted in a date window whose corresponding author's
/// institution mentions ours.
pub struct BiorxivHarvester {
    client: RateLimitedClient,
    base_url: String,
    institution: String,
    start: NaiveDate,
    stop: NaiveDate,
}

impl BiorxivHarvester {
    /// Window covering the last `days` days.
    pub fn new(client: RateLimitedClient, base_url: &str, institution: &str, days: u32) -> Self {
        let stop = Utc::now().date_naive();
        let start = stop
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(stop);
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            institution: institution.to_lowercase(),
            start,
            stop,
        }
    }

    pub fn with_window(mut self, start: NaiveDate, stop: NaiveDate) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }

    fn page_url(&self, cursor: usize) -> String {
        format!(
            "{}/details/biorxiv/{}/{}/{}",
            self.base_url,
            self.start.format("%Y-%m-%d"),
            self.stop.format("%Y-%m-%d"),
            cursor
        )
    }

    fn is_ours(&self, preprint: &Preprint) -> bool {
        preprint
            .author_corresponding_institution
            .as_deref()
            .is_some_and(|inst| inst.to_lowercase().contains(&self.institution))
    }
}

#[async_trait]
impl Harvester for BiorxivHarvester {
    fn source(&self) -> SourceTag {
        SourceTag::Biorxiv
    }

    async fn fetch_candidates(&self) -> Result<Vec<CandidateIdentifier>> {
        let mut dois = Vec::new();
        let mut cursor = 0usize;

        loop {
            let page: DetailsPage = self.client.get_json(&self.page_url(cursor)).await?;
            let (count, total) = page
                .messages
                .first()
                .map(|m| (as_count(&m.count), as_count(&m.total)))
                .unwrap_or((page.collection.len(), 0));
            debug!(cursor, count, total, "biorxiv page");

            dois.extend(
                page.collection
                    .iter()
                    .filter(|p| self.is_ours(p))
                    .map(|p| p.doi.clone()),
            );

            if count == 0 {
                break;
            }
            cursor += count;
            if cursor >= total {
                break;
            }
        }

        let candidates = candidates_from(dois, SourceTag::Biorxiv);
        info!(count = candidates.len(), start = %self.start, stop = %self.stop, "biorxiv harvest");
        Ok(candidates)
    }
}
