use async_trait::async_trait;
use pubscope_core::Registry;
use serde_json::Value;
use tracing::{debug, info};

use super::{CandidateIdentifier, Harvester, Prefetched, SourceTag};
use crate::error::Result;
use crate::http::RateLimitedClient;

const PAGE_SIZE: usize = 1000;

/// Crossref works whose author affiliations match a query. Each item is a full
/// Crossref record, so it travels with the candidate as a prefetched payload.
pub struct CrossrefHarvester {
    client: RateLimitedClient,
    base_url: String,
    affiliation: String,
    page_size: usize,
}

impl CrossrefHarvester {
    pub fn new(client: RateLimitedClient, base_url: &str, affiliation: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            affiliation: affiliation.to_string(),
            page_size: PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn page_url(&self, offset: usize) -> String {
        format!(
            "{}/works?query.affiliation={}&rows={}&offset={}",
            self.base_url,
            urlencoding::encode(&self.affiliation),
            self.page_size,
            offset
        )
    }
}

#[async_trait]
impl Harvester for CrossrefHarvester {
    fn source(&self) -> SourceTag {
        SourceTag::Crossref
    }

    async fn fetch_candidates(&self) -> Result<Vec<CandidateIdentifier>> {
        let mut candidates = Vec::new();
        let mut offset = 0usize;

        loop {
            let mut page: Value = self.client.get_json(&self.page_url(offset)).await?;
            let total = page["message"]["total-results"].as_u64().unwrap_or(0) as usize;
            let items = match page["message"]["items"].take() {
                Value::Array(items) => items,
                _ => Vec::new(),
            };
            if items.is_empty() {
                break;
            }
            offset += items.len();
            debug!(offset, total, "crossref page");

            for item in items {
                let Some(doi) = item["DOI"].as_str() else {
                    continue;
                };
                if let Ok(candidate) = CandidateIdentifier::new(doi, SourceTag::Crossref) {
                    candidates.push(candidate.with_prefetched(Prefetched {
                        registry: Registry::Crossref,
                        payload: item,
                    }));
                }
            }

            if offset >= total {
                break;
            }
        }

        info!(count = candidates.len(), affiliation = %self.affiliation, "crossref harvest");
        Ok(candidates)
    }
}
