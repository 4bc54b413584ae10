use async_trait::async_trait;
use pubscope_core::Registry;
use serde_json::Value;
use tracing::{debug, info};

use super::{CandidateIdentifier, Harvester, Prefetched, SourceTag};
use crate::error::Result;
use crate::http::RateLimitedClient;

const PAGE_SIZE: usize = 1000;

/// DataCite DOIs matching a query. Follows `links.next` until exhausted.
pub struct DataCiteHarvester {
    client: RateLimitedClient,
    base_url: String,
    query: String,
    page_size: usize,
}

impl DataCiteHarvester {
    pub fn new(client: RateLimitedClient, base_url: &str, query: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            query: query.to_string(),
            page_size: PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl Harvester for DataCiteHarvester {
    fn source(&self) -> SourceTag {
        SourceTag::DataCite
    }

    async fn fetch_candidates(&self) -> Result<Vec<CandidateIdentifier>> {
        let mut candidates = Vec::new();
        let mut next = Some(format!(
            "{}/dois?query={}&page[size]={}",
            self.base_url,
            urlencoding::encode(&self.query),
            self.page_size
        ));

        while let Some(url) = next.take() {
            let mut page: Value = self.client.get_json(&url).await?;
            let items = match page["data"].take() {
                Value::Array(items) => items,
                _ => Vec::new(),
            };
            debug!(count = items.len(), "datacite page");

            for item in items {
                let doi = item["attributes"]["doi"]
                    .as_str()
                    .or_else(|| item["id"].as_str())
                    .map(str::to_string);
                let Some(doi) = doi else { continue };
                if let Ok(candidate) = CandidateIdentifier::new(&doi, SourceTag::DataCite) {
                    candidates.push(candidate.with_prefetched(Prefetched {
                        registry: Registry::DataCite,
                        payload: item,
                    }));
                }
            }

            next = page["links"]["next"]
                .as_str()
                .filter(|n| !n.is_empty())
                .map(str::to_string);
        }

        info!(count = candidates.len(), query = %self.query, "datacite harvest");
        Ok(candidates)
    }
}
