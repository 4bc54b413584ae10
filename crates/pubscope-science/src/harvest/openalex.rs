use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{CandidateIdentifier, Harvester, SourceTag, candidates_from};
use crate::error::Result;
use crate::http::RateLimitedClient;

const PAGE_SIZE: usize = 200;

#[derive(Debug, Deserialize)]
struct WorksPage {
    #[serde(default)]
    meta: Meta,
    #[serde(default)]
    results: Vec<Work>,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Work {
    doi: Option<String>,
}

/// Works an open-access aggregator attributes to an institution id.
/// The aggregator is not a registry, so no payload is kept.
pub struct OpenAlexHarvester {
    client: RateLimitedClient,
    base_url: String,
    institution_id: String,
}

impl OpenAlexHarvester {
    pub fn new(client: RateLimitedClient, base_url: &str, institution_id: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            institution_id: institution_id.to_string(),
        }
    }

    fn page_url(&self, cursor: &str) -> String {
        format!(
            "{}/works?filter=institutions.id:{}&per-page={}&cursor={}",
            self.base_url,
            urlencoding::encode(&self.institution_id),
            PAGE_SIZE,
            urlencoding::encode(cursor)
        )
    }
}

#[async_trait]
impl Harvester for OpenAlexHarvester {
    fn source(&self) -> SourceTag {
        SourceTag::OpenAlex
    }

    async fn fetch_candidates(&self) -> Result<Vec<CandidateIdentifier>> {
        let mut dois = Vec::new();
        let mut cursor = "*".to_string();

        loop {
            let page: WorksPage = self.client.get_json(&self.page_url(&cursor)).await?;
            if page.results.is_empty() {
                break;
            }
            debug!(count = page.results.len(), "openalex page");
            dois.extend(page.results.into_iter().filter_map(|w| w.doi));

            match page.meta.next_cursor {
                Some(next) if !next.is_empty() => cursor = next,
                _ => break,
            }
        }

        let candidates = candidates_from(dois, SourceTag::OpenAlex);
        info!(count = candidates.len(), institution = %self.institution_id, "openalex harvest");
        Ok(candidates)
    }
}
