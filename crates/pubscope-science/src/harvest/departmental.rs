use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{CandidateIdentifier, Harvester, SourceTag, candidates_from};
use crate::error::Result;
use crate::http::RateLimitedClient;

#[derive(Debug, Deserialize)]
struct DoiList {
    #[serde(default)]
    dois: Vec<String>,
}

/// The departmental records system's DOI list. Its candidates are trusted
/// and normally exempt from the eligibility gate.
pub struct DepartmentalHarvester {
    client: RateLimitedClient,
    url: String,
}

impl DepartmentalHarvester {
    pub fn new(client: RateLimitedClient, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Harvester for DepartmentalHarvester {
    fn source(&self) -> SourceTag {
        SourceTag::Departmental
    }

    async fn fetch_candidates(&self) -> Result<Vec<CandidateIdentifier>> {
        let list: DoiList = self.client.get_json(&self.url).await?;
        let dois = list
            .dois
            .iter()
            .filter(|doi| !doi.to_lowercase().contains("in prep"));
        let candidates = candidates_from(dois, SourceTag::Departmental);
        info!(count = candidates.len(), "departmental DOIs");
        Ok(candidates)
    }
}
