use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{CandidateIdentifier, Harvester, SourceTag, candidates_from};
use crate::error::{Result, ScienceError};
use crate::http::RateLimitedClient;
use crate::identifiers::ArxivId;

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: String,
}

/// arXiv DOIs (`10.48550/arxiv.<id>`) from an Atom feed.
pub fn parse_feed(xml: &str) -> Result<Vec<String>> {
    let feed: AtomFeed =
        from_str(xml).map_err(|e| ScienceError::Parse(format!("invalid atom xml: {e}")))?;

    Ok(feed
        .entries
        .iter()
        .filter_map(|entry| match ArxivId::parse(&entry.id) {
            Ok(id) => Some(id.doi()),
            Err(_) => {
                warn!(id = %entry.id, "unrecognized arXiv entry id");
                None
            }
        })
        .collect())
}

/// arXiv search for the institution name.
pub struct ArxivHarvester {
    client: RateLimitedClient,
    base_url: String,
    query: String,
    page_size: u32,
}

impl ArxivHarvester {
    pub fn new(client: RateLimitedClient, base_url: &str, query: &str, page_size: u32) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            query: query.to_string(),
            page_size: page_size.max(1),
        }
    }

    fn page_url(&self, start: u32) -> String {
        format!(
            "{}?search_query=all:{}&start={}&max_results={}",
            self.base_url,
            urlencoding::encode(&self.query),
            start,
            self.page_size
        )
    }
}

#[async_trait]
impl Harvester for ArxivHarvester {
    fn source(&self) -> SourceTag {
        SourceTag::Arxiv
    }

    async fn fetch_candidates(&self) -> Result<Vec<CandidateIdentifier>> {
        let mut dois = Vec::new();
        let mut start = 0u32;

        loop {
            let xml = self.client.get(&self.page_url(start)).await?;
            let page = parse_feed(&xml)?;
            let fetched = page.len() as u32;
            debug!(start, fetched, "arxiv page");
            dois.extend(page);

            if fetched < self.page_size {
                break;
            }
            start += fetched;
        }

        let candidates = candidates_from(dois, SourceTag::Arxiv);
        info!(count = candidates.len(), query = %self.query, "arxiv harvest");
        Ok(candidates)
    }
}
