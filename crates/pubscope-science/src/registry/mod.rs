//! Registry resolution: one identifier in, one normalized record out.
//!
//! Each identifier is owned by exactly one registry, chosen by DOI prefix.
//! Lookups run concurrently but each registry has its own bounded pool.

pub mod crossref;
pub mod datacite;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use futures::StreamExt;
use pubscope_core::config::RegistryConfig;
use pubscope_core::{CanonicalRecord, Registry};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{Result, ScienceError};
use crate::harvest::CandidateIdentifier;
use crate::http::RateLimitedClient;

pub use crossref::CrossrefClient;
pub use datacite::DataCiteClient;

/// One registry API: fetches a raw record and normalizes it.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    fn registry(&self) -> Registry;

    /// Raw registry payload for `identifier`.
    async fn fetch(&self, identifier: &str) -> Result<Value>;

    /// Maps a raw payload into the canonical shape.
    fn normalize(&self, identifier: &str, payload: &Value) -> Result<CanonicalRecord>;

    /// HTTP requests made so far, retries included.
    fn requests_sent(&self) -> usize;
}

// ─── Routing ──────────────────────────────────────────────────────────────────

/// Picks the owning registry for a normalized DOI.
#[derive(Debug, Clone)]
pub struct RegistryRouter {
    datacite_prefixes: Vec<String>,
}

impl RegistryRouter {
    pub fn new<I, S>(datacite_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            datacite_prefixes: datacite_prefixes
                .into_iter()
                .map(|p| p.into().trim().trim_end_matches('/').to_lowercase())
                .collect(),
        }
    }

    pub fn route(&self, identifier: &str) -> Registry {
        let prefix = identifier.split('/').next().unwrap_or_default();
        if self.datacite_prefixes.iter().any(|p| p == prefix) {
            Registry::DataCite
        } else {
            Registry::Crossref
        }
    }
}

// ─── Resolver ─────────────────────────────────────────────────────────────────

/// Result of resolving one candidate.
#[derive(Debug)]
pub struct Resolution {
    pub candidate: CandidateIdentifier,
    pub registry: Registry,
    /// False when the record came from a prefetched payload.
    pub called: bool,
    pub result: Result<CanonicalRecord>,
}

struct Lane {
    client: Arc<dyn RegistryClient>,
    permits: Arc<Semaphore>,
}

pub struct Resolver {
    router: RegistryRouter,
    lanes: HashMap<Registry, Lane>,
    workers_per_registry: usize,
}

impl Resolver {
    pub fn new(
        router: RegistryRouter,
        crossref: Arc<dyn RegistryClient>,
        datacite: Arc<dyn RegistryClient>,
        workers_per_registry: usize,
    ) -> Self {
        let workers = workers_per_registry.max(1);
        let mut lanes = HashMap::new();
        for client in [crossref, datacite] {
            lanes.insert(
                client.registry(),
                Lane {
                    client,
                    permits: Arc::new(Semaphore::new(workers)),
                },
            );
        }
        Self {
            router,
            lanes,
            workers_per_registry: workers,
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        let crossref = CrossrefClient::new(
            RateLimitedClient::from_config(config)?,
            &config.crossref_url,
        );
        let datacite = DataCiteClient::new(
            RateLimitedClient::from_config(config)?,
            &config.datacite_url,
        );
        Ok(Self::new(
            RegistryRouter::new(config.datacite_prefixes.iter().cloned()),
            Arc::new(crossref),
            Arc::new(datacite),
            config.workers_per_registry,
        ))
    }

    pub fn registry_for(&self, identifier: &str) -> Registry {
        self.router.route(identifier)
    }

    pub fn requests_sent(&self, registry: Registry) -> usize {
        self.lanes
            .get(&registry)
            .map_or(0, |lane| lane.client.requests_sent())
    }

    fn lane(&self, registry: Registry) -> Result<&Lane> {
        self.lanes.get(&registry).ok_or_else(|| {
            ScienceError::Configuration(format!("no client configured for {registry}"))
        })
    }

    /// Resolves a bare identifier against its owning registry.
    pub async fn resolve_identifier(&self, identifier: &str) -> Result<CanonicalRecord> {
        let lane = self.lane(self.registry_for(identifier))?;
        let _permit = lane
            .permits
            .acquire()
            .await
            .map_err(|e| ScienceError::Configuration(e.to_string()))?;
        let payload = lane.client.fetch(identifier).await?;
        lane.client.normalize(identifier, &payload)
    }

    /// Resolves a candidate, using its prefetched payload when it came from
    /// the owning registry.
    pub async fn resolve(&self, candidate: CandidateIdentifier) -> Resolution {
        let registry = self.registry_for(&candidate.identifier);

        if let Some(prefetched) = &candidate.prefetched
            && prefetched.registry == registry
        {
            let result = self
                .lane(registry)
                .and_then(|lane| lane.client.normalize(&candidate.identifier, &prefetched.payload));
            if result.is_ok() {
                return Resolution {
                    candidate,
                    registry,
                    called: false,
                    result,
                };
            }
            debug!(identifier = %candidate.identifier, "prefetched payload unusable; fetching");
        }

        let result = self.resolve_identifier(&candidate.identifier).await;
        Resolution {
            candidate,
            registry,
            called: true,
            result,
        }
    }

    /// Resolves every candidate concurrently. Results come back in input order.
    pub fn resolve_all(
        &self,
        candidates: Vec<CandidateIdentifier>,
    ) -> impl futures::Stream<Item = Resolution> + '_ {
        let concurrency = self.workers_per_registry * self.lanes.len();
        futures::stream::iter(candidates)
            .map(move |candidate| self.resolve(candidate))
            .buffered(concurrency)
    }
}

// ─── Normalization helpers ────────────────────────────────────────────────────

/// Parses a registry timestamp, dropping fractional seconds.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(0))
}

/// Bare ORCID from either a bare code or an `orcid.org` URL.
pub fn bare_orcid(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let code = ["https://orcid.org/", "http://orcid.org/", "orcid.org/"]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed)
        .trim_matches('/');
    (!code.is_empty()).then(|| code.to_uppercase())
}

pub(crate) fn non_blank(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
