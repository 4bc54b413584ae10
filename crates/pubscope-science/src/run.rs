//! Batch runs: sync (harvest → resolve → filter → reconcile) and match.

use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use futures::StreamExt;
use pubscope_core::{
    AppConfig, CanonicalRecord, Database, EdgeOrigin, Registry, RelationEdge, RelationType,
    WorkType,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::eligibility::EligibilityFilter;
use crate::error::{FailureKind, Result, ScienceError};
use crate::harvest::{
    ArxivHarvester, BiorxivHarvester, CandidateIdentifier, CrossrefHarvester, DataCiteHarvester,
    DepartmentalHarvester, Harvester, OpenAlexHarvester, SourceTag, StoredHarvester,
};
use crate::http::RateLimitedClient;
use crate::matcher::{AuditReason, MatchAudit, PreprintMatcher};
use crate::reconcile::{
    BatchDeduplicator, CommitMode, DroppedDuplicate, ReconcileOutcome, ReconciliationEngine,
    SkipReason,
};
use crate::registry::{Resolution, Resolver};

// ─── Counters & report ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub candidates_read: usize,
    pub harvest_failures: usize,
    pub duplicates: usize,
    pub found_crossref: usize,
    pub found_datacite: usize,
    pub not_found: usize,
    pub malformed: usize,
    pub transient_failures: usize,
    pub failed: usize,
    pub ineligible: usize,
    pub eligible: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub calls_crossref: usize,
    pub calls_datacite: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertedEntry {
    pub identifier: String,
    pub source: SourceTag,
    pub publishing_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatedEntry {
    pub identifier: String,
    pub previous: DateTime<Utc>,
    pub current: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingEntry {
    pub identifier: String,
    pub source: SourceTag,
    pub kind: &'static str,
    pub reason: String,
}

/// Mutable state of one run. Threaded through the pipeline and turned into a
/// [`RunReport`] at the end.
#[derive(Debug)]
pub struct RunContext {
    started: Instant,
    cancel: Arc<AtomicBool>,
    counters: RunCounters,
    inserted: Vec<InsertedEntry>,
    updated: Vec<UpdatedEntry>,
    missing: Vec<MissingEntry>,
    duplicates: Vec<DroppedDuplicate>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            cancel: Arc::new(AtomicBool::new(false)),
            counters: RunCounters::default(),
            inserted: Vec::new(),
            updated: Vec::new(),
            missing: Vec::new(),
            duplicates: Vec::new(),
        }
    }

    /// Flag that stops the run before the next identifier once set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    fn record_failure(&mut self, identifier: &str, source: SourceTag, err: &ScienceError) {
        let kind = match err.kind() {
            FailureKind::NotFound => {
                self.counters.not_found += 1;
                "not_found"
            }
            FailureKind::Transient => {
                self.counters.transient_failures += 1;
                "transient"
            }
            FailureKind::Malformed => {
                self.counters.malformed += 1;
                "malformed"
            }
            FailureKind::Other => {
                self.counters.failed += 1;
                "failed"
            }
        };
        warn!(identifier, %source, error = %err, "{kind}");
        self.missing.push(MissingEntry {
            identifier: identifier.to_string(),
            source,
            kind,
            reason: err.to_string(),
        });
    }

    fn apply(
        &mut self,
        resolution: Resolution,
        filter: &EligibilityFilter,
        engine: &mut ReconciliationEngine<'_>,
    ) {
        let source = resolution.candidate.source;
        let record = match resolution.result {
            Ok(record) => record,
            Err(e) => {
                self.record_failure(&resolution.candidate.identifier, source, &e);
                return;
            }
        };
        match record.registry {
            Registry::Crossref => self.counters.found_crossref += 1,
            Registry::DataCite => self.counters.found_datacite += 1,
        }

        if !filter.admits(&record, &resolution.candidate) {
            self.counters.ineligible += 1;
            return;
        }
        self.counters.eligible += 1;
        self.reconcile(record, source, engine);
    }

    fn reconcile(
        &mut self,
        record: CanonicalRecord,
        source: SourceTag,
        engine: &mut ReconciliationEngine<'_>,
    ) {
        let identifier = record.identifier.clone();
        let publishing_date = record.publishing_date;
        match engine.reconcile(record, source) {
            Ok(ReconcileOutcome::Inserted) => {
                self.counters.inserted += 1;
                self.inserted.push(InsertedEntry {
                    identifier,
                    source,
                    publishing_date,
                });
            }
            Ok(ReconcileOutcome::Updated { previous, current }) => {
                self.counters.updated += 1;
                self.updated.push(UpdatedEntry {
                    identifier,
                    previous,
                    current,
                });
            }
            Ok(ReconcileOutcome::Skipped(SkipReason::Unchanged)) => self.counters.skipped += 1,
            Ok(ReconcileOutcome::Skipped(SkipReason::DuplicateInBatch)) => {
                self.counters.duplicates += 1
            }
            Err(e) => {
                error!(%identifier, error = %e, "store write failed");
                self.record_failure(&identifier, source, &e);
            }
        }
    }

    pub fn finish(self, mode: CommitMode, aborted: bool) -> RunReport {
        RunReport {
            mode,
            aborted,
            elapsed: self.started.elapsed(),
            counters: self.counters,
            inserted: self.inserted,
            updated: self.updated,
            missing: self.missing,
            duplicates: self.duplicates,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: CommitMode,
    pub aborted: bool,
    pub elapsed: Duration,
    pub counters: RunCounters,
    pub inserted: Vec<InsertedEntry>,
    pub updated: Vec<UpdatedEntry>,
    pub missing: Vec<MissingEntry>,
    pub duplicates: Vec<DroppedDuplicate>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counters;
        let rows = [
            ("Candidates read", c.candidates_read),
            ("Harvest failures", c.harvest_failures),
            ("Duplicates", c.duplicates),
            ("Found at Crossref", c.found_crossref),
            ("Found at DataCite", c.found_datacite),
            ("Not found", c.not_found),
            ("Malformed", c.malformed),
            ("Transient failures", c.transient_failures),
            ("Other failures", c.failed),
            ("Ineligible", c.ineligible),
            ("Eligible", c.eligible),
            ("Inserted", c.inserted),
            ("Updated", c.updated),
            ("Skipped", c.skipped),
            ("Crossref calls", c.calls_crossref),
            ("DataCite calls", c.calls_datacite),
        ];
        for (label, value) in rows {
            writeln!(f, "{label:<20} {value}")?;
        }
        writeln!(f, "{:<20} {:.1}s", "Elapsed", self.elapsed.as_secs_f64())?;
        if self.aborted {
            writeln!(f, "Run aborted; work committed so far is kept")?;
        }
        if !self.mode.writes() {
            writeln!(f, "Dry run: nothing was written")?;
        }
        Ok(())
    }
}

// ─── Sync ─────────────────────────────────────────────────────────────────────

/// Builds the harvester for a named source from configuration.
pub fn build_harvester(
    source: SourceTag,
    config: &AppConfig,
    db: &Arc<Database>,
) -> Result<Box<dyn Harvester>> {
    let harvest = &config.harvest;
    let institution = config.institution.name.as_str();
    let client = || RateLimitedClient::from_config(&config.registry);
    let missing = |key: &str| ScienceError::Configuration(format!("harvest.{key} must be set"));

    let harvester: Box<dyn Harvester> = match source {
        SourceTag::Crossref => Box::new(CrossrefHarvester::new(
            client()?,
            &config.registry.crossref_url,
            harvest.crossref_affiliation.as_deref().unwrap_or(institution),
        )),
        SourceTag::DataCite => Box::new(DataCiteHarvester::new(
            client()?,
            &config.registry.datacite_url,
            harvest.datacite_query.as_deref().unwrap_or(institution),
        )),
        SourceTag::Biorxiv => Box::new(BiorxivHarvester::new(
            client()?,
            &harvest.biorxiv_url,
            institution,
            harvest.biorxiv_days,
        )),
        SourceTag::Arxiv => Box::new(ArxivHarvester::new(
            client()?,
            &harvest.arxiv_url,
            institution,
            harvest.arxiv_page_size,
        )),
        SourceTag::OpenAlex => {
            let id = harvest
                .openalex_institution
                .as_deref()
                .ok_or_else(|| missing("openalex_institution"))?;
            Box::new(OpenAlexHarvester::new(client()?, &harvest.openalex_url, id))
        }
        SourceTag::Departmental => {
            let url = harvest
                .departmental_url
                .as_deref()
                .ok_or_else(|| missing("departmental_url"))?;
            Box::new(DepartmentalHarvester::new(client()?, url))
        }
        SourceTag::Stored => Box::new(StoredHarvester::new(Arc::clone(db))),
        SourceTag::File | SourceTag::Manual => {
            return Err(ScienceError::Configuration(format!(
                "{source} candidates are given on the command line"
            )));
        }
    };
    Ok(harvester)
}

/// Runs each harvester in turn. A failing source is logged and counted; the
/// others still contribute.
pub async fn collect_candidates(
    harvesters: &[Box<dyn Harvester>],
    ctx: &mut RunContext,
) -> Vec<CandidateIdentifier> {
    let mut candidates = Vec::new();
    for harvester in harvesters {
        if ctx.is_cancelled() {
            break;
        }
        match harvester.fetch_candidates().await {
            Ok(found) => {
                info!(source = %harvester.source(), count = found.len(), "harvested");
                candidates.extend(found);
            }
            Err(e) => {
                ctx.counters.harvest_failures += 1;
                error!(source = %harvester.source(), error = %e, "harvest failed");
            }
        }
    }
    candidates
}

pub struct SyncRun<'a> {
    db: &'a Database,
    resolver: &'a Resolver,
    filter: &'a EligibilityFilter,
    mode: CommitMode,
}

impl<'a> SyncRun<'a> {
    pub fn new(
        db: &'a Database,
        resolver: &'a Resolver,
        filter: &'a EligibilityFilter,
        mode: CommitMode,
    ) -> Self {
        Self {
            db,
            resolver,
            filter,
            mode,
        }
    }

    pub async fn execute(
        &self,
        candidates: Vec<CandidateIdentifier>,
        mut ctx: RunContext,
    ) -> RunReport {
        ctx.counters.candidates_read += candidates.len();
        let deduped = BatchDeduplicator::new().dedup(candidates);
        ctx.counters.duplicates += deduped.duplicates.len();
        ctx.duplicates.extend(deduped.duplicates);

        let calls_before = self.calls();
        let mut engine = ReconciliationEngine::new(self.db, self.mode);
        let mut resolutions = pin!(self.resolver.resolve_all(deduped.unique));
        let mut aborted = ctx.is_cancelled();
        while !aborted && let Some(resolution) = resolutions.next().await {
            ctx.apply(resolution, self.filter, &mut engine);
            aborted = ctx.is_cancelled();
        }
        if aborted {
            warn!("run cancelled between identifiers");
        }
        let (crossref, datacite) = self.calls();
        ctx.counters.calls_crossref += crossref.saturating_sub(calls_before.0);
        ctx.counters.calls_datacite += datacite.saturating_sub(calls_before.1);

        let report = ctx.finish(self.mode, aborted);
        info!(
            inserted = report.counters.inserted,
            updated = report.counters.updated,
            skipped = report.counters.skipped,
            "sync complete"
        );
        report
    }

    fn calls(&self) -> (usize, usize) {
        (
            self.resolver.requests_sent(Registry::Crossref),
            self.resolver.requests_sent(Registry::DataCite),
        )
    }
}

// ─── Match ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    pub mode: CommitMode,
    pub threshold: f64,
    pub preprints: usize,
    /// Preprint-typed records left out by prefix.
    pub excluded: usize,
    pub primaries: usize,
    pub comparisons: usize,
    pub declared: usize,
    pub matched: usize,
    pub written: usize,
    pub edges: Vec<RelationEdge>,
    pub audit: MatchAudit,
}

impl fmt::Display for MatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("Preprints", self.preprints),
            ("Excluded preprints", self.excluded),
            ("Primaries", self.primaries),
            ("Comparisons", self.comparisons),
            ("Declared edges", self.declared),
            ("Matched edges", self.matched),
            ("Borderline", self.audit.count(AuditReason::Borderline)),
            ("Demoted", self.audit.count(AuditReason::Demoted)),
            ("Declared outside", self.audit.declared_outside.len()),
            ("Edges written", self.written),
        ];
        for (label, value) in rows {
            writeln!(f, "{label:<20} {value}")?;
        }
        if !self.mode.writes() {
            writeln!(f, "Dry run: nothing was written")?;
        }
        Ok(())
    }
}

pub struct MatchRun<'a> {
    db: &'a Database,
    matcher: PreprintMatcher,
    mode: CommitMode,
    excluded_prefixes: Vec<String>,
}

impl<'a> MatchRun<'a> {
    pub fn new(db: &'a Database, matcher: PreprintMatcher, mode: CommitMode) -> Self {
        Self {
            db,
            matcher,
            mode,
            excluded_prefixes: Vec::new(),
        }
    }

    /// Preprint-typed records whose DOI starts with one of `prefixes` are not
    /// matched.
    pub fn excluding_preprints<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_prefixes = prefixes
            .into_iter()
            .map(|p| p.into().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    fn is_excluded(&self, record: &CanonicalRecord) -> bool {
        self.excluded_prefixes
            .iter()
            .any(|prefix| record.identifier.starts_with(prefix.as_str()))
    }

    /// Matches every stored preprint against every stored primary and, in
    /// commit mode, replaces the stored `preprint_of` edge set.
    pub fn execute(&self) -> Result<MatchReport> {
        let load = |work_type| -> Result<Vec<CanonicalRecord>> {
            Ok(self
                .db
                .list_records(work_type)?
                .into_iter()
                .map(|stored| stored.metadata)
                .collect())
        };
        let (excluded, preprints): (Vec<_>, Vec<_>) = load(WorkType::Preprint)?
            .into_iter()
            .partition(|record| self.is_excluded(record));
        if !excluded.is_empty() {
            info!(count = excluded.len(), "preprints excluded by prefix");
        }
        let primaries = load(WorkType::Primary)?;

        let outcome = self.matcher.match_all(&preprints, &primaries);
        let written = if self.mode.writes() {
            self.db
                .replace_relations(RelationType::PreprintOf, &outcome.edges)?
        } else {
            0
        };

        Ok(MatchReport {
            mode: self.mode,
            threshold: self.matcher.threshold(),
            preprints: preprints.len(),
            excluded: excluded.len(),
            primaries: primaries.len(),
            comparisons: outcome.comparisons,
            declared: outcome.count(EdgeOrigin::Declared),
            matched: outcome.count(EdgeOrigin::Matched),
            written,
            edges: outcome.edges,
            audit: outcome.audit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::OrcidRoster;
    use crate::harvest::Prefetched;
    use crate::registry::{CrossrefClient, DataCiteClient, RegistryClient, RegistryRouter};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    fn crossref_work(doi: &str, work_type: &str, title: &str, affiliation: &str, stamp: &str) -> Value {
        json!({
            "DOI": doi,
            "type": work_type,
            "title": [title],
            "author": [
                {"given": "J.", "family": "Lillvis", "affiliation": [{"name": affiliation}]},
                {"given": "D.", "family": "Stern", "affiliation": []}
            ],
            "deposited": {"date-time": stamp}
        })
    }

    fn resolver(server: &mockito::Server) -> Resolver {
        let http = || {
            RateLimitedClient::new(Duration::ZERO, 2, Duration::from_secs(5), "test")
                .unwrap()
                .with_backoff(Duration::ZERO)
        };
        Resolver::new(
            RegistryRouter::new(["10.25378"]),
            Arc::new(CrossrefClient::new(http(), &server.url())),
            Arc::new(DataCiteClient::new(http(), &server.url())),
            2,
        )
    }

    fn filter() -> EligibilityFilter {
        EligibilityFilter::new("Janelia", Arc::new(OrcidRoster::default()))
            .exempting(SourceTag::Departmental)
    }

    async fn mock_work(server: &mut mockito::Server, doi: &str, body: Value) -> mockito::Mock {
        server
            .mock("GET", format!("/works/{doi}").as_str())
            .with_status(200)
            .with_body(json!({"message": body}).to_string())
            .create_async()
            .await
    }

    #[tokio::test]
    async fn sync_inserts_then_is_idempotent() {
        let mut server = mockito::Server::new_async().await;
        let _m = mock_work(
            &mut server,
            "10.7554/elife.1",
            crossref_work("10.7554/elife.1", "journal-article", "Axon guidance", "Janelia", "2024-01-01T00:00:00Z"),
        )
        .await;
        let _m = mock_work(
            &mut server,
            "10.1/elsewhere",
            crossref_work("10.1/elsewhere", "journal-article", "Other", "Elsewhere", "2024-01-01T00:00:00Z"),
        )
        .await;
        let _m = server
            .mock("GET", "/works/10.1/gone")
            .with_status(404)
            .create_async()
            .await;

        let db = Database::open_in_memory().unwrap();
        let resolver = resolver(&server);
        let filter = filter();
        let candidates = || {
            ["10.7554/eLife.1", "10.1/elsewhere", "10.1/gone"]
                .iter()
                .map(|id| CandidateIdentifier::new(id, SourceTag::File).unwrap())
                .collect::<Vec<_>>()
        };

        let run = SyncRun::new(&db, &resolver, &filter, CommitMode::Commit);
        let first = run.execute(candidates(), RunContext::new()).await;
        assert_eq!(first.counters.inserted, 1);
        assert_eq!(first.counters.ineligible, 1);
        assert_eq!(first.counters.not_found, 1);
        assert_eq!(first.counters.calls_crossref, 3);
        assert_eq!(first.missing[0].identifier, "10.1/gone");
        assert_eq!(db.count_records().unwrap(), 1);

        let second = run.execute(candidates(), RunContext::new()).await;
        assert_eq!(second.counters.inserted, 0);
        assert_eq!(second.counters.updated, 0);
        assert_eq!(second.counters.skipped, 1);
        assert_eq!(db.count_records().unwrap(), 1);
    }

    #[tokio::test]
    async fn harvested_twice_inserts_once_with_higher_priority_metadata() {
        let server = mockito::Server::new_async().await;
        let db = Database::open_in_memory().unwrap();
        let resolver = resolver(&server);
        let filter = filter();

        let from_registry = CandidateIdentifier::new("10.1101/x", SourceTag::Crossref)
            .unwrap()
            .with_prefetched(Prefetched {
                registry: Registry::Crossref,
                payload: crossref_work("10.1101/x", "posted-content", "Registry title", "Janelia", "2024-02-01T00:00:00Z"),
            });
        let from_server = CandidateIdentifier::new("10.1101/X", SourceTag::Biorxiv)
            .unwrap()
            .with_prefetched(Prefetched {
                registry: Registry::Crossref,
                payload: crossref_work("10.1101/x", "posted-content", "Server title", "Janelia", "2024-01-01T00:00:00Z"),
            });

        let report = SyncRun::new(&db, &resolver, &filter, CommitMode::Commit)
            .execute(vec![from_server, from_registry], RunContext::new())
            .await;

        assert_eq!(report.counters.inserted, 1);
        assert_eq!(report.counters.duplicates, 1);
        assert_eq!(report.counters.calls_crossref, 0);
        let stored = db.get_record("10.1101/x").unwrap().unwrap();
        assert_eq!(stored.metadata.title, "Registry title");
        assert_eq!(stored.source, "crossref");
    }

    #[tokio::test]
    async fn not_found_does_not_touch_the_store() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/dois/10.25378/janelia.404")
            .with_status(404)
            .create_async()
            .await;

        let db = Database::open_in_memory().unwrap();
        let resolver = resolver(&server);
        let filter = filter();
        let candidate = CandidateIdentifier::new("10.25378/janelia.404", SourceTag::Departmental).unwrap();

        let report = SyncRun::new(&db, &resolver, &filter, CommitMode::Commit)
            .execute(vec![candidate], RunContext::new())
            .await;
        assert_eq!(report.counters.not_found, 1);
        assert_eq!(report.counters.calls_datacite, 1);
        assert_eq!(db.count_records().unwrap(), 0);
    }

    #[tokio::test]
    async fn dry_run_counts_without_writing() {
        let mut server = mockito::Server::new_async().await;
        let _m = mock_work(
            &mut server,
            "10.7554/elife.1",
            crossref_work("10.7554/elife.1", "journal-article", "Axon guidance", "Janelia", "2024-01-01T00:00:00Z"),
        )
        .await;

        let db = Database::open_in_memory().unwrap();
        let resolver = resolver(&server);
        let filter = filter();
        let candidate = CandidateIdentifier::new("10.7554/elife.1", SourceTag::File).unwrap();

        let report = SyncRun::new(&db, &resolver, &filter, CommitMode::DryRun)
            .execute(vec![candidate], RunContext::new())
            .await;
        assert_eq!(report.counters.inserted, 1);
        assert_eq!(db.count_records().unwrap(), 0);
        assert!(report.to_string().contains("Dry run"));
    }

    #[tokio::test]
    async fn cancelled_run_stops_before_first_identifier() {
        let server = mockito::Server::new_async().await;
        let db = Database::open_in_memory().unwrap();
        let resolver = resolver(&server);
        let filter = filter();
        let ctx = RunContext::new();
        ctx.cancel_handle().store(true, Ordering::SeqCst);

        let candidate = CandidateIdentifier::new("10.7554/elife.1", SourceTag::File).unwrap();
        let report = SyncRun::new(&db, &resolver, &filter, CommitMode::Commit)
            .execute(vec![candidate], ctx)
            .await;
        assert!(report.aborted);
        assert_eq!(report.counters.inserted + report.counters.not_found, 0);
    }

    #[tokio::test]
    async fn exempt_source_survives_losing_the_merge() {
        let server = mockito::Server::new_async().await;
        let db = Database::open_in_memory().unwrap();
        let resolver = resolver(&server);
        let filter = filter();

        let departmental =
            CandidateIdentifier::new("10.7554/elife.9", SourceTag::Departmental).unwrap();
        let from_registry = CandidateIdentifier::new("10.7554/elife.9", SourceTag::Crossref)
            .unwrap()
            .with_prefetched(Prefetched {
                registry: Registry::Crossref,
                payload: crossref_work("10.7554/elife.9", "journal-article", "Visiting lab", "Elsewhere", "2024-01-01T00:00:00Z"),
            });

        let report = SyncRun::new(&db, &resolver, &filter, CommitMode::Commit)
            .execute(vec![departmental, from_registry], RunContext::new())
            .await;

        assert_eq!(report.counters.duplicates, 1);
        assert_eq!(report.counters.ineligible, 0);
        assert_eq!(report.counters.inserted, 1);
        assert_eq!(db.get_record("10.7554/elife.9").unwrap().unwrap().source, "crossref");
    }

    #[tokio::test]
    async fn malformed_and_transient_records_are_counted_and_the_batch_continues() {
        let mut server = mockito::Server::new_async().await;
        let mut authorless = crossref_work("10.1/noauthor", "journal-article", "No authors", "Janelia", "2024-01-01T00:00:00Z");
        authorless["author"] = json!([]);
        let _m = mock_work(&mut server, "10.1/noauthor", authorless).await;
        let _m = server
            .mock("GET", "/works/10.1/flaky")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;
        let _m = mock_work(
            &mut server,
            "10.7554/elife.1",
            crossref_work("10.7554/elife.1", "journal-article", "Axon guidance", "Janelia", "2024-01-01T00:00:00Z"),
        )
        .await;

        let db = Database::open_in_memory().unwrap();
        let resolver = resolver(&server);
        let filter = filter();
        let candidates = ["10.1/noauthor", "10.1/flaky", "10.7554/elife.1"]
            .iter()
            .map(|id| CandidateIdentifier::new(id, SourceTag::File).unwrap())
            .collect();

        let report = SyncRun::new(&db, &resolver, &filter, CommitMode::Commit)
            .execute(candidates, RunContext::new())
            .await;

        assert_eq!(report.counters.malformed, 1);
        assert_eq!(report.counters.transient_failures, 1);
        assert_eq!(report.counters.inserted, 1);
        assert_eq!(report.counters.calls_crossref, 4);
        let kinds: Vec<_> = report.missing.iter().map(|m| (m.identifier.as_str(), m.kind)).collect();
        assert_eq!(kinds, vec![("10.1/noauthor", "malformed"), ("10.1/flaky", "transient")]);
        assert_eq!(db.count_records().unwrap(), 1);
    }

    struct FixedHarvester {
        source: SourceTag,
        identifiers: Option<Vec<&'static str>>,
    }

    #[async_trait]
    impl Harvester for FixedHarvester {
        fn source(&self) -> SourceTag {
            self.source
        }

        async fn fetch_candidates(&self) -> Result<Vec<CandidateIdentifier>> {
            match &self.identifiers {
                Some(ids) => ids
                    .iter()
                    .map(|id| CandidateIdentifier::new(id, self.source))
                    .collect(),
                None => Err(ScienceError::ApiError(
                    "https://example.org/feed".to_string(),
                    "HTTP 400".to_string(),
                )),
            }
        }
    }

    #[tokio::test]
    async fn failing_harvester_does_not_stop_the_others() {
        let harvesters: Vec<Box<dyn Harvester>> = vec![
            Box::new(FixedHarvester {
                source: SourceTag::OpenAlex,
                identifiers: None,
            }),
            Box::new(FixedHarvester {
                source: SourceTag::Departmental,
                identifiers: Some(vec!["10.25378/janelia.1", "10.25378/janelia.2"]),
            }),
        ];

        let mut ctx = RunContext::new();
        let candidates = collect_candidates(&harvesters, &mut ctx).await;
        assert_eq!(candidates.len(), 2);
        assert_eq!(ctx.counters().harvest_failures, 1);
        assert!(candidates.iter().all(|c| c.source == SourceTag::Departmental));
    }

    /// Crossref client that raises the cancel flag once a lookup completes.
    struct CancellingClient {
        inner: CrossrefClient,
        cancel: Arc<AtomicBool>,
    }

    #[async_trait]
    impl RegistryClient for CancellingClient {
        fn registry(&self) -> Registry {
            Registry::Crossref
        }

        async fn fetch(&self, identifier: &str) -> Result<Value> {
            let payload = self.inner.fetch(identifier).await;
            self.cancel.store(true, Ordering::SeqCst);
            payload
        }

        fn normalize(&self, identifier: &str, payload: &Value) -> Result<CanonicalRecord> {
            self.inner.normalize(identifier, payload)
        }

        fn requests_sent(&self) -> usize {
            self.inner.requests_sent()
        }
    }

    #[tokio::test]
    async fn cancel_mid_run_keeps_committed_work() {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for doi in ["10.7554/elife.1", "10.7554/elife.2"] {
            mocks.push(
                mock_work(
                    &mut server,
                    doi,
                    crossref_work(doi, "journal-article", "Axon guidance", "Janelia", "2024-01-01T00:00:00Z"),
                )
                .await,
            );
        }

        let ctx = RunContext::new();
        let http = || {
            RateLimitedClient::new(Duration::ZERO, 2, Duration::from_secs(5), "test")
                .unwrap()
                .with_backoff(Duration::ZERO)
        };
        let resolver = Resolver::new(
            RegistryRouter::new(["10.25378"]),
            Arc::new(CancellingClient {
                inner: CrossrefClient::new(http(), &server.url()),
                cancel: ctx.cancel_handle(),
            }),
            Arc::new(DataCiteClient::new(http(), &server.url())),
            1,
        );
        let db = Database::open_in_memory().unwrap();
        let filter = filter();
        let candidates = ["10.7554/elife.1", "10.7554/elife.2"]
            .iter()
            .map(|id| CandidateIdentifier::new(id, SourceTag::File).unwrap())
            .collect();

        let report = SyncRun::new(&db, &resolver, &filter, CommitMode::Commit)
            .execute(candidates, ctx)
            .await;

        assert!(report.aborted);
        assert_eq!(report.counters.inserted, 1);
        assert_eq!(report.inserted[0].identifier, "10.7554/elife.1");
        assert!(db.get_record("10.7554/elife.1").unwrap().is_some());
        assert!(db.get_record("10.7554/elife.2").unwrap().is_none());
        assert!(report.to_string().contains("Run aborted"));
    }

    fn store(db: &Database, id: &str, work_type: WorkType, title: &str) {
        let record = CanonicalRecord::new(id, title, Registry::Crossref, Utc::now(), work_type)
            .with_authors(vec![
                pubscope_core::Author::new("J. Lillvis").with_family("Lillvis"),
                pubscope_core::Author::new("D. Stern").with_family("Stern"),
            ]);
        db.insert_record(&pubscope_core::StoredRecord::new(record, "file"))
            .unwrap();
    }

    #[test]
    fn match_run_commits_edges_idempotently() {
        let db = Database::open_in_memory().unwrap();
        store(&db, "10.1101/p1", WorkType::Preprint, "Axon guidance in Drosophila");
        store(&db, "10.7554/q1", WorkType::Primary, "Axon guidance in Drosophila");
        store(&db, "10.7554/q2", WorkType::Primary, "Unrelated sleep circuits");

        let run = MatchRun::new(&db, PreprintMatcher::default(), CommitMode::Commit);
        let first = run.execute().unwrap();
        assert_eq!(first.matched, 1);
        assert_eq!(first.written, 1);
        let second = run.execute().unwrap();
        assert_eq!(second.edges, first.edges);

        let edges = db.list_relations(RelationType::PreprintOf).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(db.relations_for("10.7554/q1").unwrap()[0].identifier_a, "10.1101/p1");
    }

    #[test]
    fn repository_prefixes_stay_out_of_the_preprint_side() {
        let db = Database::open_in_memory().unwrap();
        store(&db, "10.25378/janelia.42", WorkType::Preprint, "Axon guidance in Drosophila");
        store(&db, "10.7554/q1", WorkType::Primary, "Axon guidance in Drosophila");

        let report = MatchRun::new(&db, PreprintMatcher::default(), CommitMode::Commit)
            .excluding_preprints(["10.25378/Janelia."])
            .execute()
            .unwrap();
        assert_eq!(report.preprints, 0);
        assert_eq!(report.excluded, 1);
        assert!(report.edges.is_empty());
        assert!(db.list_relations(RelationType::PreprintOf).unwrap().is_empty());
    }

    #[test]
    fn match_dry_run_leaves_edges_alone() {
        let db = Database::open_in_memory().unwrap();
        store(&db, "10.1101/p1", WorkType::Preprint, "Axon guidance in Drosophila");
        store(&db, "10.7554/q1", WorkType::Primary, "Axon guidance in Drosophila");

        let report = MatchRun::new(&db, PreprintMatcher::default(), CommitMode::DryRun)
            .execute()
            .unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(report.written, 0);
        assert!(db.list_relations(RelationType::PreprintOf).unwrap().is_empty());
    }
}
