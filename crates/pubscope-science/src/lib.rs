//! Pubscope Science: registry resolution, harvesting, reconciliation and
//! preprint matching.

pub mod eligibility;
pub mod error;
pub mod harvest;
pub mod http;
pub mod identifiers;
pub mod matcher;
pub mod reconcile;
pub mod registry;
pub mod run;

pub use eligibility::{EligibilityFilter, IdentityStore, OrcidRoster};
pub use error::{FailureKind, Result, ScienceError};
pub use harvest::{CandidateIdentifier, Harvester, Prefetched, SourceTag};
pub use matcher::{MatchOutcome, PreprintMatcher};
pub use reconcile::{CommitMode, ReconcileOutcome, ReconciliationEngine};
pub use registry::{RegistryClient, RegistryRouter, Resolver};
pub use run::{MatchReport, MatchRun, RunContext, RunReport, SyncRun};
