use std::sync::Arc;

use async_trait::async_trait;
use pubscope_core::Database;

use super::{CandidateIdentifier, Harvester, SourceTag, candidates_from};
use crate::error::Result;

/// Identifiers already in the store, for refresh runs.
pub struct StoredHarvester {
    db: Arc<Database>,
}

impl StoredHarvester {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Harvester for StoredHarvester {
    fn source(&self) -> SourceTag {
        SourceTag::Stored
    }

    async fn fetch_candidates(&self) -> Result<Vec<CandidateIdentifier>> {
        let identifiers = self.db.list_identifiers()?;
        Ok(candidates_from(identifiers, SourceTag::Stored))
    }
}
