mod record_repository;
mod relation_repository;

pub use record_repository::{RecordRepository, SqliteRecordRepository};
pub use relation_repository::{RelationRepository, SqliteRelationRepository};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::Result;

pub trait Repository {
    type Entity;
    type Id;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>>;
    fn save(&self, entity: &Self::Entity) -> Result<()>;
}

/// Fixed-width RFC 3339 so stored stamps compare correctly as text.
pub(crate) fn stamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
