mod connection;
mod migrations;
mod schema;

pub use connection::ConnectionPool;
pub use migrations::{Migration, get_applied_versions, run_migrations};
pub use schema::{SCHEMA_VERSION, init_schema};

use std::path::Path;

use crate::error::{PubscopeError, Result};
use crate::models::{Enrichment, RelationEdge, RelationType, StoredRecord, WorkType};

use super::repositories::{
    RecordRepository, RelationRepository, Repository, SqliteRecordRepository,
    SqliteRelationRepository,
};

pub fn open_database(path: &Path) -> Result<ConnectionPool> {
    let pool = ConnectionPool::open(path)?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

pub fn open_in_memory() -> Result<ConnectionPool> {
    let pool = ConnectionPool::open_in_memory()?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

/// Document store for records and their relation graph.
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let pool = open_database(path)?;
        Ok(Self { pool })
    }

    pub fn open_in_memory() -> Result<Self> {
        let pool = open_in_memory()?;
        Ok(Self { pool })
    }

    pub fn path(&self) -> Option<&str> {
        self.pool.path()
    }

    fn records(&self) -> SqliteRecordRepository<'_> {
        SqliteRecordRepository::new(self.pool.get_connection())
    }

    fn relations(&self) -> SqliteRelationRepository<'_> {
        SqliteRelationRepository::new(self.pool.get_connection())
    }

    // ─── Records ───────────────────────────────────────────

    pub fn get_record(&self, identifier: &str) -> Result<Option<StoredRecord>> {
        self.records().find_by_id(&identifier.to_string())
    }

    pub fn insert_record(&self, record: &StoredRecord) -> Result<()> {
        self.records().insert(record)
    }

    pub fn update_record_if_newer(&self, record: &StoredRecord) -> Result<bool> {
        self.records().update_if_newer(record)
    }

    pub fn list_records(&self, work_type: WorkType) -> Result<Vec<StoredRecord>> {
        self.records().list_by_work_type(work_type)
    }

    pub fn list_all_records(&self) -> Result<Vec<StoredRecord>> {
        self.records().list_all()
    }

    pub fn list_identifiers(&self) -> Result<Vec<String>> {
        self.records().list_identifiers()
    }

    pub fn count_records(&self) -> Result<usize> {
        self.records().count()
    }

    /// Curation entry point: replaces the enrichment of an existing record.
    pub fn save_enrichment(&self, identifier: &str, enrichment: Enrichment) -> Result<()> {
        let repo = self.records();
        let mut record = repo
            .find_by_id(&identifier.to_string())?
            .ok_or_else(|| PubscopeError::RecordNotFound(identifier.to_string()))?;
        record.enrichment = enrichment;
        repo.save(&record)
    }

    // ─── Relations ─────────────────────────────────────────

    pub fn replace_relations(
        &self,
        relation_type: RelationType,
        edges: &[RelationEdge],
    ) -> Result<usize> {
        self.relations().replace_all(relation_type, edges)
    }

    pub fn list_relations(&self, relation_type: RelationType) -> Result<Vec<RelationEdge>> {
        self.relations().list(relation_type)
    }

    pub fn relations_for(&self, identifier: &str) -> Result<Vec<RelationEdge>> {
        self.relations().for_identifier(identifier)
    }

    pub fn schema_versions(&self) -> Result<Vec<u32>> {
        let conn = self.pool.get_connection();
        get_applied_versions(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, CanonicalRecord, EdgeOrigin, Registry};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn record(identifier: &str, work_type: WorkType, secs: i64) -> StoredRecord {
        let metadata = CanonicalRecord::new(
            identifier,
            "Axon guidance in Drosophila",
            Registry::Crossref,
            Utc.timestamp_opt(secs, 0).unwrap(),
            work_type,
        )
        .with_authors(vec![Author::new("J. Lillvis").with_family("Lillvis")]);
        StoredRecord::new(metadata, "crossref")
    }

    #[test]
    fn migrations_are_recorded_once() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_versions().unwrap(), vec![SCHEMA_VERSION]);
    }

    #[test]
    fn insert_then_get() {
        let db = Database::open_in_memory().unwrap();
        let rec = record("10.7554/elife.1", WorkType::Primary, 10);
        db.insert_record(&rec).unwrap();

        let loaded = db.get_record("10.7554/elife.1").unwrap().unwrap();
        assert_eq!(loaded, rec);
        assert!(db.get_record("10.7554/elife.2").unwrap().is_none());
    }

    #[test]
    fn second_insert_of_same_identifier_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let rec = record("10.7554/elife.1", WorkType::Primary, 10);
        db.insert_record(&rec).unwrap();

        let err = db.insert_record(&rec).unwrap_err();
        assert!(matches!(err, PubscopeError::DuplicateRecord(_)));
        assert_eq!(db.count_records().unwrap(), 1);
    }

    #[test]
    fn update_requires_strictly_newer_stamp() {
        let db = Database::open_in_memory().unwrap();
        db.insert_record(&record("10.1/a", WorkType::Primary, 100)).unwrap();

        assert!(!db.update_record_if_newer(&record("10.1/a", WorkType::Primary, 100)).unwrap());
        assert!(!db.update_record_if_newer(&record("10.1/a", WorkType::Primary, 50)).unwrap());
        assert!(db.update_record_if_newer(&record("10.1/a", WorkType::Primary, 150)).unwrap());

        let loaded = db.get_record("10.1/a").unwrap().unwrap();
        assert_eq!(loaded.stored_last_modified().timestamp(), 150);
    }

    #[test]
    fn list_records_filters_by_work_type() {
        let db = Database::open_in_memory().unwrap();
        db.insert_record(&record("10.1101/p1", WorkType::Preprint, 1)).unwrap();
        db.insert_record(&record("10.1101/p2", WorkType::Preprint, 1)).unwrap();
        db.insert_record(&record("10.7554/j1", WorkType::Primary, 1)).unwrap();

        assert_eq!(db.list_records(WorkType::Preprint).unwrap().len(), 2);
        assert_eq!(db.list_records(WorkType::Primary).unwrap().len(), 1);
        assert_eq!(db.list_records(WorkType::Dataset).unwrap().len(), 0);
        assert_eq!(
            db.list_identifiers().unwrap(),
            vec!["10.1101/p1", "10.1101/p2", "10.7554/j1"]
        );
    }

    #[test]
    fn save_enrichment_keeps_registry_fields() {
        let db = Database::open_in_memory().unwrap();
        let rec = record("10.1/a", WorkType::Primary, 100);
        db.insert_record(&rec).unwrap();

        let enrichment = Enrichment {
            tags: vec!["FlyEM".to_string()],
            curated: true,
            ..Default::default()
        };
        db.save_enrichment("10.1/a", enrichment.clone()).unwrap();

        let loaded = db.get_record("10.1/a").unwrap().unwrap();
        assert_eq!(loaded.enrichment, enrichment);
        assert_eq!(loaded.metadata, rec.metadata);
        assert!(matches!(
            db.save_enrichment("10.1/missing", Enrichment::default()),
            Err(PubscopeError::RecordNotFound(_))
        ));
    }

    #[test]
    fn replace_relations_is_idempotent_and_answers_both_directions() {
        let db = Database::open_in_memory().unwrap();
        let edges = vec![
            RelationEdge::preprint_of("10.1101/p1", "10.7554/j1", 96.0, EdgeOrigin::Matched),
            RelationEdge::preprint_of("10.1101/p2", "10.7554/j2", 100.0, EdgeOrigin::Declared),
        ];

        db.replace_relations(RelationType::PreprintOf, &edges).unwrap();
        db.replace_relations(RelationType::PreprintOf, &edges).unwrap();

        let stored = db.list_relations(RelationType::PreprintOf).unwrap();
        assert_eq!(stored, edges);

        let from_primary = db.relations_for("10.7554/j1").unwrap();
        assert_eq!(from_primary.len(), 1);
        assert_eq!(from_primary[0].other("10.7554/j1"), Some("10.1101/p1"));
    }

    #[test]
    fn reversed_duplicate_edge_collapses_to_one_row() {
        let db = Database::open_in_memory().unwrap();
        let edges = vec![
            RelationEdge::preprint_of("10.1101/p1", "10.7554/j1", 96.0, EdgeOrigin::Matched),
            RelationEdge::preprint_of("10.7554/j1", "10.1101/p1", 96.0, EdgeOrigin::Matched),
        ];
        db.replace_relations(RelationType::PreprintOf, &edges).unwrap();
        assert_eq!(db.list_relations(RelationType::PreprintOf).unwrap().len(), 1);
    }

    #[test]
    fn file_backed_store_persists_between_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("pubscope.db");

        {
            let db = Database::open(&path).unwrap();
            db.insert_record(&record("10.1/a", WorkType::Primary, 1)).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.count_records().unwrap(), 1);
        assert_eq!(db.schema_versions().unwrap(), vec![1]);
    }
}
