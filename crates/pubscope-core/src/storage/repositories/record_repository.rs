use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use std::sync::MutexGuard;

use crate::error::{PubscopeError, Result};
use crate::models::{StoredRecord, WorkType};

use super::{Repository, stamp};

pub trait RecordRepository: Repository<Entity = StoredRecord, Id = String> {
    /// Inserts a record that must not exist yet.
    fn insert(&self, record: &StoredRecord) -> Result<()>;
    /// Overwrites the document only if its timestamp is strictly newer than the stored one.
    fn update_if_newer(&self, record: &StoredRecord) -> Result<bool>;
    fn list_by_work_type(&self, work_type: WorkType) -> Result<Vec<StoredRecord>>;
    fn list_all(&self) -> Result<Vec<StoredRecord>>;
    fn list_identifiers(&self) -> Result<Vec<String>>;
    fn count(&self) -> Result<usize>;
}

pub struct SqliteRecordRepository<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> SqliteRecordRepository<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }

    fn document_column(row: &rusqlite::Row) -> rusqlite::Result<String> {
        row.get::<_, String>(0)
    }

    fn parse_document(document: &str) -> Result<StoredRecord> {
        Ok(serde_json::from_str(document)?)
    }

    fn collect(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<StoredRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let documents = stmt
            .query_map(args, Self::document_column)?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        documents.iter().map(|d| Self::parse_document(d)).collect()
    }
}

impl Repository for SqliteRecordRepository<'_> {
    type Entity = StoredRecord;
    type Id = String;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let document: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM records WHERE identifier = ?1",
                params![id],
                Self::document_column,
            )
            .optional()?;
        document.as_deref().map(Self::parse_document).transpose()
    }

    /// Unconditional upsert, used by curation paths that edit enrichment.
    fn save(&self, record: &Self::Entity) -> Result<()> {
        let document = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT INTO records (identifier, work_type, registry, last_modified, document, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(identifier) DO UPDATE SET
                work_type = excluded.work_type,
                registry = excluded.registry,
                last_modified = excluded.last_modified,
                document = excluded.document,
                updated_at = excluded.updated_at",
            params![
                record.identifier(),
                record.work_type().as_str(),
                record.metadata.registry.as_str(),
                stamp(&record.stored_last_modified()),
                document,
                stamp(&record.updated_at),
            ],
        )?;
        Ok(())
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn insert(&self, record: &StoredRecord) -> Result<()> {
        let document = serde_json::to_string(record)?;
        let result = self.conn.execute(
            "INSERT INTO records (identifier, work_type, registry, last_modified, document, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.identifier(),
                record.work_type().as_str(),
                record.metadata.registry.as_str(),
                stamp(&record.stored_last_modified()),
                document,
                stamp(&record.updated_at),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(PubscopeError::DuplicateRecord(record.identifier().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update_if_newer(&self, record: &StoredRecord) -> Result<bool> {
        let document = serde_json::to_string(record)?;
        let changed = self.conn.execute(
            "UPDATE records
                SET work_type = ?2, registry = ?3, last_modified = ?4, document = ?5, updated_at = ?6
              WHERE identifier = ?1 AND last_modified < ?4",
            params![
                record.identifier(),
                record.work_type().as_str(),
                record.metadata.registry.as_str(),
                stamp(&record.stored_last_modified()),
                document,
                stamp(&record.updated_at),
            ],
        )?;
        Ok(changed > 0)
    }

    fn list_by_work_type(&self, work_type: WorkType) -> Result<Vec<StoredRecord>> {
        self.collect(
            "SELECT document FROM records WHERE work_type = ?1 ORDER BY identifier",
            &[&work_type.as_str()],
        )
    }

    fn list_all(&self) -> Result<Vec<StoredRecord>> {
        self.collect("SELECT document FROM records ORDER BY identifier", &[])
    }

    fn list_identifiers(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT identifier FROM records ORDER BY identifier")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
