use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: u32 = 1;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

/// One JSON document per record, keyed by identifier. The scalar columns
/// duplicate document fields so they can be filtered without parsing.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS records (
            identifier    TEXT PRIMARY KEY,
            work_type     TEXT NOT NULL,
            registry      TEXT NOT NULL,
            last_modified TEXT NOT NULL,
            document      TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS relations (
            pair_low      TEXT NOT NULL,
            pair_high     TEXT NOT NULL,
            identifier_a  TEXT NOT NULL,
            identifier_b  TEXT NOT NULL,
            relation_type TEXT NOT NULL,
            confidence    REAL NOT NULL,
            origin        TEXT NOT NULL,
            PRIMARY KEY (pair_low, pair_high),
            CHECK (pair_low < pair_high)
        );
        ",
    )?;
    Ok(())
}

pub fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_records_work_type    ON records(work_type);
        CREATE INDEX IF NOT EXISTS idx_relations_a          ON relations(identifier_a);
        CREATE INDEX IF NOT EXISTS idx_relations_b          ON relations(identifier_b);
        CREATE INDEX IF NOT EXISTS idx_relations_type       ON relations(relation_type);
        ",
    )?;
    Ok(())
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    create_tables(conn)?;
    create_indexes(conn)?;
    Ok(())
}
