use rusqlite::{Connection, params};
use std::str::FromStr;
use std::sync::MutexGuard;

use crate::error::Result;
use crate::models::{EdgeOrigin, RelationEdge, RelationType};

pub trait RelationRepository {
    /// Replaces every edge of `relation_type` with `edges` in one transaction.
    fn replace_all(&self, relation_type: RelationType, edges: &[RelationEdge]) -> Result<usize>;
    fn list(&self, relation_type: RelationType) -> Result<Vec<RelationEdge>>;
    /// Edges touching `identifier`, in either position.
    fn for_identifier(&self, identifier: &str) -> Result<Vec<RelationEdge>>;
}

pub struct SqliteRelationRepository<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> SqliteRelationRepository<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }

    fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<(String, String, String, f64, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    fn build_edge(raw: (String, String, String, f64, String)) -> Result<RelationEdge> {
        let (identifier_a, identifier_b, relation_type, confidence, origin) = raw;
        Ok(RelationEdge {
            identifier_a,
            identifier_b,
            relation_type: RelationType::from_str(&relation_type)?,
            match_confidence: confidence,
            origin: EdgeOrigin::from_str(&origin)?,
        })
    }

    fn query(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<RelationEdge>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, Self::row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(Self::build_edge).collect()
    }
}

impl RelationRepository for SqliteRelationRepository<'_> {
    fn replace_all(&self, relation_type: RelationType, edges: &[RelationEdge]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM relations WHERE relation_type = ?1",
            params![relation_type.as_str()],
        )?;
        let mut written = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO relations
                    (pair_low, pair_high, identifier_a, identifier_b, relation_type, confidence, origin)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for edge in edges.iter().filter(|e| e.relation_type == relation_type) {
                let (low, high) = edge.pair_key();
                written += stmt.execute(params![
                    low,
                    high,
                    edge.identifier_a,
                    edge.identifier_b,
                    edge.relation_type.as_str(),
                    edge.match_confidence,
                    edge.origin.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    fn list(&self, relation_type: RelationType) -> Result<Vec<RelationEdge>> {
        self.query(
            "SELECT identifier_a, identifier_b, relation_type, confidence, origin
               FROM relations WHERE relation_type = ?1
              ORDER BY identifier_a, identifier_b",
            &[&relation_type.as_str()],
        )
    }

    fn for_identifier(&self, identifier: &str) -> Result<Vec<RelationEdge>> {
        self.query(
            "SELECT identifier_a, identifier_b, relation_type, confidence, origin
               FROM relations WHERE identifier_a = ?1 OR identifier_b = ?1
              ORDER BY identifier_a, identifier_b",
            &[&identifier],
        )
    }
}
