pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::AppConfig;
pub use error::{PubscopeError, Result};
pub use models::*;

pub use storage::database::{ConnectionPool, Database, open_database, open_in_memory};
pub use storage::repositories::{
    RecordRepository, RelationRepository, Repository, SqliteRecordRepository,
    SqliteRelationRepository,
};
