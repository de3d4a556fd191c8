pub mod connection;
pub mod file_status;
pub mod migrations;
pub mod schema;
pub mod writer;

pub use connection::{DbError, Result, VectorStore, default_data_dir};
pub use file_status::ChangeSet;
pub use migrations::{CURRENT_SCHEMA_VERSION, SchemaMeta};
pub use writer::{ANN_INDEX_ROW_THRESHOLD, SearchHit, VectorStoreWriter};
