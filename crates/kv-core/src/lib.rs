pub mod error;
pub mod hash;
pub mod ids;
pub mod memory_store;
pub mod model;
pub mod schema;
pub mod sqlite_store;
pub mod store;

pub use error::{Error, Result};
pub use hash::{compute_content_hash, sha256_hex};
pub use memory_store::InMemoryStore;
pub use model::*;
pub use sqlite_store::{create_memory_pool, create_pool, DbPool, SqliteStore};
pub use store::{Page, Store};
