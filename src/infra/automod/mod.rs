// Store implementations for the automod core.

pub mod in_memory;
pub mod sqlite_mod_store;

pub use in_memory::InMemoryModStore;
pub use sqlite_mod_store::SqliteModStore;
