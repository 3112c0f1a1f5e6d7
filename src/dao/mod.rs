/// Storage backends behind a single trait.
pub mod contest_store;
/// Database model definitions.
pub mod models;
/// Typed repositories publishing change events.
pub mod repositories;
/// Storage abstraction layer for database operations.
pub mod storage;
