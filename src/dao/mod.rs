/// Account and chat history storage and retrieval operations.
pub mod history_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
