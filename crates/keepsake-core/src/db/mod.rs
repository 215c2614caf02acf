//! Database layer for Keepsake

mod checkpoint;
mod collection_repository;
mod connection;
mod item_repository;
mod migrations;

pub use checkpoint::CheckpointStore;
pub use collection_repository::CollectionRepository;
pub use connection::Database;
pub use item_repository::ItemRepository;
