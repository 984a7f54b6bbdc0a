//! Driver-facing database and collection handles

pub mod collection;
pub mod database;

pub use collection::{
    Collection, CreateIndexOptions, DeleteResult, FindOneAndModifyOptions, InsertManyResult,
    InsertOneResult, ReturnDocument, UpdateOptions, UpdateResult,
};
pub use database::{Database, DatabaseStats};
