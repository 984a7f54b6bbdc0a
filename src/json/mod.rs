//! Document Query Module
//!
//! Evaluates the JSON query language shared by every collection action.
//!
//! # Architecture
//!
//! - `filter.rs` - Query filters and sort specifications
//! - `update.rs` - Update operators, replacements, projections
//! - `validator.rs` - Database and collection name validation

pub mod filter;
pub mod update;
pub mod validator;

pub use filter::{compare_by_sort, matches};
pub use update::{ID_FIELD, apply_update, is_operator_update, project, replace_document, seed_from_filter};
pub use validator::{validate_collection_name, validate_database_name};
