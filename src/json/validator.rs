//! Namespace validation
//!
//! Database and collection names end up in paths and error messages, so they
//! are checked before any storage is touched.

use crate::core::{Result, StoreError};

const MAX_DATABASE_NAME: usize = 63;
const MAX_COLLECTION_NAME: usize = 120;
const FORBIDDEN_DATABASE_CHARS: &[char] = &['/', '\\', '.', ' ', '"', '$', '*', '<', '>', ':', '|', '?', '\0'];

pub fn validate_database_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidNamespace("database name cannot be empty".to_string()));
    }

    if name.len() > MAX_DATABASE_NAME {
        return Err(StoreError::InvalidNamespace(format!(
            "database name too long (max {} characters): {}",
            MAX_DATABASE_NAME, name
        )));
    }

    if let Some(c) = name.chars().find(|c| FORBIDDEN_DATABASE_CHARS.contains(c)) {
        return Err(StoreError::InvalidNamespace(format!(
            "database name '{}' cannot contain '{}'",
            name, c
        )));
    }

    Ok(())
}

pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidNamespace("collection name cannot be empty".to_string()));
    }

    if name.len() > MAX_COLLECTION_NAME {
        return Err(StoreError::InvalidNamespace(format!(
            "collection name too long (max {} characters)",
            MAX_COLLECTION_NAME
        )));
    }

    if name.contains('$') || name.contains('\0') {
        return Err(StoreError::InvalidNamespace(format!(
            "collection name '{}' contains an illegal character",
            name
        )));
    }

    // Reserved for server metadata
    if name.starts_with("system.") {
        return Err(StoreError::InvalidNamespace(format!(
            "collection name '{}' is reserved",
            name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_database_name("mydb").is_ok());
        assert!(validate_database_name("my_db-2").is_ok());
        assert!(validate_collection_name("users").is_ok());
        assert!(validate_collection_name("events.2024").is_ok());
    }

    #[test]
    fn test_invalid_database_names() {
        assert!(validate_database_name("").is_err());
        assert!(validate_database_name("a.b").is_err());
        assert!(validate_database_name("a b").is_err());
        assert!(validate_database_name(&"x".repeat(64)).is_err());
    }

    #[test]
    fn test_invalid_collection_names() {
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("a$b").is_err());
        assert!(validate_collection_name("system.users").is_err());
    }
}
