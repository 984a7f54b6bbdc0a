use crate::core::{Result, StoreError};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// User permission level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Read documents, list namespaces, statistics
    Read,
    /// Insert, update and delete documents, manage collections and indexes
    Write,
    /// Administrative privileges (drop databases, everything else)
    Admin,
}

/// User account
#[derive(Debug, Clone)]
pub struct User {
    username: String,
    password_hash: String,
    permissions: Vec<Permission>,
}

impl User {
    /// Creates a new user
    pub fn new(username: String, password_hash: String, permissions: Vec<Permission>) -> Self {
        Self {
            username,
            password_hash,
            permissions,
        }
    }

    /// Identity used by connections opened without credentials on a
    /// deployment that does not require authentication
    pub fn anonymous() -> Self {
        Self::new(String::new(), String::new(), vec![Permission::Admin])
    }

    /// Returns the username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the user's permission list
    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Checks if user has a specific permission; `Write` implies `Read`
    pub fn has_permission(&self, permission: Permission) -> bool {
        if self.permissions.contains(&Permission::Admin) {
            return true;
        }
        match permission {
            Permission::Read => self
                .permissions
                .iter()
                .any(|p| matches!(p, Permission::Read | Permission::Write)),
            other => self.permissions.contains(&other),
        }
    }

    #[inline]
    pub fn is_admin(&self) -> bool {
        self.permissions.contains(&Permission::Admin)
    }
}

/// Authentication manager of a deployment
///
/// Stores user accounts with bcrypt password hashes.
pub struct AuthManager {
    users: RwLock<HashMap<String, User>>,
}

impl AuthManager {
    /// Creates a manager from already hashed accounts
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let users = users
            .into_iter()
            .map(|user| (user.username.clone(), user))
            .collect();
        Self {
            users: RwLock::new(users),
        }
    }

    /// Hashes a password using bcrypt
    ///
    /// Each hash includes a random salt, so the same password will produce
    /// different hashes.
    pub fn hash_password(password: &str, cost: u32) -> Result<String> {
        bcrypt::hash(password, cost)
            .map_err(|e| StoreError::BadValue(format!("cannot hash password: {}", e)))
    }

    /// Authenticates a user
    ///
    /// bcrypt verification is CPU bound, so it runs on the blocking pool.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let user = {
            let users = self.users.read().await;
            users
                .get(username)
                .cloned()
                .ok_or(StoreError::AuthenticationFailed)?
        };

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || {
            bcrypt::verify(password, &hash).unwrap_or(false)
        })
        .await
        .unwrap_or(false);

        if !verified {
            return Err(StoreError::AuthenticationFailed);
        }

        Ok(user)
    }

    /// Returns the number of registered users
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

/// Verifies that `user` may run `action` against `namespace`
pub fn enforce_permission(
    user: &User,
    permission: Permission,
    namespace: &str,
    action: &str,
) -> Result<()> {
    if user.has_permission(permission) {
        return Ok(());
    }

    Err(StoreError::Unauthorized(format!(
        "not authorized on {} to execute command {{ {}: 1 }}",
        namespace, action
    )))
}
