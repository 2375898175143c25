//! Users and roles.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of roles the service knows about.
///
/// Route guards name one of these as their minimum role. The numeric level
/// that backs each variant lives in the role table and is loaded once at
/// startup by [`crate::auth::policy::RoleRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleName {
    User,
    Moderator,
    Admin,
}

impl RoleName {
    pub const ALL: [RoleName; 3] = [RoleName::User, RoleName::Moderator, RoleName::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            RoleName::User => "user",
            RoleName::Moderator => "moderator",
            RoleName::Admin => "admin",
        }
    }

    /// Level written by the schema migration. Used by the in-memory store.
    pub fn seed_level(self) -> i32 {
        match self {
            RoleName::User => 1,
            RoleName::Moderator => 2,
            RoleName::Admin => 3,
        }
    }

    pub fn seed_description(self) -> &'static str {
        match self {
            RoleName::User => "A user can create posts and comments",
            RoleName::Moderator => "A moderator can update other users posts",
            RoleName::Admin => "An admin can update and delete other users posts",
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the role table. Higher `level` means more privilege.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub level: i32,
    #[serde(default)]
    pub description: String,
}

/// A registered account.
///
/// The password hash is never serialized: neither API responses nor cached
/// snapshots carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub role_id: i64,
    pub role: Role,
}

/// Input for [`crate::storage::UserRepository::create_and_invite`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: RoleName,
}

/// Minimal author information embedded in posts and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: 7,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            created_at: Utc::now(),
            is_active: true,
            role_id: 1,
            role: Role {
                id: 1,
                name: "user".to_string(),
                level: 1,
                description: String::new(),
            },
        }
    }

    #[test]
    fn seed_levels_are_strictly_increasing() {
        assert!(RoleName::User.seed_level() < RoleName::Moderator.seed_level());
        assert!(RoleName::Moderator.seed_level() < RoleName::Admin.seed_level());
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let json = serde_json::to_string(&sample_user()).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password_hash"));
    }

    #[test]
    fn snapshot_without_hash_deserializes() {
        let json = serde_json::to_string(&sample_user()).unwrap();
        let back: User = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 7);
        assert!(back.password_hash.is_empty());
        assert_eq!(back.role.level, 1);
    }
}
