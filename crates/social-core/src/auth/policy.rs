//! Role precedence and resource ownership.

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::model::{Role, RoleName, User};
use crate::storage::RoleRepository;

/// Role levels, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    roles: HashMap<RoleName, Role>,
}

impl RoleRegistry {
    /// Loads every [`RoleName`] from the repository.
    ///
    /// Fails with [`CoreError::MissingRole`] if any of them is absent, so a
    /// misconfigured role table stops the server instead of surfacing
    /// later as a failed permission check.
    pub async fn load(repo: &dyn RoleRepository) -> CoreResult<Self> {
        let mut roles = HashMap::new();
        for name in RoleName::ALL {
            let role = match repo.get_by_name(name.as_str()).await {
                Ok(role) => role,
                Err(CoreError::NotFound) => return Err(CoreError::MissingRole(name.to_string())),
                Err(e) => return Err(e),
            };
            tracing::debug!(role = %name, level = role.level, "loaded role");
            roles.insert(name, role);
        }
        Ok(Self { roles })
    }

    /// Builds a registry from already known roles. Missing names stay missing.
    pub fn from_roles(roles: impl IntoIterator<Item = (RoleName, Role)>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
        }
    }

    pub fn level(&self, name: RoleName) -> CoreResult<i32> {
        self.roles
            .get(&name)
            .map(|r| r.level)
            .ok_or_else(|| CoreError::MissingRole(name.to_string()))
    }
}

/// Outcome of an ownership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The user owns the resource.
    Owner,
    /// The user's role is at or above the required one.
    Privileged,
    Denied,
}

impl Access {
    pub fn is_granted(self) -> bool {
        !matches!(self, Access::Denied)
    }
}

/// Decides whether `user` may act on a resource owned by `owner_id`.
///
/// Owners always pass. Everyone else needs a role level of at least
/// `min_role`'s. An unknown `min_role` is an error, never a denial.
pub fn check_ownership(
    registry: &RoleRegistry,
    owner_id: i64,
    user: &User,
    min_role: RoleName,
) -> CoreResult<Access> {
    if owner_id == user.id {
        return Ok(Access::Owner);
    }
    let required = registry.level(min_role)?;
    if user.role.level >= required {
        Ok(Access::Privileged)
    } else {
        Ok(Access::Denied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use chrono::Utc;

    fn role(name: RoleName) -> Role {
        Role {
            id: name.seed_level() as i64,
            name: name.as_str().to_string(),
            level: name.seed_level(),
            description: String::new(),
        }
    }

    fn user_with(id: i64, name: RoleName) -> User {
        User {
            id,
            username: format!("user{id}"),
            email: format!("user{id}@example.com"),
            password_hash: String::new(),
            created_at: Utc::now(),
            is_active: true,
            role_id: name.seed_level() as i64,
            role: role(name),
        }
    }

    fn registry() -> RoleRegistry {
        RoleRegistry::from_roles(RoleName::ALL.map(|n| (n, role(n))))
    }

    #[tokio::test]
    async fn load_reads_every_role() {
        let store = MemoryStore::new();
        let registry = RoleRegistry::load(&store).await.unwrap();
        assert_eq!(registry.level(RoleName::User).unwrap(), 1);
        assert_eq!(registry.level(RoleName::Admin).unwrap(), 3);
    }

    #[tokio::test]
    async fn load_fails_on_missing_role() {
        let store = MemoryStore::with_roles(vec![role(RoleName::User), role(RoleName::Admin)]);
        let err = RoleRegistry::load(&store).await.unwrap_err();
        assert!(matches!(err, CoreError::MissingRole(ref n) if n == "moderator"));
    }

    #[test]
    fn owner_bypasses_role_check() {
        let user = user_with(7, RoleName::User);
        let access = check_ownership(&registry(), 7, &user, RoleName::Admin).unwrap();
        assert_eq!(access, Access::Owner);
    }

    #[test]
    fn below_minimum_is_denied() {
        let user = user_with(7, RoleName::User);
        let access = check_ownership(&registry(), 8, &user, RoleName::Moderator).unwrap();
        assert_eq!(access, Access::Denied);
        assert!(!access.is_granted());
    }

    #[test]
    fn at_or_above_minimum_is_allowed() {
        let moderator = user_with(7, RoleName::Moderator);
        let admin = user_with(9, RoleName::Admin);
        let reg = registry();
        assert_eq!(
            check_ownership(&reg, 8, &moderator, RoleName::Moderator).unwrap(),
            Access::Privileged
        );
        assert_eq!(
            check_ownership(&reg, 8, &admin, RoleName::Moderator).unwrap(),
            Access::Privileged
        );
        assert_eq!(
            check_ownership(&reg, 8, &moderator, RoleName::Admin).unwrap(),
            Access::Denied
        );
    }

    #[test]
    fn unknown_required_role_is_an_error() {
        let reg = RoleRegistry::from_roles([(RoleName::User, role(RoleName::User))]);
        let user = user_with(7, RoleName::Admin);
        let err = check_ownership(&reg, 8, &user, RoleName::Moderator).unwrap_err();
        assert!(matches!(err, CoreError::MissingRole(_)));
    }
}
