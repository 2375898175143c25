use async_trait::async_trait;
use sqlx::Row;

use super::{timed, PgStore};
use crate::error::CoreResult;
use crate::model::Role;
use crate::storage::RoleRepository;

#[async_trait]
impl RoleRepository for PgStore {
    async fn get_by_name(&self, name: &str) -> CoreResult<Role> {
        let row = timed(
            sqlx::query("SELECT id, name, level, description FROM roles WHERE name = $1")
                .bind(name)
                .fetch_one(&self.pool),
        )
        .await?;

        Ok(Role {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            level: row.try_get("level")?,
            description: row
                .try_get::<Option<String>, _>("description")?
                .unwrap_or_default(),
        })
    }
}
