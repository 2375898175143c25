use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Postgres, Transaction};

use super::{timed, user_from_row, PgStore, USER_COLUMNS};
use crate::error::{CoreError, CoreResult};
use crate::model::{NewUser, User};
use crate::storage::{hash_token, UserRepository};

#[async_trait]
impl UserRepository for PgStore {
    async fn get_by_id(&self, id: i64) -> CoreResult<User> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users u JOIN roles r ON u.role_id = r.id WHERE u.id = $1"
        );
        let row = timed(sqlx::query(&query).bind(id).fetch_one(&self.pool)).await?;
        Ok(user_from_row(&row)?)
    }

    async fn get_by_email(&self, email: &str) -> CoreResult<User> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users u JOIN roles r ON u.role_id = r.id \
             WHERE u.email = $1 AND u.is_active = true"
        );
        let row = timed(sqlx::query(&query).bind(email).fetch_one(&self.pool)).await?;
        Ok(user_from_row(&row)?)
    }

    async fn create_and_invite(
        &self,
        user: NewUser,
        token_hash: &str,
        invitation_ttl: Duration,
    ) -> CoreResult<User> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = timed(
            sqlx::query_scalar(
                "INSERT INTO users (username, password, email, role_id) \
                 VALUES ($1, $2, $3, (SELECT id FROM roles WHERE name = $4)) \
                 RETURNING id",
            )
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.email)
            .bind(user.role.as_str())
            .fetch_one(&mut *tx),
        )
        .await?;

        let ttl = chrono::Duration::from_std(invitation_ttl)
            .map_err(|e| CoreError::Database(sqlx::Error::Protocol(e.to_string())))?;
        timed(
            sqlx::query("INSERT INTO user_invitations (token, user_id, expiry) VALUES ($1, $2, $3)")
                .bind(token_hash)
                .bind(id)
                .bind(Utc::now() + ttl)
                .execute(&mut *tx),
        )
        .await?;

        tx.commit().await?;
        self.get_by_id(id).await
    }

    async fn activate(&self, token: &str) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let user_id: Option<i64> = timed(
            sqlx::query_scalar(
                "SELECT u.id FROM users u JOIN user_invitations ui ON u.id = ui.user_id \
                 WHERE ui.token = $1 AND ui.expiry > $2",
            )
            .bind(hash_token(token))
            .bind(Utc::now())
            .fetch_optional(&mut *tx),
        )
        .await?;
        let user_id = user_id.ok_or(CoreError::NotFound)?;

        timed(
            sqlx::query("UPDATE users SET is_active = true WHERE id = $1")
                .bind(user_id)
                .execute(&mut *tx),
        )
        .await?;
        delete_invitations(&mut tx, user_id).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;

        delete_invitations(&mut tx, id).await?;
        timed(
            sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&mut *tx),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

async fn delete_invitations(tx: &mut Transaction<'_, Postgres>, user_id: i64) -> CoreResult<()> {
    timed(
        sqlx::query("DELETE FROM user_invitations WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut **tx),
    )
    .await?;
    Ok(())
}
