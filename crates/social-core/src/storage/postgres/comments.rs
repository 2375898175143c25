use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;

use super::{author_from_row, timed, PgStore};
use crate::error::{CoreError, CoreResult};
use crate::model::{Comment, NewComment};
use crate::storage::CommentRepository;

fn comment_from_row(row: &PgRow) -> Result<Comment, sqlx::Error> {
    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        user_id: row.try_get("user_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        author: author_from_row(row, "user_id")?,
    })
}

#[async_trait]
impl CommentRepository for PgStore {
    async fn create(&self, comment: NewComment) -> CoreResult<Comment> {
        let row = timed(
            sqlx::query(
                "WITH inserted AS ( \
                     INSERT INTO comments (post_id, user_id, content) VALUES ($1, $2, $3) \
                     RETURNING id, post_id, user_id, content, created_at \
                 ) \
                 SELECT i.id, i.post_id, i.user_id, i.content, i.created_at, u.username \
                 FROM inserted i JOIN users u ON u.id = i.user_id",
            )
            .bind(comment.post_id)
            .bind(comment.user_id)
            .bind(&comment.content)
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(comment_from_row(&row)?)
    }

    async fn get_by_post_id(&self, post_id: i64) -> CoreResult<Vec<Comment>> {
        let rows = timed(
            sqlx::query(
                "SELECT c.id, c.post_id, c.user_id, c.content, c.created_at, u.username \
                 FROM comments c JOIN users u ON u.id = c.user_id \
                 WHERE c.post_id = $1 \
                 ORDER BY c.created_at DESC",
            )
            .bind(post_id)
            .fetch_all(&self.pool),
        )
        .await?;

        rows.iter()
            .map(comment_from_row)
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(CoreError::from)
    }
}
