use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;

use super::{author_from_row, timed, PgStore};
use crate::error::{CoreError, CoreResult};
use crate::model::{FeedItem, FeedQuery, NewPost, Post};
use crate::storage::PostRepository;

fn post_from_row(row: &PgRow) -> Result<Post, sqlx::Error> {
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        user_id: row.try_get("user_id")?,
        tags: row.try_get("tags")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
        comments: Vec::new(),
        author: None,
    })
}

#[async_trait]
impl PostRepository for PgStore {
    async fn get_by_id(&self, id: i64) -> CoreResult<Post> {
        let row = timed(
            sqlx::query(
                "SELECT id, user_id, title, content, tags, created_at, updated_at, version \
                 FROM posts WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(post_from_row(&row)?)
    }

    async fn create(&self, post: NewPost) -> CoreResult<Post> {
        let row = timed(
            sqlx::query(
                "INSERT INTO posts (content, title, user_id, tags) VALUES ($1, $2, $3, $4) \
                 RETURNING id, user_id, title, content, tags, created_at, updated_at, version",
            )
            .bind(&post.content)
            .bind(&post.title)
            .bind(post.user_id)
            .bind(&post.tags)
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(post_from_row(&row)?)
    }

    async fn update(&self, post: &Post) -> CoreResult<Post> {
        let row = timed(
            sqlx::query(
                "UPDATE posts SET title = $1, content = $2, version = version + 1, updated_at = now() \
                 WHERE id = $3 AND version = $4 \
                 RETURNING version, updated_at",
            )
            .bind(&post.title)
            .bind(&post.content)
            .bind(post.id)
            .bind(post.version)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(CoreError::NotFound)?;

        Ok(Post {
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
            ..post.clone()
        })
    }

    async fn delete(&self, id: i64) -> CoreResult<()> {
        let result = timed(
            sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    async fn user_feed(&self, user_id: i64, query: &FeedQuery) -> CoreResult<Vec<FeedItem>> {
        // ORDER BY direction cannot be bound; it comes from a closed enum.
        let sql = format!(
            "SELECT p.id, p.user_id, p.title, p.content, p.tags, p.created_at, p.updated_at, p.version, \
                    u.username, COUNT(c.id) AS comments_count \
             FROM posts p \
             LEFT JOIN comments c ON c.post_id = p.id \
             LEFT JOIN users u ON p.user_id = u.id \
             WHERE (p.user_id = $1 OR p.user_id IN (SELECT user_id FROM followers WHERE follower_id = $1)) \
               AND (p.title ILIKE '%' || $4 || '%' OR p.content ILIKE '%' || $4 || '%') \
               AND (cardinality($5::text[]) = 0 OR p.tags @> $5::text[]) \
               AND ($6::timestamptz IS NULL OR p.created_at >= $6) \
               AND ($7::timestamptz IS NULL OR p.created_at <= $7) \
             GROUP BY p.id, u.username \
             ORDER BY p.created_at {} \
             LIMIT $2 OFFSET $3",
            query.sort.as_sql()
        );

        let rows = timed(
            sqlx::query(&sql)
                .bind(user_id)
                .bind(query.limit)
                .bind(query.offset)
                .bind(&query.search)
                .bind(&query.tags)
                .bind(query.since)
                .bind(query.until)
                .fetch_all(&self.pool),
        )
        .await?;

        rows.iter()
            .map(|row| {
                let mut post = post_from_row(row)?;
                post.author = Some(author_from_row(row, "user_id")?);
                Ok(FeedItem {
                    post,
                    total_comments: row.try_get("comments_count")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(CoreError::from)
    }
}
