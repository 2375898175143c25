use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use social_core::model::{Comment, NewComment, NewPost, Post};

use crate::auth::AuthUser;
use crate::dto::*;
use crate::error::AppError;
use crate::state::AppState;

pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidJson(body): ValidJson<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    let post = state
        .storage
        .posts
        .create(NewPost {
            title: body.title,
            content: body.content,
            tags: body.tags,
            user_id: user.id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    Extension(mut post): Extension<Post>,
) -> Result<Json<Post>, AppError> {
    post.comments = state.storage.comments.get_by_post_id(post.id).await?;
    Ok(Json(post))
}

/// Saves the given fields. A concurrent edit makes the stored version
/// move on and this one fail with `404`.
pub async fn update_post(
    State(state): State<AppState>,
    Extension(mut post): Extension<Post>,
    ValidJson(body): ValidJson<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    if let Some(title) = body.title {
        post.title = title;
    }
    if let Some(content) = body.content {
        post.content = content;
    }
    let updated = state.storage.posts.update(&post).await?;
    Ok(Json(updated))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(post): Extension<Post>,
) -> Result<StatusCode, AppError> {
    state.storage.posts.delete(post.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Extension(post): Extension<Post>,
    ValidJson(body): ValidJson<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let comment = state
        .storage
        .comments
        .create(NewComment {
            post_id: post.id,
            user_id: user.id,
            content: body.content,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
