use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use social_core::model::{FeedItem, FeedParams, FeedQuery};
use social_core::{CoreError, User};

use super::parse_id;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

pub async fn activate_user(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, AppError> {
    state.storage.users.activate(&token).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<User>, AppError> {
    let user = state.storage.users.get_by_id(parse_id(&user_id)?).await?;
    Ok(Json(user))
}

pub async fn follow_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(user_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let followed_id = parse_id(&user_id)?;
    match state.storage.followers.follow(user.id, followed_id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(CoreError::UniqueViolation) => {
            Err(AppError::Conflict("you already follow this user".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn unfollow_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(user_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let followed_id = parse_id(&user_id)?;
    state.storage.followers.unfollow(user.id, followed_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn feed(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<FeedParams>,
) -> Result<Json<Vec<FeedItem>>, AppError> {
    let query =
        FeedQuery::parse(&params, Utc::now()).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let feed = state.storage.posts.user_feed(user.id, &query).await?;
    Ok(Json(feed))
}
