use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use social_core::model::{Post, RoleName};
use social_core::check_ownership;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Lets the post's author through, or anyone whose role is at least
/// `min_role`. Runs after [`require_auth`] and [`load_post`].
///
/// [`require_auth`]: crate::auth::middleware::require_auth
/// [`load_post`]: crate::middleware::post_context::load_post
pub async fn require_owner_or_role(
    State((state, min_role)): State<(AppState, RoleName)>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let AuthUser(user) = req
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or(AppError::Unauthorized)?;
    let owner_id = req
        .extensions()
        .get::<Post>()
        .map(|p| p.user_id)
        .ok_or_else(|| AppError::Internal("ownership check without a loaded post".to_string()))?;

    let access = check_ownership(&state.roles, owner_id, &user, min_role)?;
    if !access.is_granted() {
        tracing::warn!(user_id = user.id, owner_id, required = %min_role, "ownership check failed");
        return Err(AppError::Forbidden);
    }
    tracing::debug!(user_id = user.id, ?access, "ownership check passed");
    Ok(next.run(req).await)
}
