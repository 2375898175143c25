use axum::extract::{Path, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::parse_id;
use crate::error::AppError;
use crate::state::AppState;

/// Loads the post named by the `{postID}` path segment into request
/// extensions. Unknown posts are `404`.
pub async fn load_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let post_id = parse_id(&post_id)?;
    let post = state.storage.posts.get_by_id(post_id).await?;
    req.extensions_mut().insert(post);
    Ok(next.run(req).await)
}
