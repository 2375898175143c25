use axum::extract::State;
use axum::Json;

use crate::dto::HealthResponse;
use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        env: state.config.env.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
