use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use social_core::auth::password;
use social_core::model::{NewUser, RoleName};
use social_core::storage::hash_token;
use social_core::CoreError;

use crate::dto::*;
use crate::error::AppError;
use crate::mail::{WelcomeVars, USER_WELCOME_TEMPLATE};
use crate::state::AppState;

/// Registers an inactive user and mails them an activation link.
///
/// If the mail cannot be sent the user is deleted again.
pub async fn register_user(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<RegisterUserRequest>,
) -> Result<(StatusCode, Json<UserWithToken>), AppError> {
    let plain = body.password;
    let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    let token = uuid::Uuid::new_v4().to_string();
    let user = state
        .storage
        .users
        .create_and_invite(
            NewUser {
                username: body.username,
                email: body.email,
                password_hash,
                role: RoleName::User,
            },
            &hash_token(&token),
            state.config.mail.invitation_ttl(),
        )
        .await?;

    let vars = WelcomeVars {
        username: user.username.clone(),
        activation_url: format!("{}/confirm/{}", state.config.frontend_url, token),
    };
    let sandbox = !state.config.is_production();
    match state
        .mailer
        .send(USER_WELCOME_TEMPLATE, &user.username, &user.email, &vars, sandbox)
        .await
    {
        Ok(status) => tracing::info!(user_id = user.id, status, "welcome mail sent"),
        Err(e) => {
            tracing::error!(user_id = user.id, "sending welcome mail failed: {e:#}");
            if let Err(e) = state.storage.users.delete(user.id).await {
                tracing::error!(user_id = user.id, "rolling back user failed: {e}");
            }
            return Err(AppError::Internal(format!("welcome mail: {e:#}")));
        }
    }

    Ok((StatusCode::CREATED, Json(UserWithToken { user, token })))
}

/// Exchanges email and password for a bearer token.
pub async fn create_token(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<CreateTokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    let user = match state.storage.users.get_by_email(&body.email).await {
        Ok(user) => user,
        Err(CoreError::NotFound) => return Err(AppError::Unauthorized),
        Err(e) => return Err(e.into()),
    };

    let hash = user.password_hash.clone();
    let plain = body.password;
    let valid = tokio::task::spawn_blocking(move || password::verify_password(&hash, &plain))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    if !valid {
        tracing::warn!(user_id = user.id, "failed login attempt");
        return Err(AppError::Unauthorized);
    }

    let token = state
        .authenticator
        .issue(user.id)
        .map_err(CoreError::from)?;
    tracing::info!(user_id = user.id, "token issued");

    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}
