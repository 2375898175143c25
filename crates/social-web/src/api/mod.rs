mod auth_handlers;
mod health;
mod posts;
mod users;

use std::time::Duration;

use axum::handler::Handler;
use axum::http::{header, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use axum::Router;
use social_core::model::RoleName;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::middleware::{require_auth, require_basic_auth};
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::middleware::ownership::require_owner_or_role;
use crate::middleware::post_context::load_post;
use crate::middleware::rate_limit::rate_limit;
use crate::state::AppState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Parses a numeric path id.
pub fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("invalid id: {raw}")))
}

/// Routes that need no bearer token.
fn public_router(state: &AppState) -> Router<AppState> {
    let health = Router::new()
        .route("/health", get(health::health))
        .route_layer(from_fn_with_state(state.clone(), require_basic_auth));

    Router::new()
        .route("/authentication/user", post(auth_handlers::register_user))
        .route("/authentication/token", post(auth_handlers::create_token))
        .route("/users/activate/{token}", put(users::activate_user))
        .merge(health)
}

/// Routes behind [`require_auth`]. Post routes additionally load the post,
/// and mutations check ownership.
fn protected_router(state: &AppState) -> Router<AppState> {
    let moderator = from_fn_with_state((state.clone(), RoleName::Moderator), require_owner_or_role);
    let admin = from_fn_with_state((state.clone(), RoleName::Admin), require_owner_or_role);

    let post_routes = Router::new()
        .route(
            "/posts/{postID}",
            get(posts::get_post)
                .patch(posts::update_post.layer(moderator))
                .delete(posts::delete_post.layer(admin)),
        )
        .route("/posts/{postID}/comments", post(posts::create_comment))
        .route_layer(from_fn_with_state(state.clone(), load_post));

    Router::new()
        .route("/users/feed", get(users::feed))
        .route("/users/{userID}", get(users::get_user))
        .route("/users/{userID}/follow", put(users::follow_user))
        .route("/users/{userID}/unfollow", put(users::unfollow_user))
        .route("/posts", post(posts::create_post))
        .merge(post_routes)
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(300));

    if config.cors_allowed_origin.is_empty() {
        return cors;
    }
    match config.cors_allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(
                "Ignoring invalid CORS origin {:?}",
                config.cors_allowed_origin
            );
            cors
        }
    }
}

/// The full application: `/v1` routes plus the global layer stack.
///
/// The rate limiter is only installed when `state.limiter` is set.
pub fn app(state: AppState) -> Router {
    let v1 = public_router(&state).merge(protected_router(&state));

    let mut router = Router::new()
        .nest("/v1", v1)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    if let Some(limiter) = state.limiter.clone() {
        router = router.layer(from_fn_with_state(limiter, rate_limit));
    }

    router
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use social_core::auth::{Authenticator, RoleRegistry, UserResolver};
    use social_core::cache::MemoryUserCache;
    use social_core::model::{NewPost, NewUser, User};
    use social_core::ratelimit::{FixedWindowLimiter, Limiter, RateLimitConfig};
    use social_core::storage::memory::MemoryStore;
    use social_core::storage::PostRepository;
    use social_core::Storage;
    use tower::ServiceExt; // For `oneshot`

    use super::*;
    use crate::mail::{LogMailer, Mailer, WelcomeVars};
    use crate::middleware::rate_limit::build_limiter;

    const SECRET: &str = "a-test-secret-that-is-long-enough-for-hs256";

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(
            &self,
            _template: &str,
            _username: &str,
            _email: &str,
            _vars: &WelcomeVars,
            _sandbox: bool,
        ) -> anyhow::Result<u16> {
            anyhow::bail!("provider unavailable")
        }
    }

    struct Harness {
        app: Router,
        store: Arc<MemoryStore>,
        authenticator: Arc<Authenticator>,
    }

    struct Options {
        config: ServerConfig,
        limiter: Option<Arc<dyn Limiter>>,
        mailer: Arc<dyn Mailer>,
    }

    impl Default for Options {
        fn default() -> Self {
            let mut config = ServerConfig::default();
            config.auth.token.secret = SECRET.to_string();
            Self {
                config,
                limiter: None,
                mailer: Arc::new(LogMailer::new("noreply@example.com")),
            }
        }
    }

    async fn harness_with(options: Options) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let storage = Storage::from_memory(store.clone());
        let token = &options.config.auth.token;
        let authenticator = Arc::new(Authenticator::new(
            &token.secret,
            &token.issuer,
            token.audience(),
            token.ttl(),
        ));
        let cache = Arc::new(MemoryUserCache::new(Duration::from_secs(60)));
        let roles = RoleRegistry::load(storage.roles.as_ref()).await.unwrap();

        let state = AppState {
            config: Arc::new(options.config),
            users: UserResolver::new(storage.users.clone(), cache),
            storage,
            authenticator: authenticator.clone(),
            roles: Arc::new(roles),
            limiter: options.limiter,
            mailer: options.mailer,
        };

        Harness {
            app: app(state),
            store,
            authenticator,
        }
    }

    async fn harness() -> Harness {
        harness_with(Options::default()).await
    }

    impl Harness {
        fn user(&self, name: &str, role: RoleName) -> (User, String) {
            let user = self
                .store
                .insert_user(
                    NewUser {
                        username: name.to_string(),
                        email: format!("{name}@example.com"),
                        password_hash: String::new(),
                        role,
                    },
                    true,
                )
                .unwrap();
            let token = self.authenticator.issue(user.id).unwrap();
            (user, token)
        }

        async fn post_by(&self, user: &User) -> i64 {
            PostRepository::create(
                self.store.as_ref(),
                NewPost {
                    title: "hello".to_string(),
                    content: "world".to_string(),
                    tags: vec!["intro".to_string()],
                    user_id: user.id,
                },
            )
            .await
            .unwrap()
            .id
        }

        async fn send(&self, req: Request<Body>) -> Response {
            self.app.clone().oneshot(req).await.unwrap()
        }
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_open_without_basic_credentials() {
        let h = harness().await;
        let response = h.send(request(Method::GET, "/v1/health", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["env"], "development");
    }

    #[tokio::test]
    async fn health_requires_basic_auth_when_configured() {
        let mut options = Options::default();
        options.config.auth.basic.user = "ops".to_string();
        options.config.auth.basic.pass = "hunter2".to_string();
        let h = harness_with(options).await;

        let response = h.send(request(Method::GET, "/v1/health", None, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let wrong = Request::builder()
            .uri("/v1/health")
            .header(header::AUTHORIZATION, format!("Basic {}", STANDARD.encode("ops:nope")))
            .body(Body::empty())
            .unwrap();
        assert_eq!(h.send(wrong).await.status(), StatusCode::UNAUTHORIZED);

        let right = Request::builder()
            .uri("/v1/health")
            .header(header::AUTHORIZATION, format!("Basic {}", STANDARD.encode("ops:hunter2")))
            .body(Body::empty())
            .unwrap();
        assert_eq!(h.send(right).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bad_authorization_headers_are_unauthorized() {
        let h = harness().await;
        for value in ["", "Bearer", "Token abc", "Bearer a b", "Bearer not-a-jwt"] {
            let mut builder = Request::builder().uri("/v1/users/feed");
            if !value.is_empty() {
                builder = builder.header(header::AUTHORIZATION, value);
            }
            let response = h.send(builder.body(Body::empty()).unwrap()).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "header {value:?}");
            let body = json_body(response).await;
            assert_eq!(body["error"], "unauthorized");
        }
    }

    #[tokio::test]
    async fn token_from_other_secret_is_unauthorized() {
        let h = harness().await;
        let (user, _) = h.user("alice", RoleName::User);
        let other = Authenticator::new(
            "some-other-secret-of-sufficient-length!!",
            "socialapi",
            "socialapi",
            Duration::from_secs(60),
        );
        let token = other.issue(user.id).unwrap();
        let response = h
            .send(request(Method::GET, "/v1/users/feed", Some(&token), None))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_numeric_subject_is_unauthorized() {
        let h = harness().await;
        let mut claims = h.authenticator.claims_for(1, chrono::Utc::now());
        claims.sub = "alice".to_string();
        let token = h.authenticator.generate_token(&claims).unwrap();
        let response = h
            .send(request(Method::GET, "/v1/users/feed", Some(&token), None))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_for_missing_user_is_not_found() {
        let h = harness().await;
        let token = h.authenticator.issue(4242).unwrap();
        let response = h
            .send(request(Method::GET, "/v1/users/feed", Some(&token), None))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn valid_token_attaches_user() {
        let h = harness().await;
        let (user, token) = h.user("alice", RoleName::User);
        let response = h
            .send(request(
                Method::POST,
                "/v1/posts",
                Some(&token),
                Some(json!({"title": "first", "content": "hello", "tags": ["a"]})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["user_id"], user.id);
        assert_eq!(body["version"], 0);
    }

    #[tokio::test]
    async fn invalid_post_payload_is_bad_request() {
        let h = harness().await;
        let (_, token) = h.user("alice", RoleName::User);
        let response = h
            .send(request(
                Method::POST,
                "/v1/posts",
                Some(&token),
                Some(json!({"title": "", "content": "hello"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let malformed = Request::builder()
            .method(Method::POST)
            .uri("/v1/posts")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        assert_eq!(h.send(malformed).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_post_is_not_found() {
        let h = harness().await;
        let (_, token) = h.user("alice", RoleName::User);
        let response = h
            .send(request(Method::GET, "/v1/posts/999", Some(&token), None))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = h
            .send(request(Method::GET, "/v1/posts/abc", Some(&token), None))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn owner_may_update_own_post() {
        let h = harness().await;
        let (author, token) = h.user("alice", RoleName::User);
        let post_id = h.post_by(&author).await;

        let response = h
            .send(request(
                Method::PATCH,
                &format!("/v1/posts/{post_id}"),
                Some(&token),
                Some(json!({"title": "edited"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["title"], "edited");
        assert_eq!(body["content"], "world");
        assert_eq!(body["version"], 1);
    }

    #[tokio::test]
    async fn role_below_minimum_is_forbidden() {
        let h = harness().await;
        let (author, _) = h.user("alice", RoleName::User);
        let (_, other) = h.user("bob", RoleName::User);
        let post_id = h.post_by(&author).await;

        let response = h
            .send(request(
                Method::PATCH,
                &format!("/v1/posts/{post_id}"),
                Some(&other),
                Some(json!({"title": "hijacked"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error"], "forbidden");
    }

    #[tokio::test]
    async fn role_at_or_above_minimum_is_allowed() {
        let h = harness().await;
        let (author, _) = h.user("alice", RoleName::User);
        let (_, moderator) = h.user("mod", RoleName::Moderator);
        let (_, admin) = h.user("root", RoleName::Admin);
        let post_id = h.post_by(&author).await;
        let uri = format!("/v1/posts/{post_id}");

        let response = h
            .send(request(Method::PATCH, &uri, Some(&moderator), Some(json!({"content": "moderated"}))))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        // Deleting needs admin.
        let response = h.send(request(Method::DELETE, &uri, Some(&moderator), None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = h.send(request(Method::DELETE, &uri, Some(&admin), None)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = h.send(request(Method::GET, &uri, Some(&admin), None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn comments_are_returned_with_post() {
        let h = harness().await;
        let (author, token) = h.user("alice", RoleName::User);
        let post_id = h.post_by(&author).await;

        let response = h
            .send(request(
                Method::POST,
                &format!("/v1/posts/{post_id}/comments"),
                Some(&token),
                Some(json!({"content": "first!"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = h
            .send(request(Method::GET, &format!("/v1/posts/{post_id}"), Some(&token), None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["comments"][0]["content"], "first!");
        assert_eq!(body["comments"][0]["author"]["username"], "alice");
    }

    #[tokio::test]
    async fn follow_twice_conflicts_and_feed_includes_followed() {
        let h = harness().await;
        let (_, me) = h.user("alice", RoleName::User);
        let (friend, _) = h.user("bob", RoleName::User);
        h.post_by(&friend).await;
        let uri = format!("/v1/users/{}/follow", friend.id);

        let response = h.send(request(Method::PUT, &uri, Some(&me), None)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = h.send(request(Method::PUT, &uri, Some(&me), None)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = h
            .send(request(Method::GET, "/v1/users/feed?sort=asc&limit=5", Some(&me), None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["total_comments"], 0);

        let unfollow = format!("/v1/users/{}/unfollow", friend.id);
        let response = h.send(request(Method::PUT, &unfollow, Some(&me), None)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = h
            .send(request(Method::GET, "/v1/users/feed", Some(&me), None))
            .await;
        assert!(json_body(response).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_feed_params_are_bad_request() {
        let h = harness().await;
        let (_, token) = h.user("alice", RoleName::User);
        for query in ["limit=50", "offset=-1", "sort=sideways", "tags=a,b,c,d,e,f"] {
            let response = h
                .send(request(Method::GET, &format!("/v1/users/feed?{query}"), Some(&token), None))
                .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "query {query}");
        }
    }

    #[tokio::test]
    async fn get_user_hides_password_hash() {
        let h = harness().await;
        let (user, token) = h.user("alice", RoleName::Moderator);
        let response = h
            .send(request(Method::GET, &format!("/v1/users/{}", user.id), Some(&token), None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["username"], "alice");
        assert_eq!(body["role"]["name"], "moderator");
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn register_activate_and_login() {
        let h = harness().await;
        let credentials = json!({"email": "carol@example.com", "password": "s3cret-pass"});

        let response = h
            .send(request(
                Method::POST,
                "/v1/authentication/user",
                None,
                Some(json!({
                    "username": "carol",
                    "email": "carol@example.com",
                    "password": "s3cret-pass"
                })),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["is_active"], false);
        let activation = body["token"].as_str().unwrap().to_string();

        // Inactive users cannot log in.
        let response = h
            .send(request(Method::POST, "/v1/authentication/token", None, Some(credentials.clone())))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = h
            .send(request(Method::PUT, &format!("/v1/users/activate/{activation}"), None, None))
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = h
            .send(request(Method::POST, "/v1/authentication/token", None, Some(credentials)))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let token = json_body(response).await["token"].as_str().unwrap().to_string();

        let response = h
            .send(request(Method::GET, "/v1/users/feed", Some(&token), None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let wrong = json!({"email": "carol@example.com", "password": "not-the-password"});
        let response = h
            .send(request(Method::POST, "/v1/authentication/token", None, Some(wrong)))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_activation_token_is_not_found() {
        let h = harness().await;
        let response = h
            .send(request(Method::PUT, "/v1/users/activate/nope", None, None))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_registration_is_bad_request() {
        let h = harness().await;
        h.user("alice", RoleName::User);
        let response = h
            .send(request(
                Method::POST,
                "/v1/authentication/user",
                None,
                Some(json!({
                    "username": "alice2",
                    "email": "alice@example.com",
                    "password": "whatever"
                })),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn failed_welcome_mail_rolls_back_user() {
        let h = harness_with(Options {
            mailer: Arc::new(FailingMailer),
            ..Options::default()
        })
        .await;

        let response = h
            .send(request(
                Method::POST,
                "/v1/authentication/user",
                None,
                Some(json!({
                    "username": "dave",
                    "email": "dave@example.com",
                    "password": "whatever"
                })),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(h.store.pending_invitations(), 0);
        // The email is free again.
        h.user("dave", RoleName::User);
    }

    #[tokio::test]
    async fn rate_limiter_denies_over_limit() {
        let limiter: Arc<dyn Limiter> = Arc::new(FixedWindowLimiter::new(2, Duration::from_secs(5)));
        let h = harness_with(Options {
            limiter: Some(limiter),
            ..Options::default()
        })
        .await;

        let from = |ip: &'static str| {
            Request::builder()
                .uri("/v1/health")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };

        assert_eq!(h.send(from("10.0.0.1")).await.status(), StatusCode::OK);
        assert_eq!(h.send(from("10.0.0.1")).await.status(), StatusCode::OK);
        let denied = h.send(from("10.0.0.1")).await;
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(denied.headers()[header::RETRY_AFTER], "5");

        // Other clients have their own window.
        assert_eq!(h.send(from("10.0.0.2")).await.status(), StatusCode::OK);
    }

    fn health_from(ip: &'static str) -> Request<Body> {
        Request::builder()
            .uri("/v1/health")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn disabled_rate_limit_config_lets_every_request_through() {
        let config = RateLimitConfig {
            enabled: false,
            requests_per_window: 3,
            ..RateLimitConfig::default()
        };
        let limiter = build_limiter(&config);
        assert!(limiter.is_none());

        let h = harness_with(Options {
            limiter,
            ..Options::default()
        })
        .await;
        for _ in 0..config.requests_per_window + 5 {
            assert_eq!(h.send(health_from("10.0.0.9")).await.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn enabled_rate_limit_config_denies_request_past_the_limit() {
        let config = RateLimitConfig {
            enabled: true,
            requests_per_window: 3,
            window_seconds: 7,
            ..RateLimitConfig::default()
        };
        let limiter = build_limiter(&config);
        assert!(limiter.is_some());

        let h = harness_with(Options {
            limiter,
            ..Options::default()
        })
        .await;
        for _ in 0..config.requests_per_window {
            assert_eq!(h.send(health_from("10.0.0.8")).await.status(), StatusCode::OK);
        }
        let denied = h.send(health_from("10.0.0.8")).await;
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(denied.headers()[header::RETRY_AFTER], "7");
    }
}
