use std::sync::Arc;

use social_core::auth::{Authenticator, RoleRegistry, UserResolver};
use social_core::ratelimit::Limiter;
use social_core::Storage;

use crate::config::ServerConfig;
use crate::mail::Mailer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub storage: Storage,
    pub authenticator: Arc<Authenticator>,
    pub users: UserResolver,
    pub roles: Arc<RoleRegistry>,
    /// `None` when rate limiting is disabled; no layer is installed then.
    pub limiter: Option<Arc<dyn Limiter>>,
    pub mailer: Arc<dyn Mailer>,
}
