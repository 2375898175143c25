pub mod ownership;
pub mod post_context;
pub mod rate_limit;
