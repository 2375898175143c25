//! Domain entities shared by the storage, cache and HTTP layers.

pub mod feed;
pub mod post;
pub mod user;

pub use feed::{FeedParams, FeedQuery, FeedQueryError, SortOrder};
pub use post::{Comment, FeedItem, NewComment, NewPost, Post};
pub use user::{Author, NewUser, Role, RoleName, User};
