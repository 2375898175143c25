//! In-process repositories.
//!
//! Mirrors the PostgreSQL backend closely enough for handler tests and for
//! running the server without a database: unique emails and usernames,
//! optimistic post versions, invitation expiry and the feed filters.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    hash_token, CommentRepository, FollowerRepository, PostRepository, RoleRepository,
    UserRepository,
};
use crate::error::{CoreError, CoreResult};
use crate::model::{
    Author, Comment, FeedItem, FeedQuery, NewComment, NewPost, NewUser, Post, Role, RoleName,
    SortOrder, User,
};

struct Invitation {
    user_id: i64,
    expiry: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    next_id: i64,
    roles: Vec<Role>,
    users: BTreeMap<i64, User>,
    invitations: HashMap<String, Invitation>,
    posts: BTreeMap<i64, Post>,
    comments: Vec<Comment>,
    /// (followed, follower)
    follows: HashSet<(i64, i64)>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn author(&self, user_id: i64) -> CoreResult<Author> {
        let user = self.users.get(&user_id).ok_or(CoreError::NotFound)?;
        Ok(Author {
            id: user.id,
            username: user.username.clone(),
        })
    }

    fn insert_user(&mut self, user: NewUser, active: bool) -> CoreResult<User> {
        if self.users.values().any(|u| u.email == user.email) {
            return Err(CoreError::DuplicateEmail);
        }
        if self.users.values().any(|u| u.username == user.username) {
            return Err(CoreError::DuplicateUsername);
        }
        let role = self
            .roles
            .iter()
            .find(|r| r.name == user.role.as_str())
            .cloned()
            .ok_or_else(|| CoreError::MissingRole(user.role.to_string()))?;

        let id = self.next_id();
        let created = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: Utc::now(),
            is_active: active,
            role_id: role.id,
            role,
        };
        self.users.insert(id, created.clone());
        Ok(created)
    }
}

/// Thread-safe in-memory implementation of every repository trait.
pub struct MemoryStore {
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with the default role table.
    pub fn new() -> Self {
        let roles = RoleName::ALL
            .iter()
            .zip(1..)
            .map(|(name, id)| Role {
                id,
                name: name.as_str().to_string(),
                level: name.seed_level(),
                description: name.seed_description().to_string(),
            })
            .collect();
        Self::with_roles(roles)
    }

    /// Creates an empty store with a custom role table.
    pub fn with_roles(roles: Vec<Role>) -> Self {
        Self {
            state: Mutex::new(State {
                roles,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a user directly, skipping the invitation flow.
    pub fn insert_user(&self, user: NewUser, active: bool) -> CoreResult<User> {
        self.lock().insert_user(user, active)
    }

    /// Stores an invitation with an explicit expiry.
    pub fn insert_invitation(&self, token_hash: &str, user_id: i64, expiry: DateTime<Utc>) {
        self.lock()
            .invitations
            .insert(token_hash.to_string(), Invitation { user_id, expiry });
    }

    pub fn pending_invitations(&self) -> usize {
        self.lock().invitations.len()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get_by_id(&self, id: i64) -> CoreResult<User> {
        self.lock().users.get(&id).cloned().ok_or(CoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> CoreResult<User> {
        self.lock()
            .users
            .values()
            .find(|u| u.email == email && u.is_active)
            .cloned()
            .ok_or(CoreError::NotFound)
    }

    async fn create_and_invite(
        &self,
        user: NewUser,
        token_hash: &str,
        invitation_ttl: Duration,
    ) -> CoreResult<User> {
        let ttl = chrono::Duration::from_std(invitation_ttl)
            .map_err(|e| CoreError::Database(sqlx::Error::Protocol(e.to_string())))?;
        let mut state = self.lock();
        let created = state.insert_user(user, false)?;
        state.invitations.insert(
            token_hash.to_string(),
            Invitation {
                user_id: created.id,
                expiry: Utc::now() + ttl,
            },
        );
        Ok(created)
    }

    async fn activate(&self, token: &str) -> CoreResult<()> {
        let mut state = self.lock();
        let user_id = state
            .invitations
            .get(&hash_token(token))
            .filter(|inv| inv.expiry > Utc::now())
            .map(|inv| inv.user_id)
            .ok_or(CoreError::NotFound)?;

        let user = state.users.get_mut(&user_id).ok_or(CoreError::NotFound)?;
        user.is_active = true;
        state.invitations.retain(|_, inv| inv.user_id != user_id);
        Ok(())
    }

    async fn delete(&self, id: i64) -> CoreResult<()> {
        let mut state = self.lock();
        state.invitations.retain(|_, inv| inv.user_id != id);
        state.users.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn get_by_name(&self, name: &str) -> CoreResult<Role> {
        self.lock()
            .roles
            .iter()
            .find(|r| r.name == name)
            .cloned()
            .ok_or(CoreError::NotFound)
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn get_by_id(&self, id: i64) -> CoreResult<Post> {
        self.lock().posts.get(&id).cloned().ok_or(CoreError::NotFound)
    }

    async fn create(&self, post: NewPost) -> CoreResult<Post> {
        let mut state = self.lock();
        let id = state.next_id();
        let now = Utc::now();
        let created = Post {
            id,
            title: post.title,
            content: post.content,
            user_id: post.user_id,
            tags: post.tags,
            created_at: now,
            updated_at: now,
            version: 0,
            comments: Vec::new(),
            author: None,
        };
        state.posts.insert(id, created.clone());
        Ok(created)
    }

    async fn update(&self, post: &Post) -> CoreResult<Post> {
        let mut state = self.lock();
        let stored = state
            .posts
            .get_mut(&post.id)
            .filter(|p| p.version == post.version)
            .ok_or(CoreError::NotFound)?;

        stored.title = post.title.clone();
        stored.content = post.content.clone();
        stored.version += 1;
        stored.updated_at = Utc::now();

        Ok(Post {
            version: stored.version,
            updated_at: stored.updated_at,
            ..post.clone()
        })
    }

    async fn delete(&self, id: i64) -> CoreResult<()> {
        let mut state = self.lock();
        state.posts.remove(&id).ok_or(CoreError::NotFound)?;
        state.comments.retain(|c| c.post_id != id);
        Ok(())
    }

    async fn user_feed(&self, user_id: i64, query: &FeedQuery) -> CoreResult<Vec<FeedItem>> {
        let state = self.lock();
        let search = query.search.to_lowercase();

        let mut posts: Vec<&Post> = state
            .posts
            .values()
            .filter(|p| p.user_id == user_id || state.follows.contains(&(p.user_id, user_id)))
            .filter(|p| {
                search.is_empty()
                    || p.title.to_lowercase().contains(&search)
                    || p.content.to_lowercase().contains(&search)
            })
            .filter(|p| query.tags.iter().all(|t| p.tags.contains(t)))
            .filter(|p| query.since.map_or(true, |since| p.created_at >= since))
            .filter(|p| query.until.map_or(true, |until| p.created_at <= until))
            .collect();

        posts.sort_by_key(|p| (p.created_at, p.id));
        if query.sort == SortOrder::Desc {
            posts.reverse();
        }

        posts
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(0))
            .take(usize::try_from(query.limit).unwrap_or(0))
            .map(|p| {
                let mut post = p.clone();
                post.author = state.author(p.user_id).ok();
                let total_comments = state.comments.iter().filter(|c| c.post_id == p.id).count();
                Ok(FeedItem {
                    post,
                    total_comments: total_comments as i64,
                })
            })
            .collect()
    }
}

#[async_trait]
impl CommentRepository for MemoryStore {
    async fn create(&self, comment: NewComment) -> CoreResult<Comment> {
        let mut state = self.lock();
        let author = state.author(comment.user_id)?;
        let id = state.next_id();
        let created = Comment {
            id,
            post_id: comment.post_id,
            user_id: comment.user_id,
            content: comment.content,
            created_at: Utc::now(),
            author,
        };
        state.comments.push(created.clone());
        Ok(created)
    }

    async fn get_by_post_id(&self, post_id: i64) -> CoreResult<Vec<Comment>> {
        let state = self.lock();
        let mut comments: Vec<Comment> = state
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(comments)
    }
}

#[async_trait]
impl FollowerRepository for MemoryStore {
    async fn follow(&self, follower_id: i64, followed_id: i64) -> CoreResult<()> {
        let mut state = self.lock();
        if !state.follows.insert((followed_id, follower_id)) {
            return Err(CoreError::UniqueViolation);
        }
        Ok(())
    }

    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> CoreResult<()> {
        self.lock().follows.remove(&(followed_id, follower_id));
        Ok(())
    }
}
