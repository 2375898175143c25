//! Authentication and authorization building blocks.
//!
//! - [`token`]: JWT issuance and validation.
//! - [`password`]: Argon2 password hashing.
//! - [`policy`]: role registry and ownership checks.
//! - [`resolve`]: cache-aside user lookup.

pub mod password;
pub mod policy;
pub mod resolve;
pub mod token;

pub use policy::{check_ownership, Access, RoleRegistry};
pub use resolve::UserResolver;
pub use token::{Authenticator, Claims, TokenError};
