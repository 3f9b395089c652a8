//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one entity or relation.

pub mod follow;
pub mod post;
pub mod role;
pub mod session;
pub mod tag;
pub mod user;

pub use follow::{FollowRepository, SqlxFollowRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use role::{RoleRepository, SqlxRoleRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};
