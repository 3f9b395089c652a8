//! Data models
//!
//! Database entities (User, Role, Post, Tag, Session), listing filters and
//! pagination containers.

mod pagination;
mod post;
pub mod role;
mod session;
mod tag;
mod user;

pub use pagination::{ListParams, PagedResult};
pub use post::{
    AuthorSummary, CreatePostInput, Post, PostQuery, PostScope, PostWithMeta, UpdatePostInput,
};
pub use role::Role;
pub use session::Session;
pub use tag::{Tag, TagWithCount};
pub use user::{AdminUpdateUserInput, UpdateProfileInput, User, DEFAULT_IMAGE, PROFILE_PICS_URL};
