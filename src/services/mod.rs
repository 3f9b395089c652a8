//! Services layer - Business logic
//!
//! Services implement the application's rules on top of the repositories:
//! - Accounts, sessions, activation and password reset
//! - Posts, tags and roles
//! - Outgoing mail and profile picture storage
//!
//! Each service returns its own error enum; the HTTP layer maps them to
//! API errors.

pub mod avatar;
pub mod email;
pub mod password;
pub mod post;
pub mod role;
pub mod tag;
pub mod token;
pub mod user;

pub use avatar::{AvatarError, AvatarStore};
pub use email::{mailer_from_config, LogMailer, MailService, Mailer, OutgoingMail, SmtpMailer};
pub use password::{hash_password, verify_password};
pub use post::{PostEditForm, PostService, PostServiceError};
pub use role::{RoleService, RoleServiceError};
pub use tag::{parse_tags, TagService, TagServiceError};
pub use token::TokenSigner;
pub use user::{FollowCounts, LoginInput, RegisterInput, UserService, UserServiceError};
