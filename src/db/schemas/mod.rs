//! Database schemas for Agora
//!
//! Defines MongoDB document structures for users and posts.

mod metadata;
mod post;
mod user;

pub use metadata::Metadata;
pub use post::{PostDoc, PostStatus, POST_COLLECTION};
pub use user::{UserDoc, HANDLE_SIGIL, USER_COLLECTION};
