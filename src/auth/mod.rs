//! Authentication and authorization for Agora
//!
//! Provides:
//! - JWT token generation and validation
//! - Password hashing with Argon2
//! - Trust levels and the tiered authorization policy
//! - The post visibility filter applied on every read path

pub mod jwt;
pub mod password;
pub mod policy;
pub mod visibility;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, TokenValidationResult};
pub use password::{hash_password, verify_password};
pub use policy::{
    authorize_post_action, check_level_edit, level_edit_band, listing_band, LevelBand, PostAction,
    TrustLevel,
};
pub use visibility::{author_feed_filter, can_view, list_filter};
