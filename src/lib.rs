//! Agora - social posting backend with staged visibility
//!
//! Posts move through a four-stage lifecycle (draft, pending, published,
//! withdrawn); private stages publish automatically after a dwell period.
//! Users carry a 0-9 trust level that gates posting, peer verification,
//! and the tiered moderation bands.
//!
//! ## Services
//!
//! - **HTTP API**: posts, users, bookmarks, verification, auth
//! - **Scheduler**: background sweep that publishes aged drafts
//! - **Verification**: in-memory code and OTP exchange with TTLs

pub mod auth;
pub mod config;
pub mod db;
pub mod routes;
pub mod scheduler;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{AgoraError, Result};
