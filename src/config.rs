//! Configuration for Agora
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Agora - social posting backend with staged post visibility
#[derive(Parser, Debug, Clone)]
#[command(name = "agora")]
#[command(about = "Social posting backend with staged visibility and tiered trust levels")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:4000")]
    pub listen: SocketAddr,

    /// Enable development mode (default JWT secret, verbose errors)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "agora")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "86400")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Interval between publication sweeps, in seconds
    #[arg(long, env = "SWEEP_INTERVAL_SECONDS", default_value = "60")]
    pub sweep_interval_seconds: u64,

    /// Age after which a draft/pending post is published, in seconds
    #[arg(long, env = "PUBLISH_THRESHOLD_SECONDS", default_value = "10800")]
    pub publish_threshold_seconds: u64,

    /// Verification code time-to-live, in seconds
    #[arg(long, env = "CODE_TTL_SECONDS", default_value = "86400")]
    pub code_ttl_seconds: u64,

    /// OTP time-to-live, in seconds
    #[arg(long, env = "OTP_TTL_SECONDS", default_value = "600")]
    pub otp_ttl_seconds: u64,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Option<String> {
        if self.dev_mode {
            Some(
                self.jwt_secret
                    .clone()
                    .unwrap_or_else(|| "dev-mode-secret-not-for-production-use-123456".to_string()),
            )
        } else {
            self.jwt_secret.clone()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.sweep_interval_seconds == 0 {
            return Err("SWEEP_INTERVAL_SECONDS must be greater than zero".to_string());
        }

        if self.publish_threshold_seconds == 0 {
            return Err("PUBLISH_THRESHOLD_SECONDS must be greater than zero".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["agora", "--dev-mode"])
    }

    #[test]
    fn test_dev_mode_default_secret() {
        let args = base_args();
        assert!(args.jwt_secret().is_some());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_production_requires_secret() {
        let args = Args::parse_from(["agora"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["agora", "--jwt-secret", "a-secret-at-least-32-chars-long!!"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let args = Args::parse_from(["agora", "--dev-mode", "--sweep-interval-seconds", "0"]);
        assert!(args.validate().is_err());
    }
}
