pub mod codes;
pub mod otp;

pub use codes::{spawn_code_cleanup_task, VerificationCodeStore};
pub use otp::{spawn_otp_cleanup_task, OtpStore};
