//! Custom email sender for a Cognito user pool
//!
//! Decrypts the verification code the identity provider sends with each
//! custom-email trigger, picks a SendGrid dynamic template for the trigger
//! source and delivers the message.

pub mod config;
pub mod crypto;
pub mod domain;
pub mod email;
pub mod error;
pub mod handler;
pub mod router;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use handler::Handler;
