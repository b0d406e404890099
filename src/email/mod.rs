//! Email delivery for the custom email sender
//!
//! - Message building from trigger routes
//! - SendGrid dynamic-template delivery

pub mod builder;
pub mod provider;
pub mod sendgrid;

pub use builder::{MessageBuilder, Recipient};
pub use provider::{DeliveryReceipt, EmailProvider, EmailProviderError};
pub use sendgrid::SendGridEmailProvider;
