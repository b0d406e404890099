//! Domain types for the custom email sender

pub mod event;
pub mod mask;
pub mod message;

pub use event::{TriggerEvent, TriggerRequest, TriggerSource};
pub use mask::mask_email;
pub use message::{EmailAddress, OutboundMessage, Personalization, TemplateData};
