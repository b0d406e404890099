//! Configuration management for the custom email sender
//!
//! The configuration is read once when the Lambda container starts. Values
//! are kept optional here and checked by the step that needs them, so a
//! missing variable fails the invocation at the same point the trigger
//! contract expects it to.

use crate::error::{AppError, Result};
use std::env;
use std::fmt;

const DEFAULT_SENDGRID_API_BASE: &str = "https://api.sendgrid.com/v3";
const DEFAULT_SENDGRID_TIMEOUT_SECS: u64 = 30;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Sender address used for every outbound email (`FROM_EMAIL`)
    pub from_email: Option<String>,
    /// SendGrid delivery configuration
    pub sendgrid: SendGridConfig,
    /// KMS key identifiers used to decrypt verification codes
    pub kms: KmsConfig,
    /// Template ids and subjects per trigger family
    pub templates: TemplatesConfig,
    /// Logging configuration
    pub telemetry: TelemetryConfig,
}

#[derive(Clone)]
pub struct SendGridConfig {
    pub api_key: Option<String>,
    /// Base URL of the v3 API (e.g., https://api.sendgrid.com/v3)
    pub api_base: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for SendGridConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendGridConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct KmsConfig {
    /// Key id or ARN that wrapped the code (`KEY_ID`)
    pub key_id: Option<String>,
    /// Alias used as the keyring generator (`KEY_ALIAS`)
    pub key_alias: Option<String>,
}

/// A template id and subject pair
#[derive(Debug, Clone, Default)]
pub struct TemplateConfig {
    pub template_id: Option<String>,
    pub subject: Option<String>,
}

impl TemplateConfig {
    /// Both values, if both are configured
    pub fn pair(&self) -> Option<(&str, &str)> {
        match (&self.template_id, &self.subject) {
            (Some(template_id), Some(subject)) => Some((template_id, subject)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemplatesConfig {
    pub sign_up: TemplateConfig,
    pub forgot_password: TemplateConfig,
    pub login: TemplateConfig,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "json" (CloudWatch) or "pretty"
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "json".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let timeout_secs = match get("SENDGRID_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                AppError::Configuration(format!("Invalid SENDGRID_TIMEOUT_SECS: {}", raw))
            })?,
            None => DEFAULT_SENDGRID_TIMEOUT_SECS,
        };

        Ok(Self {
            from_email: get("FROM_EMAIL"),
            sendgrid: SendGridConfig {
                api_key: get("SENDGRID_API_KEY"),
                api_base: get("SENDGRID_API_BASE")
                    .map(|base| base.trim().trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_SENDGRID_API_BASE.to_string()),
                timeout_secs,
            },
            kms: KmsConfig {
                key_id: get("KEY_ID"),
                key_alias: get("KEY_ALIAS"),
            },
            templates: TemplatesConfig {
                sign_up: TemplateConfig {
                    template_id: get("SIGN_UP_TEMPLATE_ID"),
                    subject: get("SIGN_UP_SUBJECT"),
                },
                forgot_password: TemplateConfig {
                    template_id: get("FORGOT_PASSWORD_TEMPLATE_ID"),
                    subject: get("FORGOT_PASSWORD_SUBJECT"),
                },
                login: TemplateConfig {
                    template_id: get("LOGIN_TEMPLATE_ID"),
                    subject: get("LOGIN_SUBJECT"),
                },
            },
            telemetry: TelemetryConfig {
                log_format: get("LOG_FORMAT")
                    .map(|format| format.to_lowercase())
                    .unwrap_or_else(|| "json".to_string()),
            },
        })
    }

    pub fn require_sendgrid_api_key(&self) -> Result<&str> {
        self.sendgrid
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Configuration("SendGrid API key not found".to_string()))
    }

    pub fn require_key_id(&self) -> Result<&str> {
        self.kms
            .key_id
            .as_deref()
            .ok_or_else(|| AppError::Configuration("Cannot decrypt code: KEY_ID not set".to_string()))
    }

    pub fn require_from_email(&self) -> Result<&str> {
        self.from_email
            .as_deref()
            .ok_or_else(|| AppError::Configuration("From email not found".to_string()))
    }
}
