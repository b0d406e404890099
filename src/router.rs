//! Trigger router: picks the template and subject for a trigger source

use crate::config::{TemplateConfig, TemplatesConfig};
use crate::domain::{mask_email, TriggerSource};
use crate::error::{AppError, Result};
use tracing::info;

/// Template and subject chosen for a trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Short label used in logs
    pub kind: &'static str,
    pub template_id: String,
    pub subject: String,
}

#[derive(Debug, Clone, Copy)]
struct TemplatePair<'a> {
    template_id: &'a str,
    subject: &'a str,
}

impl<'a> TemplatePair<'a> {
    fn from_config(config: &'a TemplateConfig, what: &str) -> Result<Self> {
        let (template_id, subject) = config.pair().ok_or_else(|| {
            AppError::Configuration(format!("Data to create {} email is missing", what))
        })?;
        Ok(Self {
            template_id,
            subject,
        })
    }
}

/// Router over a fully validated set of template pairs
#[derive(Debug, Clone, Copy)]
pub struct TriggerRouter<'a> {
    sign_up: TemplatePair<'a>,
    forgot_password: TemplatePair<'a>,
    login: TemplatePair<'a>,
}

impl<'a> TriggerRouter<'a> {
    /// Fails unless all three template pairs are configured, whatever the trigger
    pub fn from_config(templates: &'a TemplatesConfig) -> Result<Self> {
        Ok(Self {
            sign_up: TemplatePair::from_config(&templates.sign_up, "sign up")?,
            forgot_password: TemplatePair::from_config(
                &templates.forgot_password,
                "forgot password",
            )?,
            login: TemplatePair::from_config(&templates.login, "login")?,
        })
    }

    /// `None` means the trigger is not handled and nothing should be sent.
    pub fn route(&self, source: &TriggerSource, recipient: &str) -> Option<Route> {
        let masked = mask_email(recipient);

        let (kind, template_id, subject) = match source {
            TriggerSource::AdminCreateUser => {
                ("admin create user", self.sign_up.template_id, self.sign_up.subject)
            }
            // The sign-up subject is read from the template id variable.
            TriggerSource::SignUp => (
                "sign up",
                self.sign_up.template_id,
                self.sign_up.template_id,
            ),
            TriggerSource::ForgotPassword => (
                "forgot password",
                self.forgot_password.template_id,
                self.forgot_password.subject,
            ),
            TriggerSource::ResendCode => (
                "resend code",
                self.forgot_password.template_id,
                self.forgot_password.subject,
            ),
            TriggerSource::PostAuthentication => {
                ("login", self.login.template_id, self.login.subject)
            }
            TriggerSource::Other(tag) => {
                info!(trigger_source = %tag, recipient = %masked, "Unhandled event type");
                return None;
            }
        };

        info!(
            trigger_source = %source,
            recipient = %masked,
            template_id = %template_id,
            "Sending {} email",
            kind
        );

        Some(Route {
            kind,
            template_id: template_id.to_string(),
            subject: subject.to_string(),
        })
    }
}
