//! Message builder for templated notification emails

use crate::config::Config;
use crate::domain::{EmailAddress, OutboundMessage, Personalization, TemplateData};
use crate::error::Result;
use crate::router::Route;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Templates render dates in Brazilian local time
pub const TEMPLATE_TIMEZONE: Tz = chrono_tz::America::Sao_Paulo;

/// Recipient-specific inputs to a message
#[derive(Debug, Clone, Copy)]
pub struct Recipient<'a> {
    pub email: &'a str,
    pub name: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct MessageBuilder {
    timezone: Tz,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self {
            timezone: TEMPLATE_TIMEZONE,
        }
    }
}

impl MessageBuilder {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn build(
        &self,
        config: &Config,
        route: &Route,
        recipient: Recipient<'_>,
        code: &str,
    ) -> Result<OutboundMessage> {
        self.build_at(config, route, recipient, code, Utc::now())
    }

    /// Build with an explicit "now"
    pub fn build_at(
        &self,
        config: &Config,
        route: &Route,
        recipient: Recipient<'_>,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<OutboundMessage> {
        let from_email = config.require_from_email()?;
        let (date, time) = self.local_date_time(now);

        Ok(OutboundMessage {
            from: EmailAddress::new(from_email),
            subject: route.subject.clone(),
            personalizations: vec![Personalization {
                to: vec![EmailAddress::new(recipient.email)],
                dynamic_template_data: TemplateData {
                    name: recipient.name.map(str::to_string),
                    email: recipient.email.to_string(),
                    password: code.to_string(),
                    date,
                    time,
                },
            }],
            template_id: route.template_id.clone(),
        })
    }

    /// `DD/MM/YYYY` and `HH:MM` in the builder's timezone
    pub fn local_date_time(&self, now: DateTime<Utc>) -> (String, String) {
        let local = now.with_timezone(&self.timezone);
        (
            local.format("%d/%m/%Y").to_string(),
            local.format("%H:%M").to_string(),
        )
    }
}
