//! Outbound transactional email payload

use serde::Serialize;

/// Email address in the provider payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailAddress {
    pub email: String,
}

impl EmailAddress {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }
}

/// Values substituted into the registered template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    /// The plaintext verification code; the template schema calls it "password"
    pub password: String,
    /// `DD/MM/YYYY`
    pub date: String,
    /// `HH:MM`, 24-hour
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Personalization {
    pub to: Vec<EmailAddress>,
    pub dynamic_template_data: TemplateData,
}

/// Message handed once to the delivery provider
///
/// Serializes to the SendGrid v3 `mail/send` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub from: EmailAddress,
    pub subject: String,
    pub personalizations: Vec<Personalization>,
    pub template_id: String,
}

impl OutboundMessage {
    /// Recipient of the single personalization block
    pub fn recipient(&self) -> Option<&str> {
        self.personalizations
            .first()
            .and_then(|p| p.to.first())
            .map(|addr| addr.email.as_str())
    }

    /// Copy safe to write to logs, with the code replaced
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for personalization in &mut copy.personalizations {
            personalization.dynamic_template_data.password = "***".to_string();
        }
        copy
    }
}
