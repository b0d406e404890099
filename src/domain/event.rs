//! Cognito custom email sender trigger event

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle event that caused the invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerSource {
    /// Account created by an administrator
    AdminCreateUser,
    /// Self-service sign-up
    SignUp,
    ForgotPassword,
    ResendCode,
    /// Login notification
    PostAuthentication,
    /// Any tag this handler does not act on, kept verbatim
    Other(String),
}

impl TriggerSource {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AdminCreateUser => "CustomEmailSender_AdminCreateUser",
            Self::SignUp => "CustomEmailSender_SignUp",
            Self::ForgotPassword => "CustomEmailSender_ForgotPassword",
            Self::ResendCode => "CustomEmailSender_ResendCode",
            Self::PostAuthentication => "PostAuthentication_Authentication",
            Self::Other(tag) => tag,
        }
    }

    /// Whether the event is expected to carry a verification code
    pub fn expects_code(&self) -> bool {
        !matches!(self, Self::PostAuthentication)
    }
}

impl From<String> for TriggerSource {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "CustomEmailSender_AdminCreateUser" => Self::AdminCreateUser,
            "CustomEmailSender_SignUp" => Self::SignUp,
            "CustomEmailSender_ForgotPassword" => Self::ForgotPassword,
            "CustomEmailSender_ResendCode" => Self::ResendCode,
            "PostAuthentication_Authentication" => Self::PostAuthentication,
            _ => Self::Other(tag),
        }
    }
}

impl From<TriggerSource> for String {
    fn from(source: TriggerSource) -> Self {
        match source {
            TriggerSource::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `request` section of the trigger event
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    /// Encrypted, base64-encoded verification code
    ///
    /// The outer `Option` records whether the key was present at all, so an
    /// explicit `"code": null` is written back as `null`.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub code: Option<Option<String>>,

    #[serde(default)]
    pub user_attributes: BTreeMap<String, String>,

    /// Fields this handler does not read (`type`, `clientMetadata`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Event delivered by the identity provider and returned unchanged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub trigger_source: TriggerSource,

    #[serde(default)]
    pub request: TriggerRequest,

    /// `version`, `region`, `userPoolId`, `userName`, `callerContext`, `response`, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TriggerEvent {
    pub fn new(trigger_source: TriggerSource) -> Self {
        Self {
            trigger_source,
            request: TriggerRequest::default(),
            extra: Map::new(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.request.code = Some(Some(code.into()));
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.user_attributes.insert(name.into(), value.into());
        self
    }

    /// The encrypted code, if one was sent (empty strings count as absent)
    pub fn code(&self) -> Option<&str> {
        self.request
            .code
            .as_ref()
            .and_then(Option::as_deref)
            .filter(|code| !code.is_empty())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.request.user_attributes.get(name).map(String::as_str)
    }

    pub fn email(&self) -> Option<&str> {
        self.attribute("email")
    }

    pub fn name(&self) -> Option<&str> {
        self.attribute("name")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event() -> Value {
        json!({
            "version": "1",
            "triggerSource": "CustomEmailSender_SignUp",
            "region": "sa-east-1",
            "userPoolId": "sa-east-1_EXAMPLE",
            "userName": "4f1c2f0e-0000-4000-8000-000000000000",
            "callerContext": {
                "awsSdkVersion": "aws-sdk-unknown-unknown",
                "clientId": "example-client"
            },
            "request": {
                "type": "customEmailSenderRequestV1",
                "code": "AYADeBgrZ29vZGNvZGU=",
                "clientMetadata": {},
                "userAttributes": {
                    "sub": "4f1c2f0e-0000-4000-8000-000000000000",
                    "email": "john.doe@example.com",
                    "name": "John Doe"
                }
            },
            "response": {}
        })
    }

    #[test]
    fn test_trigger_source_parsing() {
        let cases = [
            ("CustomEmailSender_AdminCreateUser", TriggerSource::AdminCreateUser),
            ("CustomEmailSender_SignUp", TriggerSource::SignUp),
            ("CustomEmailSender_ForgotPassword", TriggerSource::ForgotPassword),
            ("CustomEmailSender_ResendCode", TriggerSource::ResendCode),
            ("PostAuthentication_Authentication", TriggerSource::PostAuthentication),
        ];
        for (tag, expected) in cases {
            let source = TriggerSource::from(tag.to_string());
            assert_eq!(source, expected);
            assert_eq!(source.as_str(), tag);
        }
    }

    #[test]
    fn test_unknown_trigger_source_round_trips() {
        let source = TriggerSource::from("CustomEmailSender_UpdateUserAttribute".to_string());
        assert_eq!(
            source,
            TriggerSource::Other("CustomEmailSender_UpdateUserAttribute".to_string())
        );
        assert_eq!(String::from(source), "CustomEmailSender_UpdateUserAttribute");
    }

    #[test]
    fn test_only_post_authentication_skips_code() {
        assert!(!TriggerSource::PostAuthentication.expects_code());
        assert!(TriggerSource::SignUp.expects_code());
        assert!(TriggerSource::Other("x".to_string()).expects_code());
    }

    #[test]
    fn test_event_deserialization() {
        let event: TriggerEvent = serde_json::from_value(sample_event()).unwrap();
        assert_eq!(event.trigger_source, TriggerSource::SignUp);
        assert_eq!(event.code(), Some("AYADeBgrZ29vZGNvZGU="));
        assert_eq!(event.email(), Some("john.doe@example.com"));
        assert_eq!(event.name(), Some("John Doe"));
        assert_eq!(event.extra["userPoolId"], "sa-east-1_EXAMPLE");
    }

    #[test]
    fn test_event_serialization_preserves_unknown_fields() {
        let raw = sample_event();
        let event: TriggerEvent = serde_json::from_value(raw.clone()).unwrap();
        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_null_code_round_trips() {
        let raw = json!({
            "version": "1",
            "triggerSource": "PostAuthentication_Authentication",
            "request": {
                "type": "customEmailSenderRequestV1",
                "code": null,
                "userAttributes": {
                    "email": "john.doe@example.com"
                }
            },
            "response": {}
        });
        let event: TriggerEvent = serde_json::from_value(raw.clone()).unwrap();
        assert!(event.code().is_none());
        assert_eq!(event.request.code, Some(None));

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back, raw);
        assert!(back["request"].as_object().unwrap().contains_key("code"));
    }

    #[test]
    fn test_missing_code_stays_missing() {
        let raw = json!({
            "triggerSource": "PostAuthentication_Authentication",
            "request": { "userAttributes": {} }
        });
        let event: TriggerEvent = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(event.request.code, None);
        assert_eq!(serde_json::to_value(&event).unwrap(), raw);
    }

    #[test]
    fn test_empty_code_counts_as_absent() {
        let event = TriggerEvent::new(TriggerSource::SignUp).with_code("");
        assert!(event.code().is_none());
    }
}
