use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

pub const DEFAULT_PORT: &str = "8100";
pub const DEFAULT_SMTP_PORT: &str = "587";

pub const MASK: &str = "********";

/// The plugin's configuration record as the plugin host stores it.
///
/// Keys outside the canonical set are kept in `extra` so a load followed by a
/// save hands them back to the host unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct ConfigRecord {
    #[serde(deserialize_with = "text")]
    pub domain: String,
    #[serde(deserialize_with = "flag")]
    pub allow_signups: bool,
    #[serde(deserialize_with = "text")]
    pub admin_token: String,
    #[serde(deserialize_with = "text")]
    pub port: String,
    #[serde(deserialize_with = "text")]
    pub smtp_host: String,
    #[serde(deserialize_with = "text")]
    pub smtp_from: String,
    #[serde(deserialize_with = "text")]
    pub smtp_port: String,
    #[serde(deserialize_with = "text")]
    pub smtp_username: String,
    #[serde(deserialize_with = "text")]
    pub smtp_password: String,
    #[serde(deserialize_with = "flag")]
    pub use_sendmail: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self {
            domain: String::new(),
            allow_signups: false,
            admin_token: String::new(),
            port: DEFAULT_PORT.to_string(),
            smtp_host: String::new(),
            smtp_from: String::new(),
            smtp_port: DEFAULT_SMTP_PORT.to_string(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            use_sendmail: false,
            extra: Map::new(),
        }
    }
}

impl ConfigRecord {
    pub fn get(&self, key: FieldKey) -> FieldValue {
        match key {
            FieldKey::AllowSignups => FieldValue::Bool(self.allow_signups),
            FieldKey::UseSendmail => FieldValue::Bool(self.use_sendmail),
            _ => FieldValue::Text(self.text_slot(key).cloned().unwrap_or_default()),
        }
    }

    /// Returns a copy of this record with exactly one field replaced.
    pub fn with_field(&self, key: FieldKey, value: FieldValue) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        let expected = key.spec().kind;
        match (key, value) {
            (FieldKey::AllowSignups, FieldValue::Bool(on)) => next.allow_signups = on,
            (FieldKey::UseSendmail, FieldValue::Bool(on)) => next.use_sendmail = on,
            (_, FieldValue::Text(text)) if expected != FieldKind::Toggle => {
                if let Some(slot) = next.text_slot_mut(key) {
                    *slot = text;
                }
            }
            _ => {
                return Err(ConfigError::TypeMismatch {
                    field: key,
                    expected,
                })
            }
        }
        Ok(next)
    }

    /// Copy with every non-empty secret replaced by a mask, for printing.
    pub fn redacted(&self) -> Self {
        let mut masked = self.clone();
        for spec in FIELDS.iter().filter(|s| s.kind == FieldKind::Secret) {
            if let Some(slot) = masked.text_slot_mut(spec.key) {
                if !slot.is_empty() {
                    *slot = MASK.to_string();
                }
            }
        }
        masked
    }

    fn text_slot(&self, key: FieldKey) -> Option<&String> {
        match key {
            FieldKey::Domain => Some(&self.domain),
            FieldKey::AdminToken => Some(&self.admin_token),
            FieldKey::Port => Some(&self.port),
            FieldKey::SmtpHost => Some(&self.smtp_host),
            FieldKey::SmtpFrom => Some(&self.smtp_from),
            FieldKey::SmtpPort => Some(&self.smtp_port),
            FieldKey::SmtpUsername => Some(&self.smtp_username),
            FieldKey::SmtpPassword => Some(&self.smtp_password),
            FieldKey::AllowSignups | FieldKey::UseSendmail => None,
        }
    }

    fn text_slot_mut(&mut self, key: FieldKey) -> Option<&mut String> {
        match key {
            FieldKey::Domain => Some(&mut self.domain),
            FieldKey::AdminToken => Some(&mut self.admin_token),
            FieldKey::Port => Some(&mut self.port),
            FieldKey::SmtpHost => Some(&mut self.smtp_host),
            FieldKey::SmtpFrom => Some(&mut self.smtp_from),
            FieldKey::SmtpPort => Some(&mut self.smtp_port),
            FieldKey::SmtpUsername => Some(&mut self.smtp_username),
            FieldKey::SmtpPassword => Some(&mut self.smtp_password),
            FieldKey::AllowSignups | FieldKey::UseSendmail => None,
        }
    }
}

// Text fields arrive as strings from the form but the host may hand back
// numbers (ports) or null.
fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!("expected text, found {}", other))),
    }
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") || s.is_empty() => Ok(false),
        other => Err(de::Error::custom(format!("expected boolean, found {}", other))),
    }
}

/// Canonical field names, serialized in the host's SCREAMING_SNAKE form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldKey {
    Domain,
    AllowSignups,
    AdminToken,
    Port,
    SmtpHost,
    SmtpFrom,
    SmtpPort,
    SmtpUsername,
    SmtpPassword,
    UseSendmail,
}

impl FieldKey {
    pub const ALL: [FieldKey; 10] = [
        FieldKey::Domain,
        FieldKey::AllowSignups,
        FieldKey::AdminToken,
        FieldKey::Port,
        FieldKey::SmtpHost,
        FieldKey::SmtpFrom,
        FieldKey::SmtpPort,
        FieldKey::SmtpUsername,
        FieldKey::SmtpPassword,
        FieldKey::UseSendmail,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKey::Domain => "DOMAIN",
            FieldKey::AllowSignups => "ALLOW_SIGNUPS",
            FieldKey::AdminToken => "ADMIN_TOKEN",
            FieldKey::Port => "PORT",
            FieldKey::SmtpHost => "SMTP_HOST",
            FieldKey::SmtpFrom => "SMTP_FROM",
            FieldKey::SmtpPort => "SMTP_PORT",
            FieldKey::SmtpUsername => "SMTP_USERNAME",
            FieldKey::SmtpPassword => "SMTP_PASSWORD",
            FieldKey::UseSendmail => "USE_SENDMAIL",
        }
    }

    pub fn spec(self) -> &'static FieldSpec {
        // FIELDS is declared in variant order
        &FIELDS[self as usize]
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for FieldKey {
    type Err = ConfigError;

    /// Accepts `smtp_host`, `SMTP_HOST` and `smtp-host`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        FieldKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownField(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Secret,
    Toggle,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldKind::Text | FieldKind::Secret => "text",
            FieldKind::Toggle => "boolean",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    General,
    Email,
}

impl Section {
    pub fn title(self) -> &'static str {
        match self {
            Section::General => "General",
            Section::Email => "Email Configuration (Optional)",
        }
    }
}

/// How a field is presented: label, helper text and input kind.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub key: FieldKey,
    pub label: &'static str,
    pub helper: &'static str,
    pub kind: FieldKind,
    pub section: Section,
}

pub static FIELDS: [FieldSpec; 10] = [
    FieldSpec {
        key: FieldKey::Domain,
        label: "Domain",
        helper: "Full URL where Vaultwarden will be accessible",
        kind: FieldKind::Text,
        section: Section::General,
    },
    FieldSpec {
        key: FieldKey::AllowSignups,
        label: "Allow Signups",
        helper: "Let new users register accounts",
        kind: FieldKind::Toggle,
        section: Section::General,
    },
    FieldSpec {
        key: FieldKey::AdminToken,
        label: "Admin Token",
        helper: "Token for accessing the admin panel",
        kind: FieldKind::Secret,
        section: Section::General,
    },
    FieldSpec {
        key: FieldKey::Port,
        label: "Port",
        helper: "Port for the Vaultwarden server",
        kind: FieldKind::Text,
        section: Section::General,
    },
    FieldSpec {
        key: FieldKey::SmtpHost,
        label: "SMTP Host",
        helper: "SMTP server host",
        kind: FieldKind::Text,
        section: Section::Email,
    },
    FieldSpec {
        key: FieldKey::SmtpFrom,
        label: "SMTP From",
        helper: "Email address to send emails from",
        kind: FieldKind::Text,
        section: Section::Email,
    },
    FieldSpec {
        key: FieldKey::SmtpPort,
        label: "SMTP Port",
        helper: "SMTP server port",
        kind: FieldKind::Text,
        section: Section::Email,
    },
    FieldSpec {
        key: FieldKey::SmtpUsername,
        label: "SMTP Username",
        helper: "SMTP server username",
        kind: FieldKind::Text,
        section: Section::Email,
    },
    FieldSpec {
        key: FieldKey::SmtpPassword,
        label: "SMTP Password",
        helper: "SMTP server password",
        kind: FieldKind::Secret,
        section: Section::Email,
    },
    FieldSpec {
        key: FieldKey::UseSendmail,
        label: "Use Sendmail",
        helper: "Deliver mail through the local sendmail binary instead of SMTP",
        kind: FieldKind::Toggle,
        section: Section::Email,
    },
];

/// A single field's value: checkbox state or raw text input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Interprets command line text according to the field's kind.
    pub fn parse_for(key: FieldKey, raw: &str) -> Result<Self, ConfigError> {
        match key.spec().kind {
            FieldKind::Toggle => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(FieldValue::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(FieldValue::Bool(false)),
                _ => Err(ConfigError::InvalidValue {
                    field: key,
                    reason: format!("'{}' is not a boolean", raw),
                }),
            },
            FieldKind::Text | FieldKind::Secret => Ok(FieldValue::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// Body of `PUT /api/form/fields/:key`
#[derive(Debug, Deserialize)]
pub struct SetFieldRequest {
    pub value: FieldValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_the_host_defaults() {
        let record = ConfigRecord::default();
        assert_eq!(record.port, "8100");
        assert_eq!(record.smtp_port, "587");
        assert!(!record.allow_signups);
        assert!(!record.use_sendmail);
        assert!(record.domain.is_empty());
        assert!(record.extra.is_empty());
    }

    #[test]
    fn serializes_with_screaming_keys() {
        let value = serde_json::to_value(ConfigRecord::default()).unwrap();
        assert_eq!(value["PORT"], json!("8100"));
        assert_eq!(value["ALLOW_SIGNUPS"], json!(false));
        assert_eq!(value.as_object().unwrap().len(), FieldKey::ALL.len());
    }

    #[test]
    fn lenient_remote_body_is_normalized() {
        let record: ConfigRecord = serde_json::from_value(json!({
            "DOMAIN": "https://vault.example.com",
            "PORT": 8443,
            "SMTP_HOST": null,
            "ALLOW_SIGNUPS": "true",
            "LOG_LEVEL": "debug"
        }))
        .unwrap();

        assert_eq!(record.domain, "https://vault.example.com");
        assert_eq!(record.port, "8443");
        assert_eq!(record.smtp_host, "");
        assert!(record.allow_signups);
        assert_eq!(record.smtp_port, "587");
        assert_eq!(record.extra.get("LOG_LEVEL"), Some(&json!("debug")));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["LOG_LEVEL"], json!("debug"));
    }

    #[test]
    fn object_values_are_rejected_for_text_fields() {
        let result = serde_json::from_value::<ConfigRecord>(json!({ "DOMAIN": { "a": 1 } }));
        assert!(result.is_err());
    }

    #[test]
    fn with_field_leaves_the_original_untouched() {
        let base = ConfigRecord::default();
        let next = base
            .with_field(FieldKey::Port, FieldValue::Text("443".to_string()))
            .unwrap();

        assert_eq!(base.port, "8100");
        assert_eq!(next.port, "443");
        assert_eq!(
            next,
            ConfigRecord {
                port: "443".to_string(),
                ..ConfigRecord::default()
            }
        );
    }

    #[test]
    fn with_field_rejects_wrong_kind() {
        let err = ConfigRecord::default()
            .with_field(FieldKey::AllowSignups, FieldValue::Text("yes".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::TypeMismatch {
                field: FieldKey::AllowSignups,
                expected: FieldKind::Toggle
            }
        ));

        let err = ConfigRecord::default()
            .with_field(FieldKey::Domain, FieldValue::Bool(true))
            .unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }

    #[test]
    fn field_keys_parse_loosely() {
        assert_eq!("smtp-host".parse::<FieldKey>().unwrap(), FieldKey::SmtpHost);
        assert_eq!("ADMIN_TOKEN".parse::<FieldKey>().unwrap(), FieldKey::AdminToken);
        assert!(matches!(
            "adminToken".parse::<FieldKey>(),
            Err(ConfigError::UnknownField(_))
        ));
    }

    #[test]
    fn every_key_has_a_spec() {
        for key in FieldKey::ALL {
            assert_eq!(key.spec().key, key);
        }
    }

    #[test]
    fn parse_for_respects_kind() {
        assert_eq!(
            FieldValue::parse_for(FieldKey::UseSendmail, "on").unwrap(),
            FieldValue::Bool(true)
        );
        assert_eq!(
            FieldValue::parse_for(FieldKey::Port, "443").unwrap(),
            FieldValue::Text("443".to_string())
        );
        assert!(FieldValue::parse_for(FieldKey::AllowSignups, "maybe").is_err());
    }

    #[test]
    fn untagged_values_decode_from_json() {
        let req: SetFieldRequest = serde_json::from_value(json!({ "value": true })).unwrap();
        assert_eq!(req.value, FieldValue::Bool(true));
        let req: SetFieldRequest = serde_json::from_value(json!({ "value": "x" })).unwrap();
        assert_eq!(req.value, FieldValue::Text("x".to_string()));
    }

    #[test]
    fn redacted_masks_only_filled_secrets() {
        let record = ConfigRecord {
            admin_token: "hunter2".to_string(),
            ..ConfigRecord::default()
        };
        let masked = record.redacted();
        assert_eq!(masked.admin_token, "********");
        assert_eq!(masked.smtp_password, "");
        assert_eq!(masked.port, "8100");
    }
}
