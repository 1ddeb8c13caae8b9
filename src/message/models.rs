use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::entity::User;
use crate::shared::ChatError;

/// Timestamp as it appears on the wire: epoch millis or formatted text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    Text(String),
}

/// How a raw timestamp should be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampFormat {
    /// Milliseconds since the epoch, as live realtime traffic sends it
    UnixMillis,
    /// RFC 3339, as history and search results send it
    Rfc3339,
    /// A chrono `strftime` pattern without zone, read as UTC
    Pattern(String),
}

impl TimestampFormat {
    pub fn parse(&self, raw: &RawTimestamp) -> Result<DateTime<Utc>, ChatError> {
        let invalid = || ChatError::Payload(format!("timestamp {:?} does not match {:?}", raw, self));

        match (self, raw) {
            (TimestampFormat::UnixMillis, RawTimestamp::Millis(millis)) => {
                Utc.timestamp_millis_opt(*millis).single().ok_or_else(invalid)
            }
            (TimestampFormat::UnixMillis, RawTimestamp::Text(text)) => {
                let millis: i64 = text.trim().parse().map_err(|_| invalid())?;
                Utc.timestamp_millis_opt(millis).single().ok_or_else(invalid)
            }
            (TimestampFormat::Rfc3339, RawTimestamp::Text(text)) => DateTime::parse_from_rfc3339(text)
                .map(|time| time.with_timezone(&Utc))
                .map_err(|_| invalid()),
            (TimestampFormat::Pattern(pattern), RawTimestamp::Text(text)) => {
                NaiveDateTime::parse_from_str(text, pattern)
                    .map(|naive| naive.and_utc())
                    .map_err(|_| invalid())
            }
            _ => Err(invalid()),
        }
    }
}

/// Message record as published by the realtime backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: String,
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub time: Option<RawTimestamp>,
    #[serde(default)]
    pub raw: String,
    #[serde(default)]
    pub corrects: Option<String>,
    #[serde(default)]
    pub links: Vec<Value>,
    #[serde(default)]
    pub files: Vec<Value>,
}

impl RawMessage {
    /// Decodes a bus payload into a raw message
    pub fn from_payload(payload: Value) -> Result<Self, ChatError> {
        Ok(serde_json::from_value(payload)?)
    }
}

/// A normalized chat message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub oid: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub time: DateTime<Utc>,
    pub raw: String,
    /// Replacement body; supersedes `raw` for display when non-empty
    pub correction_raw: Option<String>,
    /// Id of the message this one corrects
    pub corrects: Option<String>,
    pub links: Vec<Value>,
    pub files: Vec<Value>,
    pub user: Option<Arc<User>>,
    pub is_historical: bool,
    pub start_of_block: bool,
    pub end_of_block: bool,
}

impl Message {
    /// True when the message carries a correction body or points at a corrected message
    pub fn is_corrected(&self) -> bool {
        non_empty(&self.correction_raw).is_some() || non_empty(&self.corrects).is_some()
    }

    /// Body to display: the correction when present, else the raw body
    pub fn content(&self) -> &str {
        non_empty(&self.correction_raw).unwrap_or(self.raw.as_str())
    }

    /// Copy of this message with `correction` superseding its body
    pub fn with_correction(&self, correction: impl Into<String>) -> Message {
        Message {
            correction_raw: Some(correction.into()),
            ..self.clone()
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
