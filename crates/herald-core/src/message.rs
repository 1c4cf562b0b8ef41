use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CreateError;

/// Opaque structured payload forwarded verbatim to the callback.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A scheduled unit of work. This is both the stored record and what the
/// delivery workers receive.
///
/// Field names on disk follow the HTTP API (`scheduleTo`, `webhookUrl`) so
/// records stay readable by operators inspecting the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    #[serde(rename = "scheduleTo", with = "fire_at_format")]
    pub fire_at: DateTime<FixedOffset>,
    pub payload: Payload,
    #[serde(rename = "webhookUrl")]
    pub callback_url: String,
    /// Assigned on every create. Identifies this version of the message so
    /// cleanup never deletes a record that was superseded mid-delivery.
    #[serde(default)]
    pub revision: Uuid,
}

impl Message {
    /// Generate a new UUIDv7 revision.
    pub fn new_revision() -> Uuid {
        Uuid::now_v7()
    }
}

/// An unvalidated create request, as received from a caller.
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub id: String,
    pub schedule_to: String,
    pub callback_url: String,
    pub payload: Payload,
}

impl ScheduleRequest {
    /// Validate the request and turn it into a message with a fresh revision.
    pub fn into_message(self) -> Result<Message, CreateError> {
        if self.id.is_empty() {
            return Err(CreateError::InvalidId);
        }
        let fire_at = parse_fire_at(&self.schedule_to)
            .ok_or_else(|| CreateError::InvalidTimestamp(self.schedule_to.clone()))?;
        Ok(Message {
            id: self.id,
            fire_at,
            payload: self.payload,
            callback_url: self.callback_url,
            revision: Message::new_revision(),
        })
    }
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 fire time.
///
/// Offset-aware forms keep their offset. Forms without an offset are taken
/// as UTC.
pub fn parse_fire_at(raw: &str) -> Option<DateTime<FixedOffset>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc().fixed_offset());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

mod fire_at_format {
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &DateTime<FixedOffset>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<FixedOffset>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_fire_at(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
