use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A booking as reported by the scheduling provider. Never stored locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(alias = "startTime")]
    pub start: DateTime<Utc>,
    #[serde(default, alias = "endTime")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: BookingStatus,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(
        default,
        alias = "eventTypeId",
        deserialize_with = "opt_string_or_number"
    )]
    pub event_type_id: Option<String>,
}

impl Booking {
    pub fn duration(&self) -> Option<Duration> {
        self.end
            .map(|end| end - self.start)
            .filter(|d| *d > Duration::zero())
    }

    pub fn has_attendee(&self, email: &str) -> bool {
        self.attendees
            .iter()
            .any(|a| a.email.eq_ignore_ascii_case(email.trim()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attendee {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "timeZone")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum BookingStatus {
    #[default]
    Confirmed,
    Pending,
    Cancelled,
    Rescheduled,
    Unknown,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Pending => "pending",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rescheduled => "rescheduled",
            BookingStatus::Unknown => "unknown",
        }
    }
}

impl From<String> for BookingStatus {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "confirmed" | "accepted" => BookingStatus::Confirmed,
            "cancelled" | "canceled" | "rejected" => BookingStatus::Cancelled,
            "rescheduled" => BookingStatus::Rescheduled,
            "pending" | "awaiting_host" | "unconfirmed" => BookingStatus::Pending,
            _ => BookingStatus::Unknown,
        }
    }
}

/// A bookable event category (e.g. "30 min meeting").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventType {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "lengthInMinutes")]
    pub length: Option<u32>,
}

impl EventType {
    /// Matches by slug, case-insensitive title, or title with spaces
    /// replaced by `-` or `_`.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        let title = self.title.to_lowercase();
        self.slug.as_deref().map(str::to_lowercase).as_deref() == Some(needle.as_str())
            || title == needle
            || title.replace(' ', "-") == needle
            || title.replace(' ', "_") == needle
    }
}

/// One open start time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    #[serde(alias = "start")]
    pub time: DateTime<Utc>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_calcom_booking() {
        let raw = json!({
            "id": 4821,
            "uid": "abc-123",
            "title": "30 Min Meeting between Alice and Bob",
            "startTime": "2025-10-02T21:00:00.000Z",
            "endTime": "2025-10-02T21:30:00.000Z",
            "status": "ACCEPTED",
            "eventTypeId": 77,
            "attendees": [{"email": "bob@example.com", "name": "Bob", "timeZone": "America/Los_Angeles"}]
        });
        let booking: Booking = serde_json::from_value(raw).unwrap();
        assert_eq!(booking.id, "4821");
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.event_type_id.as_deref(), Some("77"));
        assert_eq!(booking.duration(), Some(Duration::minutes(30)));
        assert!(booking.has_attendee("BOB@example.com"));
        assert!(!booking.has_attendee("carol@example.com"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(BookingStatus::from("CANCELLED".to_string()), BookingStatus::Cancelled);
        assert_eq!(BookingStatus::from("canceled".to_string()), BookingStatus::Cancelled);
        assert_eq!(BookingStatus::from("rescheduled".to_string()), BookingStatus::Rescheduled);
        assert_eq!(BookingStatus::from("weird".to_string()), BookingStatus::Unknown);
        assert_eq!(
            serde_json::to_value(BookingStatus::Cancelled).unwrap(),
            json!("cancelled")
        );
    }

    #[test]
    fn test_event_type_matching() {
        let et = EventType {
            id: "12".to_string(),
            slug: Some("lunch-meeting".to_string()),
            title: "Lunch Meeting".to_string(),
            length: Some(60),
        };
        assert!(et.matches("lunch-meeting"));
        assert!(et.matches("Lunch Meeting"));
        assert!(et.matches("lunch_meeting"));
        assert!(!et.matches("dinner"));
    }
}
