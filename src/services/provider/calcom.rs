use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};

use super::{DateRange, NewBooking, ProviderError, SchedulingProvider};
use crate::models::{Booking, EventType, Slot};
use crate::services::datetime::{wire_date, wire_instant};

/// Cal.com v2 REST adapter.
pub struct CalComProvider {
    api_key: String,
    username: String,
    base_url: String,
    time_zone: Tz,
    client: reqwest::Client,
}

impl CalComProvider {
    pub fn new(
        api_key: String,
        username: String,
        base_url: String,
        time_zone: Tz,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key,
            username,
            base_url: base_url.trim_end_matches('/').to_string(),
            time_zone,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        let resp = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Cal.com API error");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SchedulingProvider for CalComProvider {
    async fn find_available_slots(
        &self,
        event_type_id: &str,
        range: DateRange,
        duration_minutes: Option<u32>,
    ) -> Result<Vec<Slot>, ProviderError> {
        let mut query = vec![
            ("eventTypeId", event_type_id.to_string()),
            ("dateFrom", wire_date(range.start)),
            ("dateTo", wire_date(range.end)),
        ];
        if let Some(minutes) = duration_minutes {
            query.push(("duration", minutes.to_string()));
        }

        let data = self
            .send(self.client.get(self.url("slots")).query(&query))
            .await?;
        parse_slots(&data)
    }

    async fn create_booking(&self, booking: &NewBooking) -> Result<Booking, ProviderError> {
        let tz = self.time_zone.name();
        let event_type_id = match booking.event_type_id.parse::<i64>() {
            Ok(id) => Value::from(id),
            Err(_) => Value::from(booking.event_type_id.clone()),
        };
        let body = json!({
            "eventTypeId": event_type_id,
            "start": wire_instant(booking.start),
            "end": wire_instant(booking.end),
            "attendees": [{
                "email": booking.attendee_email,
                "name": booking.attendee_name,
                "timeZone": tz,
            }],
            "notes": booking.notes.clone().unwrap_or_default(),
            "timeZone": tz,
            "language": "en",
            "metadata": {},
        });

        let data = self
            .send(self.client.post(self.url("bookings")).json(&body))
            .await?;
        parse_booking(&data)
    }

    async fn list_bookings(&self) -> Result<Vec<Booking>, ProviderError> {
        let data = self
            .send(
                self.client
                    .get(self.url("bookings"))
                    .query(&[("user", self.username.as_str())]),
            )
            .await?;
        parse_bookings(&data)
    }

    async fn get_booking(&self, booking_id: &str) -> Result<Booking, ProviderError> {
        let data = self
            .send(self.client.get(self.url(&format!("bookings/{booking_id}"))))
            .await?;
        parse_booking(&data)
    }

    async fn cancel_booking(
        &self,
        booking_id: &str,
        reason: Option<&str>,
    ) -> Result<Booking, ProviderError> {
        let mut request = self
            .client
            .post(self.url(&format!("bookings/{booking_id}/cancel")));
        if let Some(reason) = reason {
            request = request.json(&json!({ "cancellationReason": reason }));
        }
        let data = self.send(request).await?;

        // Some API versions answer with an empty acknowledgement.
        match parse_booking(&data) {
            Ok(booking) => Ok(booking),
            Err(_) => self.get_booking(booking_id).await,
        }
    }

    async fn reschedule_booking(
        &self,
        booking_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Booking, ProviderError> {
        let body = json!({
            "start": wire_instant(start),
            "end": wire_instant(end),
        });
        let data = self
            .send(
                self.client
                    .patch(self.url(&format!("bookings/{booking_id}")))
                    .json(&body),
            )
            .await?;
        parse_booking(&data)
    }

    async fn get_event_types(&self) -> Result<Vec<EventType>, ProviderError> {
        let data = self
            .send(
                self.client
                    .get(self.url("event-types"))
                    .query(&[("username", self.username.as_str())]),
            )
            .await?;
        parse_event_types(&data)
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(e.to_string())
    }
}

/// Pulls a readable message out of an error body, falling back to the raw
/// text (truncated).
fn error_message(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        let candidates = [
            &v["error"]["message"],
            &v["message"],
            &v["error"],
            &v["data"]["message"],
        ];
        if let Some(msg) = candidates.iter().find_map(|c| c.as_str()) {
            return msg.to_string();
        }
    }
    body.chars().take(200).collect()
}

/// Strips the `{"status": "success", "data": ...}` envelope when present.
fn unwrap_data(v: &Value) -> &Value {
    match v.get("data") {
        Some(data) if !data.is_null() => data,
        _ => v,
    }
}

fn parse_slots(v: &Value) -> Result<Vec<Slot>, ProviderError> {
    let data = unwrap_data(v);
    let slots = data.get("slots").unwrap_or(data);

    let entries: Vec<&Value> = match slots {
        Value::Array(items) => items.iter().collect(),
        // Keyed by date: {"2025-10-02": [{"time": ...}, ...]}
        Value::Object(by_date) => by_date
            .values()
            .filter_map(Value::as_array)
            .flatten()
            .collect(),
        Value::Null => Vec::new(),
        other => {
            return Err(ProviderError::Decode(format!(
                "slots payload is not a list: {other}"
            )))
        }
    };

    let mut parsed: Vec<Slot> = entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(time) => serde_json::from_value(json!({ "time": time })).ok(),
            other => serde_json::from_value(other.clone()).ok(),
        })
        .collect();
    parsed.sort_by_key(|s| s.time);
    Ok(parsed)
}

fn parse_booking(v: &Value) -> Result<Booking, ProviderError> {
    let data = unwrap_data(v);
    let data = data.get("booking").unwrap_or(data);
    serde_json::from_value(data.clone()).map_err(|e| ProviderError::Decode(e.to_string()))
}

fn parse_bookings(v: &Value) -> Result<Vec<Booking>, ProviderError> {
    let data = unwrap_data(v);
    let items = match data {
        Value::Array(items) => items,
        other => match other.get("bookings") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ProviderError::Decode(
                    "bookings payload is not a list".to_string(),
                ))
            }
        },
    };

    Ok(items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Booking>(item.clone()) {
            Ok(b) => Some(b),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unparseable booking");
                None
            }
        })
        .collect())
}

fn parse_event_types(v: &Value) -> Result<Vec<EventType>, ProviderError> {
    let data = unwrap_data(v);

    let raw: Vec<&Value> = if let Some(groups) = data.get("eventTypeGroups").and_then(Value::as_array) {
        groups
            .iter()
            .filter_map(|g| g.get("eventTypes").and_then(Value::as_array))
            .flatten()
            .collect()
    } else if let Some(items) = data.as_array() {
        items.iter().collect()
    } else if let Some(items) = data
        .get("event_types")
        .or_else(|| data.get("eventTypes"))
        .and_then(Value::as_array)
    {
        items.iter().collect()
    } else {
        return Err(ProviderError::Decode(
            "event types payload has no recognizable list".to_string(),
        ));
    };

    Ok(raw
        .into_iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect())
}
