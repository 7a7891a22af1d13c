pub mod calcom;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{Booking, EventType, Slot};

/// Everything that can go wrong talking to the scheduling provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("scheduling provider timed out")]
    Timeout,

    #[error("could not reach scheduling provider: {0}")]
    Transport(String),

    #[error("scheduling provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response from scheduling provider: {0}")]
    Decode(String),

    #[error("no event type matches '{0}'")]
    UnknownEventType(String),
}

impl ProviderError {
    pub fn category(&self) -> &'static str {
        match self {
            ProviderError::Timeout => "timeout",
            ProviderError::Transport(_) => "transport",
            ProviderError::Decode(_) => "decode",
            ProviderError::UnknownEventType(_) => "unknown_event_type",
            ProviderError::Status { status, .. } => match status {
                400 | 422 => "invalid_request",
                401 | 403 => "unauthorized",
                404 => "not_found",
                409 => "conflict",
                429 => "rate_limited",
                500..=599 => "provider_unavailable",
                _ => "unexpected_status",
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub event_type_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendee_email: String,
    pub attendee_name: String,
    pub notes: Option<String>,
}

/// Request/response adapter over the provider's booking API.
#[async_trait]
pub trait SchedulingProvider: Send + Sync {
    async fn find_available_slots(
        &self,
        event_type_id: &str,
        range: DateRange,
        duration_minutes: Option<u32>,
    ) -> Result<Vec<Slot>, ProviderError>;

    async fn create_booking(&self, booking: &NewBooking) -> Result<Booking, ProviderError>;

    async fn list_bookings(&self) -> Result<Vec<Booking>, ProviderError>;

    async fn get_booking(&self, booking_id: &str) -> Result<Booking, ProviderError>;

    async fn cancel_booking(
        &self,
        booking_id: &str,
        reason: Option<&str>,
    ) -> Result<Booking, ProviderError>;

    async fn reschedule_booking(
        &self,
        booking_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Booking, ProviderError>;

    async fn get_event_types(&self) -> Result<Vec<EventType>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_categories() {
        let status = |s| ProviderError::Status {
            status: s,
            message: String::new(),
        };
        assert_eq!(status(409).category(), "conflict");
        assert_eq!(status(422).category(), "invalid_request");
        assert_eq!(status(503).category(), "provider_unavailable");
        assert_eq!(status(418).category(), "unexpected_status");
        assert_eq!(ProviderError::Timeout.category(), "timeout");
        assert_eq!(status(404).status(), Some(404));
        assert_eq!(ProviderError::Timeout.status(), None);
    }
}
