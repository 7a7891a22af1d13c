use std::time::Duration;

use chrono::Duration as ChronoDuration;
use chrono_tz::Tz;
use serde_json::{json, Value};

use crate::models::{Booking, BookingStatus, EventType, OperationRequest, Slot};
use crate::services::datetime::{display_date, display_instant, wire_date, wire_instant};
use crate::services::identity::KnownEmails;
use crate::services::operations::{
    CancelBookingArgs, CreateBookingArgs, EventTypeRef, FindSlotsArgs, Operation, RescheduleArgs,
    ValidationError,
};
use crate::services::provider::{NewBooking, ProviderError, SchedulingProvider};

const DEFAULT_DURATION_MINUTES: i64 = 30;

/// Why an operation produced no data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl OperationError {
    pub fn kind(&self) -> &'static str {
        match self {
            OperationError::Validation(_) => "validation",
            OperationError::Provider(_) => "provider",
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            OperationError::Validation(e) => e.category(),
            OperationError::Provider(e) => e.category(),
        }
    }

    /// Function-result payload the model narrates from.
    pub fn to_payload(&self) -> Value {
        let mut error = json!({
            "kind": self.kind(),
            "category": self.category(),
            "message": self.to_string(),
        });
        if let OperationError::Provider(e) = self {
            if let Some(status) = e.status() {
                error["status"] = json!(status);
            }
        }
        json!({ "error": error })
    }
}

pub type OperationResult = Result<Value, OperationError>;

/// Runs validated operations against the scheduling provider.
pub struct Dispatcher<'a> {
    provider: &'a dyn SchedulingProvider,
    tz: Tz,
    timeout: Duration,
}

impl<'a> Dispatcher<'a> {
    pub fn new(provider: &'a dyn SchedulingProvider, tz: Tz, timeout: Duration) -> Self {
        Self {
            provider,
            tz,
            timeout,
        }
    }

    /// Validates and executes one request. Validation failures never reach
    /// the provider; provider calls are bounded by the timeout.
    pub async fn run(&self, request: &OperationRequest, known: &KnownEmails) -> OperationResult {
        let op = Operation::parse(request, known, self.tz)?;
        let kind = op.kind();

        match tokio::time::timeout(self.timeout, self.execute(op)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(op = kind.as_str(), "scheduling provider call timed out");
                Err(ProviderError::Timeout.into())
            }
        }
    }

    async fn execute(&self, op: Operation) -> OperationResult {
        match op {
            Operation::FindAvailableSlots(args) => self.find_available_slots(args).await,
            Operation::CreateBooking(args) => self.create_booking(args).await,
            Operation::GetUserBookings(args) => {
                let bookings: Vec<Booking> = self
                    .provider
                    .list_bookings()
                    .await?
                    .into_iter()
                    .filter(|b| b.has_attendee(&args.attendee_email))
                    .collect();
                Ok(json!({
                    "attendee_email": args.attendee_email,
                    "count": bookings.len(),
                    "bookings": bookings.iter().map(|b| self.booking_payload(b)).collect::<Vec<_>>(),
                }))
            }
            Operation::CancelBooking(args) => self.cancel_booking(args).await,
            Operation::RescheduleBooking(args) => self.reschedule_booking(args).await,
            Operation::GetEventTypes => {
                let event_types = self.provider.get_event_types().await?;
                Ok(json!({
                    "count": event_types.len(),
                    "event_types": event_types.iter().map(event_type_payload).collect::<Vec<_>>(),
                }))
            }
        }
    }

    async fn find_available_slots(&self, args: FindSlotsArgs) -> OperationResult {
        let event_type_id = self.resolve_event_type(&args.event_type).await?.id;
        let slots = self
            .provider
            .find_available_slots(&event_type_id, args.range, args.duration_minutes)
            .await?;

        Ok(json!({
            "event_type_id": event_type_id,
            "date_from": wire_date(args.range.start),
            "date_to": wire_date(args.range.end),
            "date_from_display": display_date(args.range.start),
            "date_to_display": display_date(args.range.end),
            "count": slots.len(),
            "slots": slots.iter().map(|s| self.slot_payload(s)).collect::<Vec<_>>(),
        }))
    }

    async fn create_booking(&self, args: CreateBookingArgs) -> OperationResult {
        let event_type = self.resolve_event_type(&args.event_type).await?;
        let minutes = args
            .duration_minutes
            .map(i64::from)
            .or(event_type.length.map(i64::from))
            .unwrap_or(DEFAULT_DURATION_MINUTES);
        let end = args
            .end
            .unwrap_or(args.start + ChronoDuration::minutes(minutes));
        let attendee_name = args.name.unwrap_or_else(|| {
            args.attendee_email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string()
        });

        let booking = self
            .provider
            .create_booking(&NewBooking {
                event_type_id: event_type.id,
                start: args.start,
                end,
                attendee_email: args.attendee_email,
                attendee_name,
                notes: args.notes,
            })
            .await?;

        tracing::info!(booking_id = %booking.id, "booking created");
        Ok(json!({ "booking": self.booking_payload(&booking) }))
    }

    /// Cancelling an already-cancelled booking reports its current status
    /// instead of failing.
    async fn cancel_booking(&self, args: CancelBookingArgs) -> OperationResult {
        let existing = self.provider.get_booking(&args.booking_id).await?;
        if existing.status == BookingStatus::Cancelled {
            tracing::info!(booking_id = %args.booking_id, "booking already cancelled");
            return Ok(cancellation_payload(&args.booking_id, true));
        }

        let booking = self
            .provider
            .cancel_booking(&args.booking_id, args.reason.as_deref())
            .await?;
        tracing::info!(booking_id = %booking.id, "booking cancelled");
        Ok(cancellation_payload(&args.booking_id, false))
    }

    async fn reschedule_booking(&self, args: RescheduleArgs) -> OperationResult {
        let existing = self.provider.get_booking(&args.booking_id).await?;
        let length = existing
            .duration()
            .unwrap_or(ChronoDuration::minutes(DEFAULT_DURATION_MINUTES));
        let new_end = args.new_end.unwrap_or(args.new_start + length);

        let booking = self
            .provider
            .reschedule_booking(&args.booking_id, args.new_start, new_end)
            .await?;

        tracing::info!(booking_id = %booking.id, "booking rescheduled");
        Ok(json!({
            "booking": self.booking_payload(&booking),
            "previous_start": wire_instant(existing.start),
            "previous_start_display": display_instant(existing.start, self.tz),
        }))
    }

    /// Numeric ids pass through; names are matched against the provider's
    /// event types.
    async fn resolve_event_type(&self, reference: &EventTypeRef) -> Result<EventType, ProviderError> {
        match reference {
            EventTypeRef::Id(id) => Ok(EventType {
                id: id.clone(),
                slug: None,
                title: String::new(),
                length: None,
            }),
            EventTypeRef::Name(name) => self
                .provider
                .get_event_types()
                .await?
                .into_iter()
                .find(|et| et.matches(name))
                .ok_or_else(|| ProviderError::UnknownEventType(name.clone())),
        }
    }

    fn booking_payload(&self, booking: &Booking) -> Value {
        json!({
            "id": booking.id,
            "title": booking.title,
            "status": booking.status.as_str(),
            "start": wire_instant(booking.start),
            "start_display": display_instant(booking.start, self.tz),
            "end": booking.end.map(wire_instant),
            "end_display": booking.end.map(|end| display_instant(end, self.tz)),
            "attendees": booking.attendees.iter().map(|a| a.email.as_str()).collect::<Vec<_>>(),
            "event_type_id": booking.event_type_id,
        })
    }

    fn slot_payload(&self, slot: &Slot) -> Value {
        json!({
            "time": wire_instant(slot.time),
            "display": display_instant(slot.time, self.tz),
        })
    }
}

fn cancellation_payload(booking_id: &str, already_cancelled: bool) -> Value {
    json!({
        "booking_id": booking_id,
        "status": BookingStatus::Cancelled.as_str(),
        "already_cancelled": already_cancelled,
    })
}

fn event_type_payload(event_type: &EventType) -> Value {
    json!({
        "id": event_type.id,
        "slug": event_type.slug,
        "title": event_type.title,
        "length_minutes": event_type.length,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use chrono_tz::America::Los_Angeles;

    use super::*;
    use crate::models::Attendee;
    use crate::services::provider::DateRange;

    /// In-memory provider; records how many calls reached it.
    struct FakeProvider {
        bookings: Mutex<Vec<Booking>>,
        calls: AtomicUsize,
        created: Mutex<Vec<NewBooking>>,
        slots_delay: Option<Duration>,
    }

    impl FakeProvider {
        fn new() -> Self {
            let start = Utc.with_ymd_and_hms(2025, 10, 2, 21, 0, 0).unwrap();
            Self {
                bookings: Mutex::new(vec![Booking {
                    id: "100".to_string(),
                    uid: None,
                    title: Some("Intro".to_string()),
                    start,
                    end: Some(start + ChronoDuration::minutes(45)),
                    status: BookingStatus::Confirmed,
                    attendees: vec![Attendee {
                        email: "bob@example.com".to_string(),
                        name: Some("Bob".to_string()),
                        time_zone: None,
                    }],
                    event_type_id: Some("7".to_string()),
                }]),
                calls: AtomicUsize::new(0),
                created: Mutex::new(Vec::new()),
                slots_delay: None,
            }
        }

        fn touch(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }

        fn find(&self, id: &str) -> Result<Booking, ProviderError> {
            self.bookings
                .lock()
                .unwrap()
                .iter()
                .find(|b| b.id == id)
                .cloned()
                .ok_or(ProviderError::Status {
                    status: 404,
                    message: "booking not found".to_string(),
                })
        }
    }

    #[async_trait]
    impl SchedulingProvider for FakeProvider {
        async fn find_available_slots(
            &self,
            _event_type_id: &str,
            range: DateRange,
            _duration_minutes: Option<u32>,
        ) -> Result<Vec<Slot>, ProviderError> {
            self.touch();
            if let Some(delay) = self.slots_delay {
                tokio::time::sleep(delay).await;
            }
            let time = Los_Angeles
                .from_local_datetime(&range.start.and_hms_opt(9, 0, 0).unwrap())
                .unwrap()
                .with_timezone(&Utc);
            Ok(vec![Slot { time }])
        }

        async fn create_booking(&self, booking: &NewBooking) -> Result<Booking, ProviderError> {
            self.touch();
            self.created.lock().unwrap().push(booking.clone());
            Ok(Booking {
                id: "200".to_string(),
                uid: None,
                title: None,
                start: booking.start,
                end: Some(booking.end),
                status: BookingStatus::Confirmed,
                attendees: vec![],
                event_type_id: Some(booking.event_type_id.clone()),
            })
        }

        async fn list_bookings(&self) -> Result<Vec<Booking>, ProviderError> {
            self.touch();
            Ok(self.bookings.lock().unwrap().clone())
        }

        async fn get_booking(&self, booking_id: &str) -> Result<Booking, ProviderError> {
            self.touch();
            self.find(booking_id)
        }

        async fn cancel_booking(
            &self,
            booking_id: &str,
            _reason: Option<&str>,
        ) -> Result<Booking, ProviderError> {
            self.touch();
            let mut bookings = self.bookings.lock().unwrap();
            let booking = bookings
                .iter_mut()
                .find(|b| b.id == booking_id)
                .ok_or(ProviderError::Status {
                    status: 404,
                    message: "booking not found".to_string(),
                })?;
            if booking.status == BookingStatus::Cancelled {
                return Err(ProviderError::Status {
                    status: 400,
                    message: "booking already cancelled".to_string(),
                });
            }
            booking.status = BookingStatus::Cancelled;
            Ok(booking.clone())
        }

        async fn reschedule_booking(
            &self,
            booking_id: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Booking, ProviderError> {
            self.touch();
            let mut booking = self.find(booking_id)?;
            booking.start = start;
            booking.end = Some(end);
            booking.status = BookingStatus::Rescheduled;
            Ok(booking)
        }

        async fn get_event_types(&self) -> Result<Vec<EventType>, ProviderError> {
            self.touch();
            Ok(vec![EventType {
                id: "7".to_string(),
                slug: Some("lunch-meeting".to_string()),
                title: "Lunch Meeting".to_string(),
                length: Some(60),
            }])
        }
    }

    fn request(name: &str, arguments: Value) -> OperationRequest {
        OperationRequest {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    fn known(emails: &[&str]) -> KnownEmails {
        KnownEmails::new(emails.iter().map(|e| e.to_string()))
    }

    fn dispatcher(provider: &FakeProvider) -> Dispatcher<'_> {
        Dispatcher::new(provider, Los_Angeles, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_missing_argument_never_reaches_provider() {
        let provider = FakeProvider::new();
        let err = dispatcher(&provider)
            .run(
                &request("reschedule_booking", json!({"booking_id": "100"})),
                &KnownEmails::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "validation");
        assert_eq!(err.to_payload()["error"]["category"], "missing_argument");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_twice_is_idempotent() {
        let provider = FakeProvider::new();
        let d = dispatcher(&provider);
        let req = request("cancel_booking", json!({"booking_id": "100"}));

        let first = d.run(&req, &KnownEmails::default()).await.unwrap();
        let second = d.run(&req, &KnownEmails::default()).await.unwrap();

        assert_eq!(first["status"], "cancelled");
        assert_eq!(first["already_cancelled"], false);
        assert_eq!(second["status"], "cancelled");
        assert_eq!(second["already_cancelled"], true);
    }

    #[tokio::test]
    async fn test_create_booking_resolves_name_and_length() {
        let provider = FakeProvider::new();
        let result = dispatcher(&provider)
            .run(
                &request(
                    "create_booking",
                    json!({"event_type_id": "Lunch Meeting", "start_time": "10/02/2025 12:00"}),
                ),
                &known(&["amy.lee@example.com"]),
            )
            .await
            .unwrap();

        let created = provider.created.lock().unwrap();
        assert_eq!(created[0].event_type_id, "7");
        assert_eq!(created[0].attendee_name, "amy.lee");
        assert_eq!(wire_instant(created[0].start), "2025-10-02T19:00:00Z");
        assert_eq!(wire_instant(created[0].end), "2025-10-02T20:00:00Z");
        assert_eq!(result["booking"]["start_display"], "10/02/2025 12:00 PM PDT");
    }

    #[tokio::test]
    async fn test_unknown_event_type_name_is_an_error() {
        let provider = FakeProvider::new();
        let err = dispatcher(&provider)
            .run(
                &request(
                    "find_available_slots",
                    json!({"event_type_id": "yoga", "date_range": "10/02/2025"}),
                ),
                &KnownEmails::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.category(), "unknown_event_type");
    }

    #[tokio::test]
    async fn test_slots_carry_display_dates() {
        let provider = FakeProvider::new();
        let result = dispatcher(&provider)
            .run(
                &request(
                    "find_available_slots",
                    json!({"event_type_id": "7", "date_range": "10/02/2025"}),
                ),
                &KnownEmails::default(),
            )
            .await
            .unwrap();
        assert_eq!(result["date_from"], "2025-10-02");
        assert_eq!(result["date_from_display"], "10/02/2025");
        assert_eq!(result["slots"][0]["display"], "10/02/2025 09:00 AM PDT");
    }

    #[tokio::test]
    async fn test_user_bookings_filtered_by_email() {
        let provider = FakeProvider::new();
        let d = dispatcher(&provider);

        let mine = d
            .run(&request("get_user_bookings", json!({})), &known(&["bob@example.com"]))
            .await
            .unwrap();
        assert_eq!(mine["count"], 1);

        let theirs = d
            .run(
                &request("get_user_bookings", json!({"attendee_email": "zed@example.com"})),
                &known(&["bob@example.com", "zed@example.com"]),
            )
            .await
            .unwrap();
        assert_eq!(theirs["count"], 0);
    }

    #[tokio::test]
    async fn test_reschedule_keeps_original_length() {
        let provider = FakeProvider::new();
        let result = dispatcher(&provider)
            .run(
                &request(
                    "reschedule_booking",
                    json!({"booking_id": "100", "new_start_time": "2025-10-03T10:00"}),
                ),
                &KnownEmails::default(),
            )
            .await
            .unwrap();
        assert_eq!(result["booking"]["start"], "2025-10-03T17:00:00Z");
        assert_eq!(result["booking"]["end"], "2025-10-03T17:45:00Z");
        assert_eq!(result["booking"]["status"], "rescheduled");
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let provider = FakeProvider {
            slots_delay: Some(Duration::from_millis(200)),
            ..FakeProvider::new()
        };
        let err = Dispatcher::new(&provider, Los_Angeles, Duration::from_millis(20))
            .run(
                &request(
                    "find_available_slots",
                    json!({"event_type_id": "7", "date_range": "10/02/2025"}),
                ),
                &KnownEmails::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, OperationError::Provider(ProviderError::Timeout));
    }
}
