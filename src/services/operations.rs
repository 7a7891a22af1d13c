use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};

use crate::models::{OperationKind, OperationRequest};
use crate::services::datetime::{parse_date, parse_instant};
use crate::services::identity::{is_email, KnownEmails};
use crate::services::provider::DateRange;

/// Local rejection of an operation request. The provider is never called.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("{operation} is missing required argument '{argument}'")]
    MissingArgument {
        operation: &'static str,
        argument: &'static str,
    },

    #[error("{operation} argument '{argument}' is invalid: {reason}")]
    InvalidArgument {
        operation: &'static str,
        argument: &'static str,
        reason: String,
    },

    #[error("arguments for {operation} are not a JSON object")]
    MalformedArguments { operation: &'static str },
}

impl ValidationError {
    pub fn category(&self) -> &'static str {
        match self {
            ValidationError::UnknownOperation(_) => "unknown_operation",
            ValidationError::MissingArgument { .. } => "missing_argument",
            ValidationError::InvalidArgument { .. } => "invalid_argument",
            ValidationError::MalformedArguments { .. } => "malformed_arguments",
        }
    }
}

/// How the model referred to an event type.
#[derive(Debug, Clone, PartialEq)]
pub enum EventTypeRef {
    Id(String),
    Name(String),
}

impl EventTypeRef {
    fn parse(raw: String) -> Self {
        if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
            EventTypeRef::Id(raw)
        } else {
            EventTypeRef::Name(raw)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindSlotsArgs {
    pub event_type: EventTypeRef,
    pub range: DateRange,
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateBookingArgs {
    pub event_type: EventTypeRef,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub duration_minutes: Option<u32>,
    pub attendee_email: String,
    pub name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserBookingsArgs {
    pub attendee_email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancelBookingArgs {
    pub booking_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RescheduleArgs {
    pub booking_id: String,
    pub new_start: DateTime<Utc>,
    pub new_end: Option<DateTime<Utc>>,
}

/// A validated operation, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    FindAvailableSlots(FindSlotsArgs),
    CreateBooking(CreateBookingArgs),
    GetUserBookings(UserBookingsArgs),
    CancelBooking(CancelBookingArgs),
    RescheduleBooking(RescheduleArgs),
    GetEventTypes,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::FindAvailableSlots(_) => OperationKind::FindAvailableSlots,
            Operation::CreateBooking(_) => OperationKind::CreateBooking,
            Operation::GetUserBookings(_) => OperationKind::GetUserBookings,
            Operation::CancelBooking(_) => OperationKind::CancelBooking,
            Operation::RescheduleBooking(_) => OperationKind::RescheduleBooking,
            Operation::GetEventTypes => OperationKind::GetEventTypes,
        }
    }

    /// Validates a model request. Attendee emails must be ones the user
    /// supplied; the primary known email fills in a missing one.
    pub fn parse(
        request: &OperationRequest,
        known: &KnownEmails,
        tz: Tz,
    ) -> Result<Self, ValidationError> {
        let kind = request
            .kind()
            .ok_or_else(|| ValidationError::UnknownOperation(request.name.clone()))?;
        let args = Args::new(kind, &request.arguments)?;

        for &argument in kind.required_args() {
            let satisfied = match argument {
                "attendee_email" => args.email(known).is_some(),
                other => args.has(other),
            };
            if !satisfied {
                return Err(ValidationError::MissingArgument {
                    operation: kind.as_str(),
                    argument,
                });
            }
        }

        let op = match kind {
            OperationKind::FindAvailableSlots => Operation::FindAvailableSlots(FindSlotsArgs {
                event_type: EventTypeRef::parse(args.string("event_type_id")?),
                range: args.date_range("date_range", tz)?,
                duration_minutes: args.optional_minutes("duration")?,
            }),
            OperationKind::CreateBooking => {
                let start = args.instant("start_time", tz)?;
                let end = args.optional_instant("end_time", tz)?;
                if end.is_some_and(|end| end <= start) {
                    return Err(args.invalid("end_time", "must be after start_time"));
                }
                Operation::CreateBooking(CreateBookingArgs {
                    event_type: EventTypeRef::parse(args.string("event_type_id")?),
                    start,
                    end,
                    duration_minutes: args.optional_minutes("duration")?,
                    attendee_email: args.checked_email(known)?,
                    name: args.optional_string("name"),
                    notes: args.optional_string("notes"),
                })
            }
            OperationKind::GetUserBookings => Operation::GetUserBookings(UserBookingsArgs {
                attendee_email: args.checked_email(known)?,
            }),
            OperationKind::CancelBooking => Operation::CancelBooking(CancelBookingArgs {
                booking_id: args.identifier("booking_id")?,
                reason: args.optional_string("reason"),
            }),
            OperationKind::RescheduleBooking => {
                let new_start = args.instant("new_start_time", tz)?;
                let new_end = args.optional_instant("new_end_time", tz)?;
                if new_end.is_some_and(|end| end <= new_start) {
                    return Err(args.invalid("new_end_time", "must be after new_start_time"));
                }
                Operation::RescheduleBooking(RescheduleArgs {
                    booking_id: args.identifier("booking_id")?,
                    new_start,
                    new_end,
                })
            }
            OperationKind::GetEventTypes => Operation::GetEventTypes,
        };

        Ok(op)
    }
}

/// Typed accessors over the model's argument object.
struct Args<'a> {
    kind: OperationKind,
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Args<'a> {
    fn new(kind: OperationKind, arguments: &'a Value) -> Result<Self, ValidationError> {
        match arguments {
            Value::Object(map) => Ok(Self {
                kind,
                map: Some(map),
            }),
            Value::Null => Ok(Self { kind, map: None }),
            _ => Err(ValidationError::MalformedArguments {
                operation: kind.as_str(),
            }),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map?.get(key).filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
    }

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn invalid(&self, argument: &'static str, reason: impl Into<String>) -> ValidationError {
        ValidationError::InvalidArgument {
            operation: self.kind.as_str(),
            argument,
            reason: reason.into(),
        }
    }

    fn missing(&self, argument: &'static str) -> ValidationError {
        ValidationError::MissingArgument {
            operation: self.kind.as_str(),
            argument,
        }
    }

    /// Strings, or numbers rendered as strings (ids often arrive as numbers).
    fn string(&self, key: &'static str) -> Result<String, ValidationError> {
        match self.get(key) {
            None => Err(self.missing(key)),
            Some(Value::String(s)) => Ok(s.trim().to_string()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(_) => Err(self.invalid(key, "expected a string")),
        }
    }

    /// Ids end up in URL paths, so only `[A-Za-z0-9_-]` is allowed.
    fn identifier(&self, key: &'static str) -> Result<String, ValidationError> {
        let id = self.string(key)?;
        if id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            Ok(id)
        } else {
            Err(self.invalid(key, "may only contain letters, digits, '-' and '_'"))
        }
    }

    fn optional_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn optional_minutes(&self, key: &'static str) -> Result<Option<u32>, ValidationError> {
        let minutes = match self.get(key) {
            None => return Ok(None),
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            Some(_) => None,
        };
        match minutes.and_then(|m| u32::try_from(m).ok()) {
            Some(m) if m > 0 => Ok(Some(m)),
            _ => Err(self.invalid(key, "expected a positive number of minutes")),
        }
    }

    fn instant(&self, key: &'static str, tz: Tz) -> Result<DateTime<Utc>, ValidationError> {
        let raw = self.string(key)?;
        parse_instant(&raw, tz).map_err(|e| self.invalid(key, e.to_string()))
    }

    fn optional_instant(
        &self,
        key: &'static str,
        tz: Tz,
    ) -> Result<Option<DateTime<Utc>>, ValidationError> {
        match self.optional_string(key) {
            None => Ok(None),
            Some(raw) => parse_instant(&raw, tz)
                .map(Some)
                .map_err(|e| self.invalid(key, e.to_string())),
        }
    }

    /// Accepts `"10/02/2025"`, `"10/02/2025 to 10/05/2025"` or
    /// `{"start": ..., "end": ...}`.
    fn date_range(&self, key: &'static str, tz: Tz) -> Result<DateRange, ValidationError> {
        let (start_raw, end_raw) = match self.get(key) {
            None => return Err(self.missing(key)),
            Some(Value::String(s)) => split_range(s),
            Some(Value::Object(obj)) => {
                let start = obj
                    .get("start")
                    .and_then(Value::as_str)
                    .ok_or_else(|| self.invalid(key, "missing start date"))?;
                let end = obj.get("end").and_then(Value::as_str).unwrap_or(start);
                (start.to_string(), end.to_string())
            }
            Some(_) => return Err(self.invalid(key, "expected a date or {start, end}")),
        };

        let start = parse_date(&start_raw, tz).map_err(|e| self.invalid(key, e.to_string()))?;
        let end = parse_date(&end_raw, tz).map_err(|e| self.invalid(key, e.to_string()))?;
        if end < start {
            return Err(self.invalid(key, "end date is before start date"));
        }
        Ok(DateRange { start, end })
    }

    /// The attendee email from the arguments (`attendee_email`, or the older
    /// `user_email`) when the user supplied it, else the primary known email.
    /// Addresses the user never typed are dropped.
    fn email(&self, known: &KnownEmails) -> Option<String> {
        let given = ["attendee_email", "user_email"]
            .iter()
            .find_map(|k| self.optional_string(k));
        match given {
            Some(email) if known.contains(&email) => Some(email),
            Some(_) => {
                tracing::warn!(
                    op = self.kind.as_str(),
                    "ignoring attendee email the user never supplied"
                );
                known.primary().map(str::to_string)
            }
            None => known.primary().map(str::to_string),
        }
    }

    fn checked_email(&self, known: &KnownEmails) -> Result<String, ValidationError> {
        let email = self
            .email(known)
            .ok_or_else(|| self.missing("attendee_email"))?;
        if !is_email(&email) {
            return Err(self.invalid("attendee_email", format!("'{email}' is not an email address")));
        }
        Ok(email)
    }
}

fn split_range(raw: &str) -> (String, String) {
    for sep in [" to ", " - ", " through "] {
        if let Some((start, end)) = raw.split_once(sep) {
            return (start.trim().to_string(), end.trim().to_string());
        }
    }
    (raw.trim().to_string(), raw.trim().to_string())
}
