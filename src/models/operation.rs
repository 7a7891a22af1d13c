use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The fixed catalog of operations the model may ask for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    FindAvailableSlots,
    CreateBooking,
    GetUserBookings,
    CancelBooking,
    RescheduleBooking,
    GetEventTypes,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        OperationKind::FindAvailableSlots,
        OperationKind::CreateBooking,
        OperationKind::GetUserBookings,
        OperationKind::CancelBooking,
        OperationKind::RescheduleBooking,
        OperationKind::GetEventTypes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::FindAvailableSlots => "find_available_slots",
            OperationKind::CreateBooking => "create_booking",
            OperationKind::GetUserBookings => "get_user_bookings",
            OperationKind::CancelBooking => "cancel_booking",
            OperationKind::RescheduleBooking => "reschedule_booking",
            OperationKind::GetEventTypes => "get_event_types",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    pub fn required_args(&self) -> &'static [&'static str] {
        match self {
            OperationKind::FindAvailableSlots => &["event_type_id", "date_range"],
            OperationKind::CreateBooking => &["event_type_id", "start_time", "attendee_email"],
            OperationKind::GetUserBookings => &["attendee_email"],
            OperationKind::CancelBooking => &["booking_id"],
            OperationKind::RescheduleBooking => &["booking_id", "new_start_time"],
            OperationKind::GetEventTypes => &[],
        }
    }

    pub fn needs_email(&self) -> bool {
        self.required_args().contains(&"attendee_email")
    }

    pub fn description(&self) -> &'static str {
        match self {
            OperationKind::FindAvailableSlots => {
                "Find available time slots for an event type within a date range"
            }
            OperationKind::CreateBooking => "Create a new booking for the attendee",
            OperationKind::GetUserBookings => "List all scheduled bookings for an attendee email",
            OperationKind::CancelBooking => "Cancel a specific booking",
            OperationKind::RescheduleBooking => "Move a booking to a new start time",
            OperationKind::GetEventTypes => "List the event types that can be booked",
        }
    }

    /// JSON-schema for the arguments, as sent to the model.
    pub fn parameters(&self) -> Value {
        let properties = match self {
            OperationKind::FindAvailableSlots => json!({
                "event_type_id": {"type": "string", "description": "ID, slug or title of the event type"},
                "date_range": {
                    "description": "A single date (MM/DD/YYYY or YYYY-MM-DD) or an object with start and end dates",
                    "oneOf": [
                        {"type": "string"},
                        {
                            "type": "object",
                            "properties": {
                                "start": {"type": "string"},
                                "end": {"type": "string"}
                            },
                            "required": ["start"]
                        }
                    ]
                },
                "duration": {"type": "integer", "description": "Meeting length in minutes"}
            }),
            OperationKind::CreateBooking => json!({
                "event_type_id": {"type": "string", "description": "ID, slug or title of the event type"},
                "start_time": {"type": "string", "description": "Start of the meeting, e.g. 10/02/2025 14:00 or 2025-10-02T14:00"},
                "end_time": {"type": "string", "description": "End of the meeting; defaults to start plus duration"},
                "duration": {"type": "integer", "description": "Meeting length in minutes", "default": 30},
                "attendee_email": {"type": "string", "description": "Email of the person booking"},
                "name": {"type": "string", "description": "Name of the person booking"},
                "notes": {"type": "string", "description": "Additional notes for the meeting"}
            }),
            OperationKind::GetUserBookings => json!({
                "attendee_email": {"type": "string", "description": "Email of the attendee"}
            }),
            OperationKind::CancelBooking => json!({
                "booking_id": {"type": "string", "description": "ID of the booking to cancel"},
                "reason": {"type": "string", "description": "Why the booking is being cancelled"}
            }),
            OperationKind::RescheduleBooking => json!({
                "booking_id": {"type": "string", "description": "ID of the booking to move"},
                "new_start_time": {"type": "string", "description": "New start time"},
                "new_end_time": {"type": "string", "description": "New end time; defaults to keeping the booking's current length"}
            }),
            OperationKind::GetEventTypes => json!({}),
        };

        json!({
            "type": "object",
            "properties": properties,
            "required": self.required_args(),
        })
    }

    pub fn signature(&self) -> OperationSignature {
        OperationSignature {
            name: self.as_str().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }

    pub fn catalog() -> Vec<OperationSignature> {
        Self::ALL.iter().map(OperationKind::signature).collect()
    }
}

/// Name, description and argument schema of one operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationSignature {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// An operation invocation as decided by the model. The name is untrusted
/// until it has been matched against [`OperationKind`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl OperationRequest {
    pub fn kind(&self) -> Option<OperationKind> {
        OperationKind::from_name(&self.name)
    }
}

/// What the caller is told about each operation invoked during a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationRecord {
    pub name: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
