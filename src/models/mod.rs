pub mod booking;
pub mod conversation;
pub mod operation;

pub use booking::{Attendee, Booking, BookingStatus, EventType, Slot};
pub use conversation::{Conversation, Role, SessionContext, Turn};
pub use operation::{OperationKind, OperationRecord, OperationRequest, OperationSignature};
