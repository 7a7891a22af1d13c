use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::services::datetime::display_date;

const SYSTEM_PROMPT: &str = r#"You are a helpful assistant that helps users book meetings and manage their calendar through Cal.com.

You can help users:
- Find open time slots for an event type
- Book new meetings
- Show their scheduled events
- Cancel events
- Reschedule events

Rules:
- Only ask for the user's email if it is not already known. Once known, reuse it for every request that needs it.
- Always write dates for the user in American format (MM/DD/YYYY), e.g. 10/02/2025 for October 2nd, 2025.
- Pass dates and times to functions exactly as the user gave them or as MM/DD/YYYY HH:MM; they are normalized for the calendar API.
- Use get_event_types to find the right event type when the user names one you do not have an ID for.
- When you have the event type, start time and email, call create_booking without asking for extra confirmation.
- If a function returns an error, explain what went wrong in plain words and suggest a next step.
- Booking IDs come from get_user_bookings; never invent one.

Be friendly and concise."#;

pub fn system_prompt(user_email: Option<&str>, now: DateTime<Utc>, tz: Tz) -> String {
    let today = display_date(now.with_timezone(&tz).date_naive());
    let mut prompt = format!("{SYSTEM_PROMPT}\n\nToday is {today} (time zone {}).", tz.name());

    match user_email {
        Some(email) => prompt.push_str(&format!("\nUser's email: {email}")),
        None => prompt.push_str("\nThe user's email is not known yet."),
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_prompt_includes_known_email_and_date() {
        let now = Utc.with_ymd_and_hms(2025, 10, 2, 18, 0, 0).unwrap();
        let prompt = system_prompt(Some("bob@example.com"), now, chrono_tz::America::New_York);
        assert!(prompt.contains("User's email: bob@example.com"));
        assert!(prompt.contains("Today is 10/02/2025 (time zone America/New_York)"));
    }

    #[test]
    fn test_prompt_without_email() {
        let now = Utc.with_ymd_and_hms(2025, 10, 2, 3, 0, 0).unwrap();
        // 03:00 UTC is still the previous day on the US west coast.
        let prompt = system_prompt(None, now, chrono_tz::America::Los_Angeles);
        assert!(prompt.contains("email is not known yet"));
        assert!(prompt.contains("Today is 10/01/2025"));
    }
}
