use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Role, SessionContext, Turn};

fn email_regex() -> Option<&'static Regex> {
    static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_REGEX
        .get_or_init(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").ok())
        .as_ref()
}

/// First email-shaped token in free text. Shape only, nothing is verified.
pub fn extract_email(text: &str) -> Option<String> {
    extract_emails(text).into_iter().next()
}

pub fn extract_emails(text: &str) -> Vec<String> {
    email_regex()
        .map(|re| {
            re.find_iter(text)
                .map(|m| m.as_str().trim_end_matches('.').to_string())
                .collect()
        })
        .unwrap_or_default()
}

pub fn is_email(candidate: &str) -> bool {
    let candidate = candidate.trim();
    email_regex()
        .and_then(|re| re.find(candidate))
        .is_some_and(|m| m.start() == 0 && m.end() == candidate.len())
}

/// Most recent email the user typed anywhere in the history.
pub fn email_from_history(turns: &[Turn]) -> Option<String> {
    turns
        .iter()
        .rev()
        .filter(|t| t.role == Role::User)
        .find_map(|t| extract_email(&t.content))
}

/// Addresses the user supplied themselves: the session email first, then
/// every address typed in a user turn. Emails the model writes into operation
/// arguments count only when they appear here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnownEmails {
    emails: Vec<String>,
}

impl KnownEmails {
    pub fn new(emails: impl IntoIterator<Item = String>) -> Self {
        let mut known = Self::default();
        for email in emails {
            if !known.contains(&email) {
                known.emails.push(email);
            }
        }
        known
    }

    pub fn from_session(session: &SessionContext) -> Self {
        let typed = session
            .conversation
            .turns()
            .iter()
            .rev()
            .filter(|t| t.role == Role::User)
            .flat_map(|t| extract_emails(&t.content));
        Self::new(session.user_email().map(str::to_string).into_iter().chain(typed))
    }

    /// The email operations fall back to when none is given.
    pub fn primary(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }

    pub fn contains(&self, email: &str) -> bool {
        let email = email.trim();
        self.emails.iter().any(|e| e.eq_ignore_ascii_case(email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_email_from_sentence() {
        assert_eq!(
            extract_email("sure, it's jane.doe+cal@example.co.uk."),
            Some("jane.doe+cal@example.co.uk".to_string())
        );
        assert_eq!(extract_email("show me the scheduled events"), None);
    }

    #[test]
    fn test_is_email() {
        assert!(is_email("bob@example.com"));
        assert!(is_email("  bob@example.com "));
        assert!(!is_email("bob at example dot com"));
        assert!(!is_email("mail bob@example.com please"));
    }

    #[test]
    fn test_email_from_history_prefers_latest_user_turn() {
        let turns = vec![
            Turn::user("I'm old@example.com"),
            Turn::assistant("Thanks! Reach us at help@calbot.dev"),
            Turn::user("actually use new@example.com"),
            Turn::assistant("Got it."),
        ];
        assert_eq!(email_from_history(&turns), Some("new@example.com".to_string()));
    }

    #[test]
    fn test_known_emails_come_from_user_turns_only() {
        let mut session = SessionContext::default();
        session
            .conversation
            .push(Turn::user("book me and amy@example.com, I'm bob@example.com"));
        session.conversation.push(Turn::assistant("Or email help@calbot.dev"));
        session.remember_email("bob@example.com");

        let known = KnownEmails::from_session(&session);
        assert_eq!(known.primary(), Some("bob@example.com"));
        assert!(known.contains("AMY@example.com"));
        assert!(!known.contains("help@calbot.dev"));
        assert!(!known.contains("user@example.com"));
    }

    #[test]
    fn test_no_known_emails() {
        let known = KnownEmails::from_session(&SessionContext::default());
        assert_eq!(known.primary(), None);
        assert!(!known.contains("user@example.com"));
    }
}
