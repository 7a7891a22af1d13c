use chrono::Utc;
use futures_util::future::join_all;
use tracing::Instrument;

use crate::models::{OperationKind, OperationRecord, OperationRequest, SessionContext, Turn};
use crate::services::ai::prompt::system_prompt;
use crate::services::datetime::humanize_dates;
use crate::services::dispatch::Dispatcher;
use crate::services::identity::{extract_email, KnownEmails};
use crate::state::AppState;

pub const APOLOGY_REPLY: &str =
    "Sorry, I'm having trouble reaching the assistant right now. Please try again in a moment.";

pub const EMAIL_PROMPT: &str =
    "Could you share the email address you use for your bookings? I'll remember it for the rest of our conversation.";

const EMPTY_REPLY: &str = "Sorry, I didn't quite catch that. Could you rephrase?";

const CAP_REPLY: &str =
    "I've worked through several steps but couldn't finish everything in one go. Let me know how you'd like to continue.";

/// Result of one processed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub operations: Vec<OperationRecord>,
    /// The model kept asking for operations until the round cap.
    pub truncated: bool,
    /// Set when the model service failed and the reply is the apology.
    pub model_error: Option<String>,
}

impl TurnOutcome {
    pub fn functions_called(&self) -> Vec<String> {
        self.operations.iter().map(|op| op.name.clone()).collect()
    }
}

/// Processes one user utterance against the session.
///
/// Each round asks the model for a reply; requested operations are validated
/// and dispatched concurrently, and their results appended in request order
/// before the next round. After `max_operation_rounds` dispatch rounds the
/// model is asked once more without any operations on offer and whatever it
/// says becomes the reply.
pub async fn process_turn(
    state: &AppState,
    session: &mut SessionContext,
    utterance: &str,
) -> TurnOutcome {
    let turn_id = uuid::Uuid::new_v4();
    run_turn(state, session, utterance)
        .instrument(tracing::info_span!("turn", %turn_id))
        .await
}

async fn run_turn(state: &AppState, session: &mut SessionContext, utterance: &str) -> TurnOutcome {
    let tz = state.config.time_zone;
    let max_rounds = state.config.max_operation_rounds;

    if let Some(email) = extract_email(utterance) {
        tracing::info!("recognized user email");
        session.remember_email(email);
    }
    session.conversation.push(Turn::user(utterance));

    let catalog = OperationKind::catalog();
    let dispatcher = Dispatcher::new(state.scheduler.as_ref(), tz, state.config.provider_timeout);
    let mut operations: Vec<OperationRecord> = Vec::new();
    let mut last_text: Option<String> = None;
    let mut round = 0;

    loop {
        let capped = round >= max_rounds;
        let offered = if capped { &catalog[..0] } else { &catalog[..] };
        let system = system_prompt(session.user_email(), Utc::now(), tz);

        let reply = match tokio::time::timeout(
            state.config.llm_timeout,
            state.llm.chat(&system, session.conversation.turns(), offered),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return model_failure(session, operations, e.to_string()),
            Err(_) => return model_failure(session, operations, "model request timed out".to_string()),
        };

        if capped || reply.operation_requests.is_empty() {
            if capped && !reply.operation_requests.is_empty() {
                tracing::warn!(
                    ignored = reply.operation_requests.len(),
                    "model requested operations after the round cap"
                );
            }
            let text = reply
                .text_content()
                .map(str::to_string)
                .or(last_text)
                .unwrap_or_else(|| {
                    let fallback = if capped { CAP_REPLY } else { EMPTY_REPLY };
                    fallback.to_string()
                });
            let text = humanize_dates(&text, tz);
            session.conversation.push(Turn::assistant(text.clone()));

            tracing::info!(
                operations = operations.len(),
                rounds = round,
                truncated = capped,
                "turn complete"
            );
            return TurnOutcome {
                reply: text,
                operations,
                truncated: capped,
                model_error: None,
            };
        }

        if needs_email(&reply.operation_requests, session) {
            tracing::info!("asking for email before dispatching");
            session.conversation.push(Turn::assistant(EMAIL_PROMPT));
            return TurnOutcome {
                reply: EMAIL_PROMPT.to_string(),
                operations,
                truncated: false,
                model_error: None,
            };
        }

        if let Some(text) = reply.text_content() {
            last_text = Some(text.to_string());
        }
        let requests = reply.operation_requests;
        session
            .conversation
            .push(Turn::assistant_requesting(reply.content, requests.clone()));

        let known = KnownEmails::from_session(session);
        let results =
            join_all(requests.iter().map(|request| dispatcher.run(request, &known))).await;

        for (request, result) in requests.iter().zip(results) {
            let (payload, record) = match result {
                Ok(payload) => {
                    tracing::info!(op = %request.name, "operation succeeded");
                    (
                        payload,
                        OperationRecord {
                            name: request.name.clone(),
                            ok: true,
                            error: None,
                        },
                    )
                }
                Err(e) => {
                    tracing::warn!(op = %request.name, kind = e.kind(), error = %e, "operation failed");
                    (
                        e.to_payload(),
                        OperationRecord {
                            name: request.name.clone(),
                            ok: false,
                            error: Some(e.to_string()),
                        },
                    )
                }
            };
            session
                .conversation
                .push(Turn::function_result(request, &payload));
            operations.push(record);
        }

        round += 1;
    }
}

/// True when some request needs an attendee email and the user has not
/// given one. Emails the model put in the arguments do not count.
fn needs_email(requests: &[OperationRequest], session: &SessionContext) -> bool {
    session.user_email().is_none()
        && requests
            .iter()
            .any(|r| r.kind().is_some_and(|k| k.needs_email()))
}

fn model_failure(
    session: &mut SessionContext,
    operations: Vec<OperationRecord>,
    error: String,
) -> TurnOutcome {
    tracing::error!(error = %error, "model service failed, replying with apology");
    session.conversation.push(Turn::assistant(APOLOGY_REPLY));
    TurnOutcome {
        reply: APOLOGY_REPLY.to_string(),
        operations,
        truncated: false,
        model_error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Conversation, Role};
    use serde_json::json;

    fn request(name: &str, arguments: serde_json::Value) -> OperationRequest {
        OperationRequest {
            id: "c".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    #[test]
    fn test_needs_email_only_without_any_email() {
        let mut session = SessionContext::default();
        let lookup = vec![request("get_user_bookings", json!({}))];
        assert!(needs_email(&lookup, &session));

        let invented = vec![request("get_user_bookings", json!({"attendee_email": "a@b.co"}))];
        assert!(needs_email(&invented, &session));

        let unrelated = vec![request("get_event_types", json!({}))];
        assert!(!needs_email(&unrelated, &session));

        session.remember_email("a@b.co");
        assert!(!needs_email(&lookup, &session));
    }

    #[test]
    fn test_model_failure_appends_apology() {
        let mut session = SessionContext::new(Conversation::default(), None);
        let outcome = model_failure(&mut session, vec![], "boom".to_string());
        assert_eq!(outcome.reply, APOLOGY_REPLY);
        assert_eq!(outcome.model_error.as_deref(), Some("boom"));
        assert_eq!(session.conversation.turns()[0].role, Role::Assistant);
    }
}
