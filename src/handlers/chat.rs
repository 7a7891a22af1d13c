use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{Conversation, OperationRecord, SessionContext, Turn};
use crate::services::conversation;
use crate::services::identity::{email_from_history, is_email};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub history: Option<Vec<Turn>>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub functions_called: Vec<String>,
    pub operations: Vec<OperationRecord>,
    pub history: Vec<Turn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub truncated: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One chat turn. The client owns the conversation and sends it back with
/// every message.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("message must not be empty".to_string()));
    }

    let history = payload.history.unwrap_or_default();
    let user_email = match payload.user_email.as_deref().map(str::trim) {
        Some(email) if is_email(email) => Some(email.to_string()),
        Some(email) if !email.is_empty() => {
            tracing::warn!("ignoring malformed user_email");
            email_from_history(&history)
        }
        _ => email_from_history(&history),
    };

    let mut session = SessionContext::new(Conversation::from_turns(history), user_email);
    let outcome = conversation::process_turn(&state, &mut session, message).await;

    Ok(Json(ChatResponse {
        functions_called: outcome.functions_called(),
        response: outcome.reply,
        operations: outcome.operations,
        user_email: session.user_email().map(str::to_string),
        history: session.conversation.into_turns(),
        truncated: outcome.truncated,
        success: outcome.model_error.is_none(),
        error: outcome.model_error,
    }))
}
