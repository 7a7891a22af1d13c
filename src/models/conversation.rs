use serde::{Deserialize, Serialize};

use super::operation::OperationRequest;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        }
    }
}

/// One entry in the conversation.
///
/// Function-result turns carry the operation name and call id along with the
/// JSON-encoded result in `content`. Assistant turns that asked for operations
/// carry those requests so the model sees its own calls on the next round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operation_requests: Vec<OperationRequest>,
}

impl Turn {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            call_id: None,
            operation_requests: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_requesting(content: Option<String>, requests: Vec<OperationRequest>) -> Self {
        Self {
            operation_requests: requests,
            ..Self::plain(Role::Assistant, content.unwrap_or_default())
        }
    }

    pub fn function_result(request: &OperationRequest, payload: &serde_json::Value) -> Self {
        Self {
            name: Some(request.name.clone()),
            call_id: Some(request.id.clone()),
            ..Self::plain(Role::Function, payload.to_string())
        }
    }
}

/// Ordered, append-only sequence of turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}

/// Everything the turn processor knows about one chat session. Rebuilt from
/// the client's copy on every request; nothing is kept server-side.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub conversation: Conversation,
    user_email: Option<String>,
}

impl SessionContext {
    pub fn new(conversation: Conversation, user_email: Option<String>) -> Self {
        Self {
            conversation,
            user_email,
        }
    }

    pub fn user_email(&self) -> Option<&str> {
        self.user_email.as_deref()
    }

    pub fn remember_email(&mut self, email: impl Into<String>) {
        self.user_email = Some(email.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_history_round_trips_as_plain_array() {
        let raw = json!([
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": "Hello! How can I help?"}
        ]);
        let conv: Conversation = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(conv.turns().len(), 2);
        assert_eq!(conv.turns()[0].role, Role::User);
        assert_eq!(serde_json::to_value(&conv).unwrap(), raw);
    }

    #[test]
    fn test_function_result_turn() {
        let request = OperationRequest {
            id: "call_1".to_string(),
            name: "get_event_types".to_string(),
            arguments: json!({}),
        };
        let turn = Turn::function_result(&request, &json!({"event_types": []}));
        assert_eq!(turn.role, Role::Function);
        assert_eq!(turn.name.as_deref(), Some("get_event_types"));
        assert_eq!(turn.call_id.as_deref(), Some("call_1"));
        assert_eq!(turn.content, r#"{"event_types":[]}"#);
    }
}
