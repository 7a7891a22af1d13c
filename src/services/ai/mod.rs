pub mod openai;
pub mod prompt;

use async_trait::async_trait;

use crate::models::{OperationRequest, OperationSignature, Turn};

/// What the model answered: free text, operation requests, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub operation_requests: Vec<OperationRequest>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            operation_requests: Vec::new(),
        }
    }

    /// Non-blank reply text, if any.
    pub fn text_content(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// One completion over the conversation. An empty `operations` slice
    /// means the model must answer in text.
    async fn chat(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        operations: &[OperationSignature],
    ) -> anyhow::Result<ModelReply>;
}
