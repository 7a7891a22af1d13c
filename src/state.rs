use crate::config::AppConfig;
use crate::services::ai::LlmProvider;
use crate::services::provider::SchedulingProvider;

pub struct AppState {
    pub config: AppConfig,
    pub llm: Box<dyn LlmProvider>,
    pub scheduler: Box<dyn SchedulingProvider>,
}
