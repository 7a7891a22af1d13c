use std::env;
use std::time::Duration;

use chrono_tz::Tz;

use crate::errors::AppError;

const DEFAULT_TIME_ZONE: Tz = chrono_tz::America::Los_Angeles;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub llm_provider: String,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub cal_api_key: String,
    pub cal_username: String,
    pub cal_api_url: String,
    pub time_zone: Tz,
    pub llm_timeout: Duration,
    pub provider_timeout: Duration,
    pub max_operation_rounds: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let llm_provider = env::var("LLM_PROVIDER")
            .map(|v| v.to_lowercase())
            .unwrap_or_else(|_| "openai".to_string());

        let (default_base_url, default_model) = match llm_provider.as_str() {
            "groq" => ("https://api.groq.com/openai/v1", "llama-3.3-70b-versatile"),
            "ollama" => ("http://localhost:11434/v1", "llama3.2"),
            _ => ("https://api.openai.com/v1", "gpt-4o-mini"),
        };

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            llm_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| default_base_url.to_string()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| default_model.to_string()),
            llm_provider,
            cal_api_key: env::var("CAL_API_KEY").unwrap_or_default(),
            cal_username: env::var("CAL_USERNAME").unwrap_or_default(),
            cal_api_url: env::var("CAL_API_URL")
                .unwrap_or_else(|_| "https://api.cal.com".to_string()),
            time_zone: time_zone_or_default(env::var("CAL_TIME_ZONE").ok().as_deref()),
            llm_timeout: Duration::from_secs(secs_from_env("LLM_TIMEOUT_SECS", 30)),
            provider_timeout: Duration::from_secs(secs_from_env("PROVIDER_TIMEOUT_SECS", 15)),
            max_operation_rounds: env::var("MAX_OPERATION_ROUNDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(3),
        }
    }

    /// Checks the three required secrets/identifiers.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.llm_api_key.is_empty() && self.llm_provider != "ollama" {
            return Err(AppError::Config(
                "OPENAI_API_KEY must be set unless LLM_PROVIDER=ollama".to_string(),
            ));
        }
        if self.cal_api_key.is_empty() {
            return Err(AppError::Config("CAL_API_KEY must be set".to_string()));
        }
        if self.cal_username.is_empty() {
            return Err(AppError::Config("CAL_USERNAME must be set".to_string()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Unparseable names fall back to the default zone, loudly: every naive time
/// the user gives is read in this zone.
fn time_zone_or_default(raw: Option<&str>) -> Tz {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return DEFAULT_TIME_ZONE;
    };
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(
            value = raw,
            fallback = DEFAULT_TIME_ZONE.name(),
            "CAL_TIME_ZONE is not a valid IANA time zone"
        );
        DEFAULT_TIME_ZONE
    })
}

fn secs_from_env(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            llm_provider: "openai".to_string(),
            llm_api_key: "sk-test".to_string(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            cal_api_key: "cal_test".to_string(),
            cal_username: "alice".to_string(),
            cal_api_url: "https://api.cal.com".to_string(),
            time_zone: chrono_tz::America::Los_Angeles,
            llm_timeout: Duration::from_secs(30),
            provider_timeout: Duration::from_secs(15),
            max_operation_rounds: 3,
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_missing_cal_key() {
        let config = AppConfig {
            cal_api_key: String::new(),
            ..sample()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("CAL_API_KEY"));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = AppConfig {
            llm_provider: "ollama".to_string(),
            llm_api_key: String::new(),
            ..sample()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_time_zone_parsing() {
        assert_eq!(
            time_zone_or_default(Some("America/New_York")),
            chrono_tz::America::New_York
        );
        assert_eq!(time_zone_or_default(Some("Mars/Olympus_Mons")), DEFAULT_TIME_ZONE);
        assert_eq!(time_zone_or_default(Some("  ")), DEFAULT_TIME_ZONE);
        assert_eq!(time_zone_or_default(None), DEFAULT_TIME_ZONE);
    }

    #[test]
    fn test_bind_addr() {
        assert_eq!(sample().bind_addr(), "127.0.0.1:8000");
    }
}
