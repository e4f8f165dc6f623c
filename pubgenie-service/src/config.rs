use research_pipeline::ComparisonOutput;
use research_pipeline::llm::{DEFAULT_GEMINI_MODEL, DEFAULT_OPENROUTER_MODEL};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),

    #[error("invalid value '{value}' for {var}")]
    InvalidValue { var: &'static str, value: String },
}

/// Which text generation backend answers the prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmConfig {
    Gemini {
        api_key: String,
        model: String,
        base_url: Option<String>,
    },
    OpenRouter {
        api_key: String,
        model: String,
    },
}

/// Configuration for the PubGenie service, read from the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub llm: LlmConfig,
    pub pubmed_api_key: Option<String>,
    pub pubmed_base_url: Option<String>,
    pub comparison_output: ComparisonOutput,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(value) => value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                var: "PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let provider = get("LLM_PROVIDER").unwrap_or_else(|| "gemini".to_string());
        let provider_name = provider.trim().to_ascii_lowercase();
        let llm = match provider_name.as_str() {
            "gemini" => LlmConfig::Gemini {
                api_key: get("GEMINI_API_KEY").ok_or(ConfigError::MissingVar("GEMINI_API_KEY"))?,
                model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                base_url: get("GEMINI_BASE_URL"),
            },
            "openrouter" => LlmConfig::OpenRouter {
                api_key: get("OPENROUTER_API_KEY")
                    .ok_or(ConfigError::MissingVar("OPENROUTER_API_KEY"))?,
                model: get("OPENROUTER_MODEL")
                    .unwrap_or_else(|| DEFAULT_OPENROUTER_MODEL.to_string()),
            },
            _ => {
                return Err(ConfigError::InvalidValue {
                    var: "LLM_PROVIDER",
                    value: provider,
                });
            }
        };

        let comparison_output = match get("COMPARISON_OUTPUT") {
            Some(value) => value
                .parse::<ComparisonOutput>()
                .map_err(|_| ConfigError::InvalidValue {
                    var: "COMPARISON_OUTPUT",
                    value,
                })?,
            None => ComparisonOutput::default(),
        };

        Ok(Self {
            port,
            database_url: get("DATABASE_URL"),
            llm,
            pubmed_api_key: get("PUBMED_API_KEY"),
            pubmed_base_url: get("PUBMED_BASE_URL"),
            comparison_output,
        })
    }
}
