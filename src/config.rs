use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog_path: String,
    // Inputs and output of the `prepare` step
    pub reviews_path: String,
    pub events_path: String,
    pub output_path: String,
    pub call_timeout_secs: u64,
    pub batch_size: usize,
    // An omitted section stays off rather than taking the built-in default
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub classifier: Option<ClassifierConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub backend: BackendType,
    pub api_url: String,
    pub model: String,
    /// Name of the environment variable that holds the API key.
    pub api_key_env: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub api_url: String,
    pub api_key_env: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: "events_with_aggregated_data.csv".to_string(),
            reviews_path: "Data/College_Fest_Review_data_set.csv".to_string(),
            events_path: "Data/expanded_college_events_data.csv".to_string(),
            output_path: "events_with_aggregated_data.csv".to_string(),
            call_timeout_secs: 30,
            batch_size: 16,
            llm: Some(LlmConfig {
                backend: BackendType::OpenAi,
                api_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
            }),
            classifier: Some(ClassifierConfig {
                api_url: "https://api-inference.huggingface.co/models/distilbert-base-uncased-finetuned-sst-2-english".to_string(),
                api_key_env: Some("HF_API_TOKEN".to_string()),
            }),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Read an API key from the named environment variable, ignoring blank values.
pub fn api_key_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|key| !key.trim().is_empty())
}
