use anyhow::{Context, Result};
use dotenvy::dotenv;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub(crate) fn default_planner_temperature() -> f32 {
    0.2
}

pub(crate) fn default_narrative_temperature() -> f32 {
    0.5
}

#[derive(Debug, Clone)]
pub struct Config {
    /// When absent the service runs offline: no remote planning, local narratives only.
    pub openai_key: Option<String>,
    pub model: String,
    pub planner_temperature: f32,
    pub narrative_temperature: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_key: None,
            model: DEFAULT_MODEL.to_string(),
            planner_temperature: default_planner_temperature(),
            narrative_temperature: default_narrative_temperature(),
        }
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai_key = lookup("OPENAI_API_KEY")
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let model = lookup("OPENAI_MODEL")
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let planner_temperature = match lookup("PLANNER_TEMPERATURE") {
            Some(raw) => raw
                .trim()
                .parse::<f32>()
                .with_context(|| format!("Failed to parse PLANNER_TEMPERATURE '{}'", raw))?,
            None => default_planner_temperature(),
        };

        let narrative_temperature = match lookup("NARRATIVE_TEMPERATURE") {
            Some(raw) => raw
                .trim()
                .parse::<f32>()
                .with_context(|| format!("Failed to parse NARRATIVE_TEMPERATURE '{}'", raw))?,
            None => default_narrative_temperature(),
        };

        Ok(Config {
            openai_key,
            model,
            planner_temperature,
            narrative_temperature,
        })
    }

    pub fn is_offline(&self) -> bool {
        self.openai_key.is_none()
    }
}

pub fn load_config() -> Result<Config> {
    Config::new()
}
