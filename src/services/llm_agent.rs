use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
        ChatCompletionResponseFormat, ChatCompletionResponseFormatType,
        CreateChatCompletionRequest, Role,
    },
    Client,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::config::{default_narrative_temperature, default_planner_temperature, Config};
use crate::error::AppError;
use crate::models::Row;
use crate::services::narrative::{results_summary, Narrative, NarrativeProvider};
use crate::services::planner::{planning_prompt, SuggestionProvider, PLANNER_SYSTEM_PROMPT};
use crate::services::structure::DataStructureProfile;

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[\s\S]*\}").expect("JSON object pattern is valid"));

const NARRATIVE_SYSTEM_PROMPT: &str = "You are a data analyst expert. Analyze query results and provide clear, actionable insights. Always return valid JSON.";

/// Chat-model client that plans questions and narrates results.
pub struct LlmAgent {
    client: Client<OpenAIConfig>,
    model: String,
    planner_temperature: f32,
    narrative_temperature: f32,
}

impl LlmAgent {
    pub fn new(api_key: &str, model: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            planner_temperature: default_planner_temperature(),
            narrative_temperature: default_narrative_temperature(),
        }
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let key = config.openai_key.as_deref()?;
        let mut agent = Self::new(key, &config.model);
        agent.planner_temperature = config.planner_temperature;
        agent.narrative_temperature = config.narrative_temperature;
        Some(agent)
    }

    /// JSON-mode completion request. Models that only accept the default
    /// temperature (the `nano` family) get none.
    fn build_request(&self, system: &str, user: String, temperature: f32) -> CreateChatCompletionRequest {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: system.to_string(),
                name: None,
                role: Role::System,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(user),
                name: None,
                role: Role::User,
            }),
        ];

        let temperature = if self.model.to_lowercase().contains("nano") {
            None
        } else {
            Some(temperature)
        };

        CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature,
            response_format: Some(ChatCompletionResponseFormat {
                r#type: ChatCompletionResponseFormatType::JsonObject,
            }),
            ..Default::default()
        }
    }

    async fn chat(&self, system: &str, user: String, temperature: f32) -> Result<String, AppError> {
        let request = self.build_request(system, user, temperature);
        let response = self.client.chat().create(request).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::LlmError("Model returned an empty completion".to_string()))
    }
}

/// Parses a model reply as JSON, tolerating prose around the outermost object.
pub fn extract_json(response: &str) -> Result<Value, AppError> {
    if let Ok(value) = serde_json::from_str::<Value>(response.trim()) {
        return Ok(value);
    }

    let json_str = JSON_OBJECT
        .find(response)
        .ok_or_else(|| AppError::ParseError(format!("No JSON found in model response: {}", response)))?
        .as_str();

    serde_json::from_str(json_str)
        .map_err(|e| AppError::ParseError(format!("Failed to parse JSON '{}': {}", json_str, e)))
}

fn narrative_prompt(question: &str, summary: &str) -> String {
    format!(
        r#"You are helping a non-technical business user understand their data.
Never mention SQL, queries, tables, columns or code. Speak in clear business language.

User question: "{question}"

Data summary:
{summary}

Provide:
1. An executive summary of 2-3 sentences
2. 3-5 key findings
3. Notable patterns or anomalies, if any
4. 1-2 recommendations, if applicable

Round numbers to at most 2 decimal places and prefer percentages and simple ranges.

Return JSON only:
{{
  "summary": "...",
  "key_findings": ["..."],
  "patterns": ["..."],
  "recommendations": ["..."]
}}"#
    )
}

#[async_trait]
impl SuggestionProvider for LlmAgent {
    async fn suggest(&self, question: &str, schema_context: &str) -> Result<Value, AppError> {
        let reply = self
            .chat(
                PLANNER_SYSTEM_PROMPT,
                planning_prompt(question, schema_context),
                self.planner_temperature,
            )
            .await?;
        tracing::debug!("Planner reply: {}", reply);
        extract_json(&reply)
    }
}

#[async_trait]
impl NarrativeProvider for LlmAgent {
    async fn narrate(
        &self,
        question: &str,
        rows: &[Row],
        profile: &DataStructureProfile,
    ) -> Result<Narrative, AppError> {
        let summary = results_summary(rows, profile);
        let reply = self
            .chat(
                NARRATIVE_SYSTEM_PROMPT,
                narrative_prompt(question, &summary),
                self.narrative_temperature,
            )
            .await?;
        let value = extract_json(&reply)?;
        if !value.is_object() {
            return Err(AppError::ParseError(format!("Narrative is not a JSON object: {}", value)));
        }
        Ok(serde_json::from_value(value)?)
    }
}
