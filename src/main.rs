use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use insight_services::{
    config,
    error::AppError,
    logging,
    models::{AnalysisRequest, Row, SchemaInfo},
    services::{
        llm_agent::LlmAgent,
        narrative::{NarrativeProvider, StatisticalNarrator},
        pipeline::{PlaybookExecutor, QueryPipeline},
        planner::{StaticSuggestion, SuggestionProvider},
    },
};

/// Input document: the question, the dataset schema and the rows the playbook produced.
#[derive(Debug, Deserialize)]
struct QueryFile {
    question: String,
    schema: SchemaInfo,
    #[serde(default)]
    rows: Vec<Row>,
    #[serde(default)]
    suggestion: Value,
}

/// Serves the rows given in the input document for whatever playbook was planned.
struct InlineRows(Vec<Row>);

#[async_trait]
impl PlaybookExecutor for InlineRows {
    async fn execute(&self, request: &AnalysisRequest) -> Result<Vec<Row>, AppError> {
        tracing::info!("Serving {} inline rows for playbook {}", self.0.len(), request.playbook.as_str());
        Ok(self.0.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::load_config()?;

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: insight_services <query.json>");
    };
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path))?;
    let query: QueryFile =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path))?;

    let (suggestions, narrator): (Arc<dyn SuggestionProvider>, Arc<dyn NarrativeProvider>) =
        match LlmAgent::from_config(&config) {
            Some(agent) => {
                tracing::info!("Using model {}", config.model);
                let agent = Arc::new(agent);
                let suggestions: Arc<dyn SuggestionProvider> = agent.clone();
                let narrator: Arc<dyn NarrativeProvider> = agent;
                (suggestions, narrator)
            }
            None => {
                tracing::warn!("OPENAI_API_KEY not set, running offline");
                let suggestions: Arc<dyn SuggestionProvider> =
                    Arc::new(StaticSuggestion(query.suggestion.clone()));
                let narrator: Arc<dyn NarrativeProvider> = Arc::new(StatisticalNarrator);
                (suggestions, narrator)
            }
        };

    let pipeline = QueryPipeline::new(suggestions, Arc::new(InlineRows(query.rows)), narrator);
    let insight = pipeline.run(&query.question, &query.schema).await?;

    println!("{}", serde_json::to_string_pretty(&insight)?);

    Ok(())
}
