use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::error::AppError;
use crate::models::{AnalysisRequest, Row, SchemaInfo};
use crate::services::narrative::{generate_narrative, Narrative, NarrativeProvider};
use crate::services::planner::{plan, SuggestionProvider};
use crate::services::schema_context::render_schema_context;
use crate::services::structure::{analyze_structure, DataStructureProfile};
use crate::services::visualization::{format_chart_data, select_chart, Visualization};

/// Runs a planned playbook and returns its result rows.
#[async_trait]
pub trait PlaybookExecutor: Send + Sync {
    async fn execute(&self, request: &AnalysisRequest) -> Result<Vec<Row>, AppError>;
}

/// Everything produced for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryInsight {
    pub request: AnalysisRequest,
    pub results: Vec<Row>,
    pub visualization: Visualization,
    pub analysis: Narrative,
    pub data_structure: DataStructureProfile,
}

#[derive(Clone)]
pub struct QueryPipeline {
    suggestions: Arc<dyn SuggestionProvider>,
    executor: Arc<dyn PlaybookExecutor>,
    narrator: Arc<dyn NarrativeProvider>,
}

impl QueryPipeline {
    pub fn new(
        suggestions: Arc<dyn SuggestionProvider>,
        executor: Arc<dyn PlaybookExecutor>,
        narrator: Arc<dyn NarrativeProvider>,
    ) -> Self {
        Self {
            suggestions,
            executor,
            narrator,
        }
    }

    /// Plans the question against `schema`. A failing suggestion provider
    /// yields the default plan rather than an error.
    pub async fn plan_question(&self, question: &str, schema: &SchemaInfo) -> AnalysisRequest {
        let context = render_schema_context(schema);
        let suggestion = match self.suggestions.suggest(question, &context).await {
            Ok(suggestion) => suggestion,
            Err(e) => {
                error!("Suggestion provider failed: {}", e);
                Value::Null
            }
        };
        plan(question, schema, &suggestion)
    }

    pub async fn run(&self, question: &str, schema: &SchemaInfo) -> Result<QueryInsight, AppError> {
        let start = Instant::now();

        if schema.tables.is_empty() {
            return Err(AppError::InvalidInput("Dataset has no tables".to_string()));
        }

        let request = self.plan_question(question, schema).await;
        info!(
            "Planned intent={} playbook={} target={:?} in {:?}",
            request.intent.as_str(),
            request.playbook.as_str(),
            request.target,
            start.elapsed()
        );

        let execute_start = Instant::now();
        let results = self.executor.execute(&request).await?;
        info!("Playbook {} returned {} rows in {:?}", request.playbook.as_str(), results.len(), execute_start.elapsed());

        let data_structure = analyze_structure(&results);
        let chart = select_chart(request.intent, &data_structure);
        let data = format_chart_data(&results, &chart);
        let visualization = Visualization::new(chart, data);

        let analysis = generate_narrative(self.narrator.as_ref(), question, &results, &data_structure).await;

        info!("Question answered in {:?}", start.elapsed());

        Ok(QueryInsight {
            request,
            results,
            visualization,
            analysis,
            data_structure,
        })
    }
}
