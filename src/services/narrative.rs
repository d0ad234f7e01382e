use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AppError;
use crate::models::Row;
use crate::services::structure::DataStructureProfile;

const SUMMARY_SAMPLE_ROWS: usize = 5;

/// Plain-language commentary on a result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Narrative {
    pub summary: String,
    pub key_findings: Vec<String>,
    pub patterns: Vec<String>,
    pub recommendations: Vec<String>,
}

#[async_trait]
pub trait NarrativeProvider: Send + Sync {
    async fn narrate(
        &self,
        question: &str,
        rows: &[Row],
        profile: &DataStructureProfile,
    ) -> Result<Narrative, AppError>;
}

/// Narrative built from row counts and numeric statistics only. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticalNarrator;

impl StatisticalNarrator {
    pub fn summarize(&self, rows: &[Row], profile: &DataStructureProfile) -> Narrative {
        let row_count = rows.len();
        let plural = if row_count == 1 { "" } else { "s" };

        let mut key_findings = Vec::new();
        if row_count > 0 {
            key_findings.push(format!("Total records: {}", row_count));
        }
        for column in &profile.numeric_columns {
            if let Some(stats) = profile.statistics(column) {
                key_findings.push(format!(
                    "{} ranges from {} to {} (average: {:.2})",
                    column, stats.min, stats.max, stats.mean
                ));
            }
        }

        Narrative {
            summary: format!("Query returned {} result{}.", row_count, plural),
            key_findings,
            patterns: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

#[async_trait]
impl NarrativeProvider for StatisticalNarrator {
    async fn narrate(
        &self,
        _question: &str,
        rows: &[Row],
        profile: &DataStructureProfile,
    ) -> Result<Narrative, AppError> {
        Ok(self.summarize(rows, profile))
    }
}

/// Compact description of a result set for the narrative model: size,
/// columns, the first rows and per-column statistics.
pub fn results_summary(rows: &[Row], profile: &DataStructureProfile) -> String {
    if rows.is_empty() {
        return "No results returned from query.".to_string();
    }

    let column_names: Vec<&str> = profile.columns.keys().map(String::as_str).collect();
    let mut parts = vec![
        format!("Total rows: {}", rows.len()),
        format!("Columns: {}", column_names.join(", ")),
        format!("\nSample data (first {} rows):", SUMMARY_SAMPLE_ROWS),
    ];

    for (i, row) in rows.iter().take(SUMMARY_SAMPLE_ROWS).enumerate() {
        parts.push(format!("Row {}: {}", i + 1, serde_json::to_string(row).unwrap_or_default()));
    }

    for column in &profile.numeric_columns {
        if let Some(stats) = profile.statistics(column) {
            parts.push(format!(
                "\n{} statistics: min={}, max={}, mean={:.2}, median={:.2}",
                column, stats.min, stats.max, stats.mean, stats.median
            ));
        }
    }

    parts.join("\n")
}

/// Asks `provider` for the narrative and substitutes the statistical one when
/// the provider fails.
pub async fn generate_narrative(
    provider: &dyn NarrativeProvider,
    question: &str,
    rows: &[Row],
    profile: &DataStructureProfile,
) -> Narrative {
    match provider.narrate(question, rows, profile).await {
        Ok(narrative) => narrative,
        Err(e) => {
            warn!("Narrative generation failed, using statistical summary: {}", e);
            StatisticalNarrator.summarize(rows, profile)
        }
    }
}
