use std::collections::HashSet;
use std::ops::RangeInclusive;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::{
    AnalysisRequest, FilterSegment, FocusRange, Intent, Mode, Playbook, SchemaColumnType,
    SchemaInfo,
};

/// Generic outcome-label names, used as a last-resort target column.
pub const CANDIDATE_TARGETS: [&str; 4] = ["outcome", "target", "label", "y"];

pub const TOP_N_BOUNDS: RangeInclusive<i64> = 3..=50;
pub const BINS_BOUNDS: RangeInclusive<i64> = 5..=50;

/// Produces the raw, untrusted planning suggestion for a question.
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    async fn suggest(&self, question: &str, schema_context: &str) -> Result<Value, AppError>;
}

/// Always answers with the same suggestion.
#[derive(Debug, Clone, Default)]
pub struct StaticSuggestion(pub Value);

#[async_trait]
impl SuggestionProvider for StaticSuggestion {
    async fn suggest(&self, _question: &str, _schema_context: &str) -> Result<Value, AppError> {
        Ok(self.0.clone())
    }
}

pub const PLANNER_SYSTEM_PROMPT: &str = "You are a careful analysis planner. Always return valid JSON and never invent columns that are not in the schema.";

fn intent_description(intent: Intent) -> &'static str {
    match intent {
        Intent::Overview => "describe or summarize the dataset as a whole",
        Intent::Drivers => "which features are most related to an outcome or target",
        Intent::Distribution => "spread, range, outliers or histogram of one numeric column",
        Intent::Relationship => "how two specific numeric features relate to each other",
        Intent::CompareGroups => "compare two or more cohorts on key metrics",
        Intent::OutcomeBreakdown => "how often each outcome class occurs (class balance)",
        Intent::SegmentDrilldown => "summarize one restricted segment (e.g. only Outcome=1)",
    }
}

fn playbook_description(playbook: Playbook) -> &'static str {
    match playbook {
        Playbook::Overview => "dataset overview: size, numeric ranges, missingness",
        Playbook::Correlation => "top-N correlations with a target",
        Playbook::Distribution => "histogram of a single feature",
        Playbook::SegmentComparison => "metric comparison across segments",
        Playbook::OutcomeBreakdown => "class balance of the target",
        Playbook::FeatureOutcomeProfile => "outcome rate across bins of a feature",
        Playbook::Relationship => "scatter of two numeric features",
        Playbook::SegmentedDistribution => "distribution of a feature per segment",
    }
}

/// Request slots, the playbooks that read them and what belongs in them.
const SLOT_GUIDE: [(&str, &[Playbook], &str); 7] = [
    (
        "target",
        &[Playbook::Correlation, Playbook::OutcomeBreakdown, Playbook::FeatureOutcomeProfile],
        "the outcome or label column",
    ),
    (
        "feature",
        &[Playbook::Distribution, Playbook::FeatureOutcomeProfile, Playbook::SegmentedDistribution],
        "a numeric column",
    ),
    (
        "segment_column",
        &[Playbook::SegmentComparison, Playbook::SegmentedDistribution],
        "a categorical or boolean column",
    ),
    ("feature_x", &[Playbook::Relationship], "a numeric column"),
    ("feature_y", &[Playbook::Relationship], "a numeric column"),
    ("top_n", &[Playbook::Correlation], "how many ranked items to show"),
    (
        "bins",
        &[Playbook::Distribution, Playbook::FeatureOutcomeProfile, Playbook::SegmentedDistribution],
        "how many buckets to use",
    ),
];

fn quoted_names<I: IntoIterator<Item = &'static str>>(names: I) -> String {
    names
        .into_iter()
        .map(|name| format!("\"{}\"", name))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn slot_guide() -> String {
    SLOT_GUIDE
        .iter()
        .map(|(slot, playbooks, meaning)| {
            let users = playbooks.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(", ");
            format!("- \"{}\": {} (used by {})", slot, meaning, users)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the user prompt asking the model to choose an intent, a playbook
/// and the columns to focus on. The catalogs come from the same tables the
/// planner validates against.
pub fn planning_prompt(question: &str, schema_context: &str) -> String {
    let intents = Intent::ALL
        .iter()
        .map(|intent| format!("- \"{}\": {}", intent.as_str(), intent_description(*intent)))
        .collect::<Vec<_>>()
        .join("\n");
    let playbooks = Playbook::ALL
        .iter()
        .map(|playbook| format!("- \"{}\": {}", playbook.as_str(), playbook_description(*playbook)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Choose ONE analysis playbook for the user's question, based on the dataset schema.
You never write SQL. You only pick the intent, the playbook and the columns to focus on.

Intents:
{intents}

Playbooks:
{playbooks}

Fields:
{slots}

Dataset schema:
{schema_context}

User question: "{question}"

Return a JSON object ONLY:
{{
  "intent": {intent_names},
  "playbook": {playbook_names},
  "target": "column_name or null",
  "feature": "column_name or null",
  "segment_column": "column_name or null",
  "feature_x": "column_name or null",
  "feature_y": "column_name or null",
  "top_n": number or null,
  "bins": number or null,
  "filter_segment": {{ "column": string, "value": string | number | boolean }} | null,
  "focus_range": {{ "feature": string, "min": number, "max": number }} | null,
  "secondary_playbooks": string[] | null,
  "mode": "quick" | "deep"
}}

Rules:
- Choose the intent first, then a playbook that implements it.
- For "drivers", choose a numeric column that looks like the outcome or target (e.g. a binary label) if possible.
- For "relationship", put the two features the user names in "feature_x" and "feature_y" (e.g. pregnancies vs age).
- When the user mentions a specific count like "top 3" or "top 10", set "top_n" accordingly (between {top_min} and {top_max}).
- When the user asks for more or fewer buckets, ranges or granularity, set "bins" between {bins_min} and {bins_max}.
- Use "filter_segment" when the user restricts the analysis to a group (e.g. only Outcome=1, or only Age > 60).
- Use "focus_range" when the user gives a value range of interest for a numeric feature (e.g. glucose between 80 and 200).
- Only request secondary playbooks when they clearly help answer the question, never just to show more charts. For example:
  - with "{correlation}" you might add "{profile}" for the most important feature;
  - with "{breakdown}" you might add "{distribution}" for a key feature by outcome.
- Use "deep" mode only when the user clearly asks for a very detailed analysis; otherwise "quick".
- If unsure of a column, set the field to null."#,
        slots = slot_guide(),
        intent_names = quoted_names(Intent::ALL.iter().map(|i| i.as_str())),
        playbook_names = quoted_names(Playbook::ALL.iter().map(|p| p.as_str())),
        top_min = TOP_N_BOUNDS.start(),
        top_max = TOP_N_BOUNDS.end(),
        bins_min = BINS_BOUNDS.start(),
        bins_max = BINS_BOUNDS.end(),
        correlation = Playbook::Correlation.as_str(),
        profile = Playbook::FeatureOutcomeProfile.as_str(),
        breakdown = Playbook::OutcomeBreakdown.as_str(),
        distribution = Playbook::Distribution.as_str(),
    )
}

fn is_candidate_target(name: &str) -> bool {
    let lower = name.to_lowercase();
    CANDIDATE_TARGETS.contains(&lower.as_str())
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Truncates toward zero and clamps. Anything that is not a JSON number is dropped.
fn clamp_param(value: Option<&Value>, bounds: &RangeInclusive<i64>) -> Option<u32> {
    let raw = value?.as_f64()?;
    let truncated = raw.trunc() as i64;
    Some(truncated.clamp(*bounds.start(), *bounds.end()) as u32)
}

fn parse_filter_segment(value: Option<&Value>) -> Option<FilterSegment> {
    let fields = value?.as_object()?;
    let column = string_field(fields, "column")?;
    let value = fields.get("value")?;
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Some(FilterSegment {
            column,
            value: value.clone(),
        }),
        _ => None,
    }
}

fn parse_focus_range(value: Option<&Value>) -> Option<FocusRange> {
    let fields = value?.as_object()?;
    let feature = string_field(fields, "feature")?;
    let min = fields.get("min")?.as_f64()?;
    let max = fields.get("max")?.as_f64()?;
    let (min, max) = if min > max { (max, min) } else { (min, max) };
    Some(FocusRange { feature, min, max })
}

fn parse_secondary_playbooks(value: Option<&Value>, primary: Playbook) -> Vec<Playbook> {
    let Some(entries) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(Value::as_str)
        .filter_map(Playbook::from_name)
        .filter(|playbook| *playbook != primary)
        .collect()
}

/// First column, tables then columns in order, named like a generic outcome.
fn infer_target(schema: &SchemaInfo) -> Option<String> {
    schema
        .columns()
        .find(|column| is_candidate_target(&column.name))
        .map(|column| column.name.clone())
}

/// Schema columns whose name appears, case-insensitively, inside the question.
pub fn mentioned_columns<'a>(user_query: &str, schema: &'a SchemaInfo) -> Vec<&'a str> {
    let lower_query = user_query.to_lowercase();
    schema
        .columns()
        .filter(|column| !column.name.is_empty())
        .filter(|column| lower_query.contains(&column.name.to_lowercase()))
        .map(|column| column.name.as_str())
        .collect()
}

/// Turns an untrusted planning suggestion into a bounded [`AnalysisRequest`].
///
/// Every recoverable defect degrades to a default or an absent field. Only a
/// suggestion that is not a JSON object short-circuits, to the default request.
pub fn plan(user_query: &str, schema: &SchemaInfo, suggestion: &Value) -> AnalysisRequest {
    let Some(fields) = suggestion.as_object() else {
        warn!("Planner received a non-object suggestion, using default plan: {}", suggestion);
        return AnalysisRequest::default();
    };

    let intent = match fields.get("intent").and_then(Value::as_str).and_then(Intent::from_name) {
        Some(intent) => intent,
        None => {
            debug!("Unrecognised intent {:?}, using overview", fields.get("intent"));
            Intent::Overview
        }
    };

    let playbook = match fields.get("playbook").and_then(Value::as_str).and_then(Playbook::from_name) {
        Some(playbook) => playbook,
        None => {
            let repaired = intent.default_playbook();
            debug!("Playbook {:?} repaired to {} from intent {}", fields.get("playbook"), repaired.as_str(), intent.as_str());
            repaired
        }
    };

    let mut target = string_field(fields, "target");
    let feature = string_field(fields, "feature");
    let segment_column = string_field(fields, "segment_column");
    let mut feature_x = string_field(fields, "feature_x");
    let mut feature_y = string_field(fields, "feature_y");

    if playbook.needs_target() && target.is_none() {
        target = infer_target(schema);
        if let Some(inferred) = &target {
            debug!("Inferred target column '{}' for {}", inferred, playbook.as_str());
        }
    }

    let mentioned = mentioned_columns(user_query, schema);

    // A concrete column the user named beats a generic outcome label.
    if playbook == Playbook::Correlation {
        let generic_target = target.as_deref().map_or(true, is_candidate_target);
        if generic_target {
            if let Some(mention) = mentioned.iter().find(|name| !is_candidate_target(name)) {
                debug!("Correlation target overridden by mention '{}'", mention);
                target = Some(mention.to_string());
            }
        }
    }

    if playbook == Playbook::Relationship {
        let numeric_names: HashSet<&str> = schema
            .columns()
            .filter(|column| column.column_type == SchemaColumnType::Number)
            .map(|column| column.name.as_str())
            .collect();
        let numeric_mentions: Vec<&str> = mentioned
            .iter()
            .copied()
            .filter(|name| numeric_names.contains(name))
            .collect();
        if let [first, second, ..] = numeric_mentions.as_slice() {
            feature_x.get_or_insert_with(|| first.to_string());
            feature_y.get_or_insert_with(|| second.to_string());
        }
    }

    let top_n = clamp_param(fields.get("top_n"), &TOP_N_BOUNDS);
    let bins = clamp_param(fields.get("bins"), &BINS_BOUNDS);
    let secondary_playbooks = parse_secondary_playbooks(fields.get("secondary_playbooks"), playbook);

    let mode = match fields.get("mode") {
        None | Some(Value::Null) => Mode::Quick,
        Some(raw) => raw.as_str().and_then(Mode::from_name).unwrap_or_else(|| {
            warn!("Unrecognised mode {}, using quick", raw);
            Mode::Quick
        }),
    };

    AnalysisRequest {
        intent,
        playbook,
        target,
        feature,
        segment_column,
        feature_x,
        feature_y,
        top_n,
        bins,
        filter_segment: parse_filter_segment(fields.get("filter_segment")),
        focus_range: parse_focus_range(fields.get("focus_range")),
        secondary_playbooks,
        mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diabetes_schema() -> SchemaInfo {
        serde_json::from_value(json!({
            "tables": [{
                "name": "diabetes",
                "columns": [
                    {"name": "Pregnancies", "type": "number"},
                    {"name": "Glucose", "type": "number"},
                    {"name": "Age", "type": "number"},
                    {"name": "Region", "type": "string"},
                    {"name": "Outcome", "type": "number"}
                ]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_mentions_keep_duplicates_across_tables() {
        let schema: SchemaInfo = serde_json::from_value(json!({
            "tables": [
                {"name": "a", "columns": [{"name": "age", "type": "number"}]},
                {"name": "b", "columns": [
                    {"name": "Age", "type": "number"},
                    {"name": "bmi", "type": "number"}
                ]}
            ]
        }))
        .unwrap();

        let query = "how does age relate to bmi";
        assert_eq!(mentioned_columns(query, &schema), vec!["age", "Age", "bmi"]);

        let request = plan(query, &schema, &json!({"intent": "relationship"}));
        assert_eq!(request.feature_x.as_deref(), Some("age"));
        assert_eq!(request.feature_y.as_deref(), Some("Age"));
    }

    #[test]
    fn test_empty_schema_gives_no_heuristics() {
        let schema = SchemaInfo::default();
        assert!(mentioned_columns("glucose", &schema).is_empty());

        let request = plan("glucose", &schema, &json!({"playbook": "correlation"}));
        assert_eq!(request.playbook, Playbook::Correlation);
        assert!(request.target.is_none());

        let request = plan("glucose vs age", &schema, &json!({"intent": "relationship"}));
        assert!(request.feature_x.is_none());
        assert!(request.feature_y.is_none());
    }

    #[test]
    fn test_non_object_suggestions_get_default_plan() {
        let schema = diabetes_schema();
        for raw in [json!(null), json!("correlation"), json!([1, 2]), json!(42), json!(true)] {
            let request = plan("anything about glucose", &schema, &raw);
            assert_eq!(request, AnalysisRequest::default());
            assert_eq!(request.playbook, Playbook::Overview);
            assert_eq!(request.mode, Mode::Quick);
            assert!(request.target.is_none());
        }
    }

    #[test]
    fn test_invalid_intent_becomes_overview() {
        let schema = diabetes_schema();
        for intent in [json!("predict"), json!(7), json!(null), json!("OVERVIEW")] {
            let request = plan("describe", &schema, &json!({"intent": intent}));
            assert_eq!(request.intent, Intent::Overview);
            assert_eq!(request.playbook, Playbook::Overview);
        }
    }

    #[test]
    fn test_playbook_repaired_from_intent() {
        let schema = diabetes_schema();
        let request = plan("", &schema, &json!({"intent": "compare_groups", "playbook": "pivot"}));
        assert_eq!(request.playbook, Playbook::SegmentComparison);

        let request = plan("", &schema, &json!({"intent": "segment_drilldown"}));
        assert_eq!(request.playbook, Playbook::Overview);

        let request = plan("", &schema, &json!({"intent": "overview", "playbook": "segmented_distribution"}));
        assert_eq!(request.playbook, Playbook::SegmentedDistribution);
    }

    #[test]
    fn test_target_inferred_from_candidate_names() {
        let schema = diabetes_schema();
        let request = plan("how balanced are the classes", &schema, &json!({"intent": "outcome_breakdown"}));
        assert_eq!(request.playbook, Playbook::OutcomeBreakdown);
        assert_eq!(request.target.as_deref(), Some("Outcome"));
    }

    #[test]
    fn test_target_inference_stops_at_first_table_match() {
        let schema: SchemaInfo = serde_json::from_value(json!({
            "tables": [
                {"name": "a", "columns": [{"name": "x", "type": "number"}, {"name": "LABEL", "type": "number"}]},
                {"name": "b", "columns": [{"name": "target", "type": "number"}]}
            ]
        }))
        .unwrap();
        let request = plan("", &schema, &json!({"playbook": "outcome_breakdown"}));
        assert_eq!(request.target.as_deref(), Some("LABEL"));
    }

    #[test]
    fn test_correlation_mention_overrides_generic_target() {
        let schema = diabetes_schema();
        let raw = json!({"playbook": "correlation", "target": "outcome"});
        let request = plan("what drives glucose?", &schema, &raw);
        assert_eq!(request.target.as_deref(), Some("Glucose"));
    }

    #[test]
    fn test_correlation_keeps_concrete_target() {
        let schema = diabetes_schema();
        let raw = json!({"playbook": "correlation", "target": "Age"});
        let request = plan("what drives glucose?", &schema, &raw);
        assert_eq!(request.target.as_deref(), Some("Age"));
    }

    #[test]
    fn test_correlation_with_only_outcome_mentioned_keeps_inferred_target() {
        let schema = diabetes_schema();
        let request = plan("which features drive the outcome", &schema, &json!({"intent": "drivers"}));
        assert_eq!(request.playbook, Playbook::Correlation);
        assert_eq!(request.target.as_deref(), Some("Outcome"));
    }

    #[test]
    fn test_relationship_pair_from_numeric_mentions() {
        let schema = diabetes_schema();
        let request = plan(
            "how does pregnancies relate to age",
            &schema,
            &json!({"playbook": "relationship"}),
        );
        assert_eq!(request.feature_x.as_deref(), Some("Pregnancies"));
        assert_eq!(request.feature_y.as_deref(), Some("Age"));
    }

    #[test]
    fn test_relationship_never_overwrites_supplied_features() {
        let schema = diabetes_schema();
        let request = plan(
            "how does pregnancies relate to age",
            &schema,
            &json!({"playbook": "relationship", "feature_x": "Glucose"}),
        );
        assert_eq!(request.feature_x.as_deref(), Some("Glucose"));
        assert_eq!(request.feature_y.as_deref(), Some("Age"));
    }

    #[test]
    fn test_relationship_ignores_non_numeric_mentions() {
        let schema = diabetes_schema();
        let request = plan("region vs age", &schema, &json!({"playbook": "relationship"}));
        assert!(request.feature_x.is_none());
        assert!(request.feature_y.is_none());
    }

    #[test]
    fn test_numeric_params_are_clamped() {
        let schema = diabetes_schema();
        let cases = [
            (json!(1), json!(100), Some(3), Some(50)),
            (json!(10.9), json!(7.2), Some(10), Some(7)),
            (json!(-4), json!(-0.5), Some(3), Some(5)),
            (json!(1e12), json!(20), Some(50), Some(20)),
            (json!("10"), json!(true), None, None),
            (json!(null), json!([5]), None, None),
        ];
        for (top_n, bins, expected_top, expected_bins) in cases {
            let request = plan("", &schema, &json!({"top_n": top_n, "bins": bins}));
            assert_eq!(request.top_n, expected_top);
            assert_eq!(request.bins, expected_bins);
        }
    }

    #[test]
    fn test_secondary_playbooks_sanitised() {
        let schema = diabetes_schema();
        let raw = json!({
            "playbook": "correlation",
            "secondary_playbooks": ["feature_outcome_profile", "correlation", 3, "charts", "distribution", null]
        });
        let request = plan("", &schema, &raw);
        assert_eq!(
            request.secondary_playbooks,
            vec![Playbook::FeatureOutcomeProfile, Playbook::Distribution]
        );

        let request = plan("", &schema, &json!({"secondary_playbooks": "distribution"}));
        assert!(request.secondary_playbooks.is_empty());
    }

    #[test]
    fn test_mode_defaults_and_unknown_values_degrade() {
        let schema = diabetes_schema();
        assert_eq!(plan("", &schema, &json!({})).mode, Mode::Quick);
        assert_eq!(plan("", &schema, &json!({"mode": "deep"})).mode, Mode::Deep);
        assert_eq!(plan("", &schema, &json!({"mode": "thorough"})).mode, Mode::Quick);
    }

    #[test]
    fn test_structured_fields_validated() {
        let schema = diabetes_schema();
        let raw = json!({
            "filter_segment": {"column": "Outcome", "value": 1},
            "focus_range": {"feature": "Glucose", "min": 200, "max": 80},
            "feature": 12
        });
        let request = plan("", &schema, &raw);
        assert_eq!(
            request.filter_segment,
            Some(FilterSegment { column: "Outcome".to_string(), value: json!(1) })
        );
        assert_eq!(
            request.focus_range,
            Some(FocusRange { feature: "Glucose".to_string(), min: 80.0, max: 200.0 })
        );
        assert!(request.feature.is_none());

        let raw = json!({
            "filter_segment": {"column": "Outcome", "value": {"eq": 1}},
            "focus_range": {"feature": "Glucose", "min": "low", "max": 80}
        });
        let request = plan("", &schema, &raw);
        assert!(request.filter_segment.is_none());
        assert!(request.focus_range.is_none());
    }

    #[test]
    fn test_mentions_keep_schema_order() {
        let schema = diabetes_schema();
        assert_eq!(
            mentioned_columns("AGE and glucose by region", &schema),
            vec!["Glucose", "Age", "Region"]
        );
    }

    #[test]
    fn test_prompt_lists_every_playbook() {
        let prompt = planning_prompt("what drives glucose", "Table: diabetes");
        for playbook in Playbook::ALL {
            assert!(prompt.contains(&format!("\"{}\"", playbook.as_str())));
        }
        assert!(prompt.contains("User question: \"what drives glucose\""));
        assert!(prompt.contains("between 3 and 50"));
    }

    #[test]
    fn test_prompt_explains_slots_and_filters() {
        let prompt = planning_prompt("only Outcome=1 with glucose between 80 and 200", "Table: diabetes");

        assert!(prompt.contains(
            "- \"target\": the outcome or label column (used by correlation, outcome_breakdown, feature_outcome_profile)"
        ));
        assert!(prompt.contains("- \"segment_column\": a categorical or boolean column (used by segment_comparison"));
        assert!(prompt.contains("Use \"filter_segment\" when the user restricts the analysis to a group"));
        assert!(prompt.contains("Use \"focus_range\" when the user gives a value range"));
        assert!(prompt.contains("\"top 3\" or \"top 10\""));
        assert!(prompt.contains("with \"correlation\" you might add \"feature_outcome_profile\""));
    }

    #[test]
    fn test_static_suggestion_returns_its_value() {
        let provider = StaticSuggestion(json!({"intent": "drivers"}));
        let value = tokio_test::block_on(provider.suggest("q", "ctx")).unwrap();
        assert_eq!(value, json!({"intent": "drivers"}));
    }
}
