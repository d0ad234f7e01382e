use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result or sample row, keyed by column name in source order.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaInfo {
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub sample_rows: Vec<Row>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnSchema {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: SchemaColumnType,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaColumnType {
    Number,
    String,
    Date,
    Boolean,
    #[default]
    #[serde(other)]
    Unknown,
}

impl SchemaColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaColumnType::Number => "number",
            SchemaColumnType::String => "string",
            SchemaColumnType::Date => "date",
            SchemaColumnType::Boolean => "boolean",
            SchemaColumnType::Unknown => "unknown",
        }
    }
}

impl SchemaInfo {
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|table| table.name.as_str()).collect()
    }

    /// Every column of every table, tables first, each in declared order.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.tables.iter().flat_map(|table| table.columns.iter())
    }
}

/// The user-facing analytical goal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    Overview,
    Drivers,
    Distribution,
    Relationship,
    CompareGroups,
    OutcomeBreakdown,
    SegmentDrilldown,
}

/// Playbook used when the suggestion names none (or an unknown one).
/// A segment drilldown runs as a filtered overview.
const INTENT_PLAYBOOKS: [(Intent, Playbook); 7] = [
    (Intent::Overview, Playbook::Overview),
    (Intent::Drivers, Playbook::Correlation),
    (Intent::Distribution, Playbook::Distribution),
    (Intent::Relationship, Playbook::Relationship),
    (Intent::CompareGroups, Playbook::SegmentComparison),
    (Intent::OutcomeBreakdown, Playbook::OutcomeBreakdown),
    (Intent::SegmentDrilldown, Playbook::Overview),
];

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::Overview,
        Intent::Drivers,
        Intent::Distribution,
        Intent::Relationship,
        Intent::CompareGroups,
        Intent::OutcomeBreakdown,
        Intent::SegmentDrilldown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Overview => "overview",
            Intent::Drivers => "drivers",
            Intent::Distribution => "distribution",
            Intent::Relationship => "relationship",
            Intent::CompareGroups => "compare_groups",
            Intent::OutcomeBreakdown => "outcome_breakdown",
            Intent::SegmentDrilldown => "segment_drilldown",
        }
    }

    pub fn from_name(name: &str) -> Option<Intent> {
        Intent::ALL.into_iter().find(|intent| intent.as_str() == name)
    }

    pub fn default_playbook(&self) -> Playbook {
        INTENT_PLAYBOOKS
            .iter()
            .find(|(intent, _)| intent == self)
            .map(|(_, playbook)| *playbook)
            .unwrap_or(Playbook::Overview)
    }
}

/// A named deterministic analysis routine run by the playbook executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Playbook {
    #[default]
    Overview,
    Correlation,
    Distribution,
    SegmentComparison,
    OutcomeBreakdown,
    FeatureOutcomeProfile,
    Relationship,
    SegmentedDistribution,
}

impl Playbook {
    pub const ALL: [Playbook; 8] = [
        Playbook::Overview,
        Playbook::Correlation,
        Playbook::Distribution,
        Playbook::SegmentComparison,
        Playbook::OutcomeBreakdown,
        Playbook::FeatureOutcomeProfile,
        Playbook::Relationship,
        Playbook::SegmentedDistribution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Playbook::Overview => "overview",
            Playbook::Correlation => "correlation",
            Playbook::Distribution => "distribution",
            Playbook::SegmentComparison => "segment_comparison",
            Playbook::OutcomeBreakdown => "outcome_breakdown",
            Playbook::FeatureOutcomeProfile => "feature_outcome_profile",
            Playbook::Relationship => "relationship",
            Playbook::SegmentedDistribution => "segmented_distribution",
        }
    }

    pub fn from_name(name: &str) -> Option<Playbook> {
        Playbook::ALL.into_iter().find(|playbook| playbook.as_str() == name)
    }

    /// Playbooks that are meaningless without an outcome column.
    pub fn needs_target(&self) -> bool {
        matches!(self, Playbook::Correlation | Playbook::OutcomeBreakdown)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Quick,
    Deep,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Quick => "quick",
            Mode::Deep => "deep",
        }
    }

    pub fn from_name(name: &str) -> Option<Mode> {
        match name {
            "quick" => Some(Mode::Quick),
            "deep" => Some(Mode::Deep),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSegment {
    pub column: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusRange {
    pub feature: String,
    pub min: f64,
    pub max: f64,
}

/// A validated, bounded description of the analysis to run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub intent: Intent,
    pub playbook: Playbook,
    pub target: Option<String>,
    pub feature: Option<String>,
    pub segment_column: Option<String>,
    pub feature_x: Option<String>,
    pub feature_y: Option<String>,
    pub top_n: Option<u32>,
    pub bins: Option<u32>,
    pub filter_segment: Option<FilterSegment>,
    pub focus_range: Option<FocusRange>,
    pub secondary_playbooks: Vec<Playbook>,
    pub mode: Mode,
}
