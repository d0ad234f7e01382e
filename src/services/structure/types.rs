use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Number of non-missing values the type classifier looks at.
pub const TYPE_SAMPLE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    Categorical,
    Datetime,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<ColumnStatistics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataStructureProfile {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: IndexMap<String, ColumnProfile>,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub datetime_columns: Vec<String>,
    pub text_columns: Vec<String>,
    pub has_time_series: bool,
    pub cardinality: IndexMap<String, usize>,
}

impl DataStructureProfile {
    pub fn is_empty(&self) -> bool {
        self.row_count == 0 || self.column_count == 0
    }

    pub fn statistics(&self, column: &str) -> Option<&ColumnStatistics> {
        self.columns.get(column)?.statistics.as_ref()
    }
}
