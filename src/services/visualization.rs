use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::models::{Intent, Row};
use crate::services::structure::utils::coerce_number;
use crate::services::structure::{column_names, DataStructureProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Histogram,
    Pie,
    Scatter,
    Table,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<String>,
    /// Extra numeric columns drawn as separate lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<String>,
}

impl ChartConfig {
    fn new(chart_type: ChartType) -> Self {
        Self {
            chart_type,
            config: Map::new(),
            x_axis: None,
            y_axis: None,
            labels: None,
            values: None,
            series: Vec::new(),
        }
    }

    fn table(profile: &DataStructureProfile) -> Self {
        let mut chart = ChartConfig::new(ChartType::Table);
        let columns: Vec<&String> = profile.columns.keys().collect();
        chart.config.insert("columns".to_string(), json!(columns));
        chart
    }

    fn axes(chart_type: ChartType, x: &str, y: &str) -> Self {
        let mut chart = ChartConfig::new(chart_type);
        chart.x_axis = Some(x.to_string());
        chart.y_axis = Some(y.to_string());
        chart.config.insert("x_label".to_string(), json!(x));
        chart.config.insert("y_label".to_string(), json!(y));
        chart
    }

    fn categories(chart_type: ChartType, labels: &str, values: Option<&str>) -> Self {
        let mut chart = ChartConfig::new(chart_type);
        chart.labels = Some(labels.to_string());
        chart.values = values.map(str::to_string);
        chart
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSeries {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Rows reshaped into the layout a chart kind expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormattedData {
    Categories {
        labels: Vec<Value>,
        values: Vec<Option<f64>>,
    },
    MultiSeries {
        x: Vec<Value>,
        series: Vec<NamedSeries>,
    },
    Points {
        x: Vec<Value>,
        y: Vec<Option<f64>>,
    },
    Table {
        columns: Vec<String>,
        rows: Vec<Row>,
    },
}

/// Response envelope for a chart: kind, reshaped data and bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub data: FormattedData,
    pub config: Map<String, Value>,
    pub metadata: VisualizationMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualizationMetadata {
    pub x_axis: Option<String>,
    pub y_axis: Option<String>,
    pub labels: Option<String>,
    pub values: Option<String>,
}

impl Visualization {
    pub fn new(chart: ChartConfig, data: FormattedData) -> Self {
        Self {
            chart_type: chart.chart_type,
            data,
            metadata: VisualizationMetadata {
                x_axis: chart.x_axis,
                y_axis: chart.y_axis,
                labels: chart.labels,
                values: chart.values,
            },
            config: chart.config,
        }
    }
}

type ChartRule = fn(Intent, &DataStructureProfile) -> Option<ChartConfig>;

/// Tried in order; the first rule returning a chart wins.
const CHART_RULES: [ChartRule; 4] = [scatter_rule, time_series_rule, category_value_rule, single_category_rule];

fn scatter_rule(intent: Intent, profile: &DataStructureProfile) -> Option<ChartConfig> {
    let numeric_only = profile.numeric_columns.len() == profile.column_count;
    if intent != Intent::Relationship && !numeric_only {
        return None;
    }
    let [x, y, ..] = profile.numeric_columns.as_slice() else {
        return None;
    };
    let mut chart = ChartConfig::axes(ChartType::Scatter, x, y);
    chart.config.insert("show_trendline".to_string(), json!(intent == Intent::Relationship));
    Some(chart)
}

fn time_series_rule(_intent: Intent, profile: &DataStructureProfile) -> Option<ChartConfig> {
    if !profile.has_time_series {
        return None;
    }
    let x = profile.datetime_columns.first()?;
    let y = profile.numeric_columns.first()?;
    let mut chart = ChartConfig::axes(ChartType::Line, x, y);
    if profile.numeric_columns.len() > 1 {
        chart.series = profile.numeric_columns.clone();
    }
    chart.config.insert("show_points".to_string(), json!(profile.row_count <= 50));
    Some(chart)
}

fn label_column(profile: &DataStructureProfile) -> Option<&String> {
    profile
        .categorical_columns
        .first()
        .or_else(|| profile.text_columns.first())
}

fn category_value_rule(intent: Intent, profile: &DataStructureProfile) -> Option<ChartConfig> {
    let labels = label_column(profile)?;
    let values = profile.numeric_columns.first()?;
    let chart = match intent {
        Intent::Distribution => {
            let mut chart = ChartConfig::categories(ChartType::Histogram, labels, Some(values));
            chart.config.insert("bar_gap".to_string(), json!(0));
            chart
        }
        Intent::OutcomeBreakdown => {
            let mut chart = ChartConfig::categories(ChartType::Pie, labels, Some(values));
            chart.config.insert("show_percentages".to_string(), json!(true));
            chart
        }
        _ => {
            let mut chart = ChartConfig::categories(ChartType::Bar, labels, Some(values));
            chart.config.insert("orientation".to_string(), json!("vertical"));
            chart
        }
    };
    Some(chart)
}

fn single_category_rule(_intent: Intent, profile: &DataStructureProfile) -> Option<ChartConfig> {
    if profile.column_count != 1 {
        return None;
    }
    let labels = profile.categorical_columns.first()?;
    let mut chart = ChartConfig::categories(ChartType::Pie, labels, None);
    chart.config.insert("show_percentages".to_string(), json!(true));
    chart.config.insert("aggregate".to_string(), json!("count"));
    Some(chart)
}

/// Picks a chart kind and its column bindings. Falls back to a table.
pub fn select_chart(intent: Intent, profile: &DataStructureProfile) -> ChartConfig {
    if profile.is_empty() {
        return ChartConfig::table(profile);
    }
    CHART_RULES
        .iter()
        .find_map(|rule| rule(intent, profile))
        .unwrap_or_else(|| ChartConfig::table(profile))
}

fn column_values(rows: &[Row], column: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
        .collect()
}

fn numeric_values(rows: &[Row], column: &str) -> Vec<Option<f64>> {
    rows.iter()
        .map(|row| row.get(column).and_then(coerce_number))
        .collect()
}

fn identity_table(rows: &[Row]) -> FormattedData {
    FormattedData::Table {
        columns: column_names(rows),
        rows: rows.to_vec(),
    }
}

/// Occurrence counts per label, labels in first-seen order.
fn count_labels(rows: &[Row], column: &str) -> FormattedData {
    let mut counts: IndexMap<String, (Value, usize)> = IndexMap::new();
    for value in column_values(rows, column) {
        let key = value.to_string();
        counts.entry(key).or_insert((value, 0)).1 += 1;
    }
    let (labels, values): (Vec<Value>, Vec<Option<f64>>) = counts
        .into_values()
        .map(|(label, count)| (label, Some(count as f64)))
        .unzip();
    FormattedData::Categories { labels, values }
}

/// Reshapes rows for `chart`, preserving row order. A chart whose bindings
/// are incomplete is rendered as a table.
pub fn format_chart_data(rows: &[Row], chart: &ChartConfig) -> FormattedData {
    match chart.chart_type {
        ChartType::Bar | ChartType::Histogram | ChartType::Pie => match (&chart.labels, &chart.values) {
            (Some(labels), Some(values)) => FormattedData::Categories {
                labels: column_values(rows, labels),
                values: numeric_values(rows, values),
            },
            (Some(labels), None) => count_labels(rows, labels),
            _ => identity_table(rows),
        },
        ChartType::Line if !chart.series.is_empty() => match &chart.x_axis {
            Some(x) => FormattedData::MultiSeries {
                x: column_values(rows, x),
                series: chart
                    .series
                    .iter()
                    .map(|name| NamedSeries {
                        name: name.clone(),
                        values: numeric_values(rows, name),
                    })
                    .collect(),
            },
            None => identity_table(rows),
        },
        ChartType::Line => match (&chart.x_axis, &chart.y_axis) {
            (Some(x), Some(y)) => FormattedData::Points {
                x: column_values(rows, x),
                y: numeric_values(rows, y),
            },
            _ => identity_table(rows),
        },
        ChartType::Scatter => match (&chart.x_axis, &chart.y_axis) {
            (Some(x), Some(y)) => FormattedData::Points {
                x: numeric_values(rows, x).into_iter().map(|v| json!(v)).collect(),
                y: numeric_values(rows, y),
            },
            _ => identity_table(rows),
        },
        ChartType::Table => identity_table(rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::structure::analyze_structure;

    fn rows(values: Value) -> Vec<Row> {
        serde_json::from_value(values).unwrap()
    }

    fn chart_for(intent: Intent, data: &[Row]) -> ChartConfig {
        select_chart(intent, &analyze_structure(data))
    }

    #[test]
    fn test_empty_result_is_a_table() {
        let chart = chart_for(Intent::Overview, &[]);
        assert_eq!(chart.chart_type, ChartType::Table);
        assert_eq!(
            format_chart_data(&[], &chart),
            FormattedData::Table { columns: vec![], rows: vec![] }
        );
    }

    #[test]
    fn test_time_series_becomes_line() {
        let data = rows(json!([
            {"month": "2024-01-01", "visits": 10},
            {"month": "2024-02-01", "visits": 12},
            {"month": "2024-03-01", "visits": 9}
        ]));
        let chart = chart_for(Intent::Overview, &data);
        assert_eq!(chart.chart_type, ChartType::Line);
        assert_eq!(chart.x_axis.as_deref(), Some("month"));
        assert_eq!(chart.y_axis.as_deref(), Some("visits"));
        assert_eq!(
            format_chart_data(&data, &chart),
            FormattedData::Points {
                x: vec![json!("2024-01-01"), json!("2024-02-01"), json!("2024-03-01")],
                y: vec![Some(10.0), Some(12.0), Some(9.0)],
            }
        );
    }

    #[test]
    fn test_time_series_with_several_measures_is_multi_series() {
        let data = rows(json!([
            {"day": "2024-01-01", "a": 1, "b": 4},
            {"day": "2024-01-02", "a": 2, "b": null}
        ]));
        let chart = chart_for(Intent::Overview, &data);
        assert_eq!(chart.series, vec!["a", "b"]);
        match format_chart_data(&data, &chart) {
            FormattedData::MultiSeries { x, series } => {
                assert_eq!(x.len(), 2);
                assert_eq!(series[1].name, "b");
                assert_eq!(series[1].values, vec![Some(4.0), None]);
            }
            other => panic!("unexpected layout {:?}", other),
        }
    }

    #[test]
    fn test_category_and_value_becomes_bar() {
        let data = rows(json!([
            {"region": "north", "total": 5},
            {"region": "south", "total": 7},
            {"region": "north", "total": 2}
        ]));
        let chart = chart_for(Intent::CompareGroups, &data);
        assert_eq!(chart.chart_type, ChartType::Bar);
        assert_eq!(chart.labels.as_deref(), Some("region"));
        assert_eq!(chart.values.as_deref(), Some("total"));
        assert_eq!(
            format_chart_data(&data, &chart),
            FormattedData::Categories {
                labels: vec![json!("north"), json!("south"), json!("north")],
                values: vec![Some(5.0), Some(7.0), Some(2.0)],
            }
        );
    }

    #[test]
    fn test_intent_changes_category_chart_kind() {
        let data = rows(json!([
            {"bucket": "0-10", "count": 4},
            {"bucket": "10-20", "count": 9}
        ]));
        assert_eq!(chart_for(Intent::Distribution, &data).chart_type, ChartType::Histogram);
        assert_eq!(chart_for(Intent::OutcomeBreakdown, &data).chart_type, ChartType::Pie);
    }

    #[test]
    fn test_two_numeric_columns_become_scatter() {
        let data = rows(json!([
            {"bmi": 30.1, "glucose": 148},
            {"bmi": 26.6, "glucose": "85"},
            {"bmi": 23.3, "glucose": 183}
        ]));
        let chart = chart_for(Intent::Overview, &data);
        assert_eq!(chart.chart_type, ChartType::Scatter);
        assert_eq!(
            format_chart_data(&data, &chart),
            FormattedData::Points {
                x: vec![json!(30.1), json!(26.6), json!(23.3)],
                y: vec![Some(148.0), Some(85.0), Some(183.0)],
            }
        );
    }

    #[test]
    fn test_single_categorical_column_counts_occurrences() {
        let data = rows(json!([
            {"color": "red"}, {"color": "blue"}, {"color": "red"},
            {"color": "red"}, {"color": "blue"}, {"color": "green"}
        ]));
        let chart = chart_for(Intent::Overview, &data);
        assert_eq!(chart.chart_type, ChartType::Pie);
        assert!(chart.values.is_none());
        assert_eq!(
            format_chart_data(&data, &chart),
            FormattedData::Categories {
                labels: vec![json!("red"), json!("blue"), json!("green")],
                values: vec![Some(3.0), Some(2.0), Some(1.0)],
            }
        );
    }

    #[test]
    fn test_unmatched_shape_falls_back_to_identity_table() {
        let data = rows(json!([
            {"name": "ann", "note": "first"},
            {"name": "bob", "note": "second"}
        ]));
        let chart = chart_for(Intent::Overview, &data);
        assert_eq!(chart.chart_type, ChartType::Table);
        assert_eq!(
            format_chart_data(&data, &chart),
            FormattedData::Table {
                columns: vec!["name".to_string(), "note".to_string()],
                rows: data.clone(),
            }
        );
    }

    #[test]
    fn test_identity_table_unions_ragged_rows_once() {
        let data = rows(json!([
            {"b": 1, "a": 2},
            {"a": 3, "c": 4},
            {"c": 5, "b": 6, "d": 7}
        ]));
        let chart = ChartConfig::new(ChartType::Table);
        let FormattedData::Table { columns, rows } = format_chart_data(&data, &chart) else {
            panic!("expected a table");
        };
        assert_eq!(columns, vec!["b", "a", "c", "d"]);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_incomplete_bindings_render_as_table() {
        let data = rows(json!([{"a": 1}]));
        let chart = ChartConfig::new(ChartType::Bar);
        assert!(matches!(format_chart_data(&data, &chart), FormattedData::Table { .. }));
    }

    #[test]
    fn test_visualization_envelope_serializes_bindings() {
        let data = rows(json!([{"region": "north", "total": 5}, {"region": "north", "total": 1}]));
        let chart = chart_for(Intent::Overview, &data);
        let formatted = format_chart_data(&data, &chart);
        let envelope = serde_json::to_value(Visualization::new(chart, formatted)).unwrap();
        assert_eq!(envelope["type"], json!("bar"));
        assert_eq!(envelope["data"]["labels"], json!(["north", "north"]));
        assert_eq!(envelope["metadata"]["labels"], json!("region"));
        assert_eq!(envelope["metadata"]["x_axis"], Value::Null);
    }
}
