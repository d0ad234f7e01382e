use std::collections::HashSet;

use indexmap::IndexSet;
use rayon::prelude::*;
use serde_json::Value;
use smallvec::SmallVec;

use super::types::*;
use super::utils::*;
use crate::models::Row;

const TYPE_CONFIDENCE: f64 = 0.8;
const MAX_CATEGORIES: usize = 20;

type Sample<'a> = SmallVec<[&'a Value; TYPE_SAMPLE_SIZE]>;

/// One link of the classification chain: a verdict, or `None` to fall through.
type Classifier = fn(&[&Value]) -> Option<ColumnType>;

const CLASSIFIERS: [Classifier; 3] = [classify_datetime, classify_numeric, classify_categorical];

fn meets_confidence(matches: usize, sample_len: usize) -> bool {
    matches as f64 >= sample_len as f64 * TYPE_CONFIDENCE
}

fn classify_datetime(sample: &[&Value]) -> Option<ColumnType> {
    let dates = sample.iter().filter(|v| is_datetime_value(v)).count();
    meets_confidence(dates, sample.len()).then_some(ColumnType::Datetime)
}

fn classify_numeric(sample: &[&Value]) -> Option<ColumnType> {
    let numbers = sample.iter().filter(|v| coerce_number(v).is_some()).count();
    meets_confidence(numbers, sample.len()).then_some(ColumnType::Numeric)
}

fn classify_categorical(sample: &[&Value]) -> Option<ColumnType> {
    let distinct: HashSet<String> = sample.iter().map(|v| display_value(v)).collect();
    (distinct.len() <= MAX_CATEGORIES && distinct.len() < sample.len())
        .then_some(ColumnType::Categorical)
}

/// Classifies a column from its type-inference sample. Datetime wins over
/// numeric, numeric over categorical; anything left is text.
pub fn infer_column_type(sample: &[&Value]) -> ColumnType {
    if sample.is_empty() {
        return ColumnType::Text;
    }
    CLASSIFIERS
        .iter()
        .find_map(|classify| classify(sample))
        .unwrap_or(ColumnType::Text)
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn profile_column(name: &str, rows: &[Row]) -> (ColumnProfile, usize) {
    let mut nullable = false;
    let mut sample: Sample = SmallVec::new();
    let mut distinct: HashSet<DistinctKey> = HashSet::new();
    let mut numbers: Vec<f64> = Vec::new();

    for row in rows {
        let Some(value) = present(row.get(name)) else {
            nullable = true;
            continue;
        };
        if sample.len() < TYPE_SAMPLE_SIZE {
            sample.push(value);
        }
        distinct.insert(DistinctKey::of(value));
        if let Some(number) = coerce_number(value) {
            numbers.push(number);
        }
    }

    let column_type = infer_column_type(&sample);
    let statistics = match column_type {
        ColumnType::Numeric => summarize(numbers),
        _ => None,
    };

    (
        ColumnProfile {
            column_type,
            nullable,
            statistics,
        },
        distinct.len(),
    )
}

/// Column names across all rows, in the order they are first seen.
pub fn column_names(rows: &[Row]) -> Vec<String> {
    let mut names: IndexSet<&str> = IndexSet::new();
    for row in rows {
        names.extend(row.keys().map(String::as_str));
    }
    names.into_iter().map(str::to_string).collect()
}

/// Profiles a result set: per-column semantic type, nullability, cardinality
/// and, for numeric columns, summary statistics.
pub fn analyze_structure(rows: &[Row]) -> DataStructureProfile {
    if rows.is_empty() {
        return DataStructureProfile::default();
    }

    let names = column_names(rows);
    tracing::debug!("Profiling {} columns over {} rows", names.len(), rows.len());

    let profiles: Vec<(ColumnProfile, usize)> = names
        .par_iter()
        .map(|name| profile_column(name, rows))
        .collect();

    let mut analysis = DataStructureProfile {
        row_count: rows.len(),
        column_count: names.len(),
        ..Default::default()
    };

    for (name, (profile, unique_count)) in names.into_iter().zip(profiles) {
        match profile.column_type {
            ColumnType::Numeric => analysis.numeric_columns.push(name.clone()),
            ColumnType::Categorical => analysis.categorical_columns.push(name.clone()),
            ColumnType::Datetime => {
                analysis.datetime_columns.push(name.clone());
                analysis.has_time_series = true;
            }
            ColumnType::Text => analysis.text_columns.push(name.clone()),
        }
        analysis.cardinality.insert(name.clone(), unique_count);
        analysis.columns.insert(name, profile);
    }

    analysis
}
