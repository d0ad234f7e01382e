pub mod analyzer;
pub mod types;
pub mod utils;

pub use analyzer::{analyze_structure, column_names, infer_column_type};
pub use types::{ColumnProfile, ColumnStatistics, ColumnType, DataStructureProfile};
