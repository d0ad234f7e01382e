use crate::models::SchemaInfo;

const SAMPLE_ROWS: usize = 3;

/// Renders the dataset schema as the compact text block handed to the planner model.
///
/// Tables and columns keep their declared order so the same schema always
/// produces the same context.
pub fn render_schema_context(schema: &SchemaInfo) -> String {
    let mut parts: Vec<String> = Vec::new();

    for table in &schema.tables {
        parts.push(format!("\nTable: {}", table.name));
        parts.push("Columns:".to_string());

        for column in &table.columns {
            let nullable = if column.nullable { "NULL" } else { "NOT NULL" };
            parts.push(format!(
                "  - {} ({}) {}",
                column.name,
                column.column_type.as_str(),
                nullable
            ));
        }

        if !table.sample_rows.is_empty() {
            parts.push(format!("\nSample data (first {} rows):", SAMPLE_ROWS));
            for (i, row) in table.sample_rows.iter().take(SAMPLE_ROWS).enumerate() {
                let rendered = serde_json::to_string(row).unwrap_or_default();
                parts.push(format!("  Row {}: {}", i + 1, rendered));
            }
        }
    }

    parts.join("\n")
}
