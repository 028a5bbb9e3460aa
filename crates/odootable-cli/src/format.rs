//! Output formatting for resolved blocks

use colored::*;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use odootable_common::{OdooTableError, Result};
use odootable_core::{Resolution, ResolvedTable};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Handles formatting of block results.
pub struct Formatter {
    /// Maximum column width before truncation
    max_col_width: usize,
}

impl Formatter {
    pub fn new() -> Self {
        Self { max_col_width: 50 }
    }

    /// Print every block result in input order.
    pub fn print_results(&self, results: &[Result<Resolution>], format: OutputFormat) -> anyhow::Result<()> {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&self.to_json(results))?),
            OutputFormat::Table => {
                for (index, result) in results.iter().enumerate() {
                    println!("{}", format!("# block {}", index + 1).dimmed());
                    match result {
                        Ok(Resolution::Table(table)) => println!("{}", self.render_table(table)),
                        Ok(Resolution::Empty) => println!("{}", "(no records)".dimmed()),
                        Err(err) => eprintln!("{}", self.render_error(err)),
                    }
                    println!();
                }
            }
        }
        Ok(())
    }

    /// Render a table with box-drawing characters, caption first.
    pub fn render_table(&self, resolved: &ResolvedTable) -> String {
        let mut matrix = resolved.matrix.clone();
        matrix.regularize();

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(matrix.header.iter().map(|label| {
                Cell::new(self.truncate(label))
                    .fg(Color::Cyan)
                    .add_attribute(Attribute::Bold)
            }));
        for row in &matrix.rows {
            table.add_row(row.iter().map(|cell| Cell::new(self.truncate(cell))));
        }

        let count = matrix.rows.len();
        let plural = if count == 1 { "" } else { "s" };
        let footer = format!("{count} row{plural}");

        match resolved.presentation.get("caption").and_then(|c| c.as_str()) {
            Some(caption) => format!("{}\n{table}\n{footer}", caption.bold()),
            None => format!("{table}\n{footer}"),
        }
    }

    pub fn render_error(&self, err: &OdooTableError) -> String {
        format!("{} {}: {err}", "error".red().bold(), err.kind().yellow())
    }

    pub fn to_json(&self, results: &[Result<Resolution>]) -> serde_json::Value {
        results
            .iter()
            .enumerate()
            .map(|(index, result)| match result {
                Ok(Resolution::Table(table)) => json!({
                    "block": index + 1,
                    "status": "table",
                    "header": table.matrix.header,
                    "rows": table.matrix.rows,
                    "presentation": table.presentation,
                }),
                Ok(Resolution::Empty) => json!({"block": index + 1, "status": "empty"}),
                Err(err) => json!({
                    "block": index + 1,
                    "status": "error",
                    "error": error_json(err),
                }),
            })
            .collect()
    }

    fn truncate(&self, s: &str) -> String {
        let max_len = self.max_col_width;
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let mut result: String = s.chars().take(max_len - 1).collect();
            result.push('…');
            result
        }
    }
}

fn error_json(err: &OdooTableError) -> serde_json::Value {
    let mut error = json!({"kind": err.kind(), "message": err.message()});
    match err {
        OdooTableError::Config { field, .. } => error["field"] = json!(field),
        OdooTableError::Remote { code, .. } => error["code"] = json!(code),
        _ => {}
    }
    error
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new()
    }
}
