//! Table merge: records + field list + optional override header -> matrix.

use odootable_client::RecordSet;
use odootable_common::{OdooTableError, Result};
use serde::Serialize;

use crate::config::QueryRequest;

/// The resolved table, ready for a renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableMatrix {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableMatrix {
    /// Width of the widest row, header included.
    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.header.len()))
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pad the header and every row with empty cells up to [`column_count`].
    ///
    /// [`column_count`]: TableMatrix::column_count
    pub fn regularize(&mut self) {
        let width = self.column_count();
        self.header.resize(width, String::new());
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
    }
}

/// Pick the header from the author's override rows, if any.
///
/// Zero rows, or a single empty row, means no override.
pub fn override_header(rows: &[Vec<String>]) -> Result<Option<&[String]>> {
    match rows {
        [] => Ok(None),
        [row] if row.is_empty() => Ok(None),
        [row] => Ok(Some(row)),
        _ => Err(OdooTableError::TooManyHeaderRows(rows.len())),
    }
}

/// Build the table for `request` from the records the server returned.
///
/// Cells follow the order of `request.fields`; a field the record lacks
/// gives an empty cell. The override header is used verbatim, so its width
/// may differ from the rows'.
pub fn merge(request: &QueryRequest, records: &RecordSet, override_rows: &[Vec<String>]) -> Result<TableMatrix> {
    let header = match override_header(override_rows)? {
        Some(row) => row.to_vec(),
        None => request.fields.clone(),
    };

    let rows = records
        .iter()
        .map(|record| {
            request
                .fields
                .iter()
                .map(|field| record.get(field).map(|v| v.to_cell_text()).unwrap_or_default())
                .collect()
        })
        .collect();

    Ok(TableMatrix { header, rows })
}

/// Read the block's text content as CSV rows.
///
/// Fields are comma separated; a double-quoted field may contain commas,
/// newlines and `""` for a literal quote. Blank lines are skipped, so blank
/// content yields no rows.
pub fn parse_header_content(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => quoted = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => quoted = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => finish_row(&mut rows, &mut row, &mut field),
            _ => field.push(c),
        }
    }
    finish_row(&mut rows, &mut row, &mut field);

    rows
}

fn finish_row(rows: &mut Vec<Vec<String>>, row: &mut Vec<String>, field: &mut String) {
    row.push(std::mem::take(field));
    let row = std::mem::take(row);
    let blank = row.len() == 1 && row[0].trim().is_empty();
    if !blank {
        rows.push(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validate;
    use odootable_client::Record;
    use odootable_common::Value;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request(fields: &[&str]) -> QueryRequest {
        let raw = json!({
            "url": "erp.example.com",
            "model": "res.partner",
            "fields": fields,
            "login": "admin",
            "password": "secret"
        });
        match raw {
            serde_json::Value::Object(map) => validate(&map).unwrap(),
            _ => unreachable!(),
        }
    }

    fn partners() -> RecordSet {
        RecordSet::new(vec![
            Record::from_iter([("name", Value::from("Azure Interior")), ("email", Value::from("azure@example.com"))]),
            Record::from_iter([("name", Value::from("Deco Addict")), ("email", Value::Bool(false))]),
            Record::from_iter([("name", Value::from("Gemini Furniture"))]),
        ])
    }

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_merge_uses_fields_as_header() {
        let matrix = merge(&request(&["name", "email"]), &partners(), &[]).unwrap();

        assert_eq!(matrix.header, strings(&["name", "email"]));
        assert_eq!(
            matrix.rows,
            vec![
                strings(&["Azure Interior", "azure@example.com"]),
                strings(&["Deco Addict", ""]),
                strings(&["Gemini Furniture", ""]),
            ]
        );
    }

    #[test]
    fn test_override_header_emitted_verbatim() {
        let rows = vec![strings(&["Customer", "E-mail", "Notes"])];
        let matrix = merge(&request(&["name", "email"]), &partners(), &rows).unwrap();

        assert_eq!(matrix.header, strings(&["Customer", "E-mail", "Notes"]));
        assert!(matrix.rows.iter().all(|row| row.len() == 2));
    }

    #[test]
    fn test_cells_follow_field_order() {
        let matrix = merge(&request(&["email", "name"]), &partners(), &[]).unwrap();
        assert_eq!(matrix.rows[0], strings(&["azure@example.com", "Azure Interior"]));
    }

    #[test]
    fn test_second_header_row_rejected() {
        let rows = vec![strings(&["a"]), strings(&["b"])];
        let err = merge(&request(&["name"]), &partners(), &rows).unwrap_err();
        assert_eq!(err, OdooTableError::TooManyHeaderRows(2));
    }

    #[test]
    fn test_empty_override_row_falls_back_to_fields() {
        let matrix = merge(&request(&["name"]), &RecordSet::default(), &[Vec::new()]).unwrap();
        assert_eq!(matrix.header, strings(&["name"]));
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_many2one_and_numbers_rendered() {
        let records = RecordSet::new(vec![Record::from_iter([
            ("partner_id", Value::from(vec![Value::Int(7), Value::from("Deco Addict")])),
            ("amount_total", Value::Float(1250.5)),
            ("is_company", Value::Bool(true)),
        ])]);

        let matrix = merge(&request(&["partner_id", "amount_total", "is_company"]), &records, &[]).unwrap();
        assert_eq!(matrix.rows[0], strings(&["Deco Addict", "1250.5", "True"]));
    }

    #[test]
    fn test_regularize_pads_to_widest() {
        let mut matrix = TableMatrix {
            header: strings(&["A", "B", "C"]),
            rows: vec![strings(&["1"]), strings(&["1", "2"])],
        };
        matrix.regularize();

        assert_eq!(matrix.column_count(), 3);
        assert_eq!(matrix.rows, vec![strings(&["1", "", ""]), strings(&["1", "2", ""])]);
    }

    #[test]
    fn test_parse_header_content() {
        assert_eq!(parse_header_content(""), Vec::<Vec<String>>::new());
        assert_eq!(parse_header_content("  \n\n"), Vec::<Vec<String>>::new());
        assert_eq!(
            parse_header_content("Name,\"E-mail, work\",\"Say \"\"hi\"\"\"\n"),
            vec![strings(&["Name", "E-mail, work", "Say \"hi\""])]
        );
        assert_eq!(parse_header_content("a,b\r\nc,d").len(), 2);
        assert_eq!(
            parse_header_content("\"multi\nline\",x"),
            vec![strings(&["multi\nline", "x"])]
        );
    }
}
