//! Tabular data converters: CSV ↔ JSON, CSV → HTML table.

use super::text::{escape_html, html_document};
use crate::registry::ConverterReport;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

pub fn csv_to_html(input: &Path, output: &Path) -> ConverterReport {
    let result = read_csv(input).and_then(|rows| {
        let mut body = String::from("<table>\n");
        for (i, row) in rows.iter().enumerate() {
            let cell = if i == 0 { "th" } else { "td" };
            body.push_str("<tr>");
            for field in row {
                body.push_str(&format!("<{cell}>{}</{cell}>", escape_html(field)));
            }
            body.push_str("</tr>\n");
        }
        body.push_str("</table>\n");
        let title = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        write(output, &html_document(&title, &body))?;
        Ok(format!("Rendered {} rows as an HTML table", rows.len().saturating_sub(1)))
    });
    result.into()
}

pub fn csv_to_json(input: &Path, output: &Path) -> ConverterReport {
    let result = read_csv(input).and_then(|rows| {
        let (header, records) = rows
            .split_first()
            .ok_or_else(|| "CSV has no header row".to_string())?;
        let objects: Vec<Value> = records
            .iter()
            .map(|row| {
                let mut obj = Map::new();
                for (i, key) in header.iter().enumerate() {
                    let v = row.get(i).cloned().unwrap_or_default();
                    obj.insert(key.clone(), Value::String(v));
                }
                Value::Object(obj)
            })
            .collect();
        let json = serde_json::to_string_pretty(&objects).map_err(|e| e.to_string())?;
        write(output, &json)?;
        Ok(format!("Wrote {} records", objects.len()))
    });
    result.into()
}

pub fn json_to_csv(input: &Path, output: &Path) -> ConverterReport {
    let result = fs::read_to_string(input)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| format!("invalid JSON: {e}")))
        .and_then(|value| {
            let items = value
                .as_array()
                .ok_or_else(|| "JSON root must be an array of objects".to_string())?;

            // Column order: first appearance across all objects.
            let mut columns: Vec<String> = Vec::new();
            for item in items {
                let obj = item
                    .as_object()
                    .ok_or_else(|| "JSON array items must be objects".to_string())?;
                for key in obj.keys() {
                    if !columns.contains(key) {
                        columns.push(key.clone());
                    }
                }
            }
            if columns.is_empty() {
                return Err("JSON array has no fields to write".to_string());
            }

            let mut csv = csv_line(columns.iter().map(String::as_str));
            for item in items {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| match item.get(c) {
                        None | Some(Value::Null) => String::new(),
                        Some(Value::String(s)) => s.clone(),
                        Some(other) => other.to_string(),
                    })
                    .collect();
                csv.push_str(&csv_line(cells.iter().map(String::as_str)));
            }
            write(output, &csv)?;
            Ok(format!("Wrote {} rows x {} columns", items.len(), columns.len()))
        });
    result.into()
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    parse_csv(text.strip_prefix('\u{FEFF}').unwrap_or(&text))
}

fn write(path: &Path, contents: &str) -> Result<(), String> {
    fs::write(path, contents).map_err(|e| format!("write {}: {e}", path.display()))
}

/// Minimal RFC 4180 reader: quoted fields, doubled quotes, CRLF or LF.
pub(crate) fn parse_csv(text: &str) -> Result<Vec<Vec<String>>, String> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                c => field.push(c),
            }
            continue;
        }
        match ch {
            '"' if field.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            c => field.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}

fn csv_line<'a>(cells: impl Iterator<Item = &'a str>) -> String {
    let mut line = cells
        .map(|c| {
            if c.contains([',', '"', '\n', '\r']) {
                format!("\"{}\"", c.replace('"', "\"\""))
            } else {
                c.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_fields() {
        let rows = parse_csv("name,note\r\n\"Smith, J\",\"said \"\"hi\"\"\"\nplain,x").unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["name".to_string(), "note".to_string()],
                vec!["Smith, J".to_string(), "said \"hi\"".to_string()],
                vec!["plain".to_string(), "x".to_string()],
            ]
        );
    }

    #[test]
    fn unterminated_quote_is_error() {
        assert!(parse_csv("a,\"b\n").is_err());
    }

    #[test]
    fn csv_line_quotes_when_needed() {
        assert_eq!(csv_line(["a", "b,c", "d\"e"].into_iter()), "a,\"b,c\",\"d\"\"e\"\n");
    }

    #[test]
    fn json_round_trips_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("in.json");
        let csv = dir.path().join("out.csv");
        fs::write(&json, r#"[{"city":"Zürich","pop":415000},{"city":"Bern","note":null}]"#).unwrap();

        let report = json_to_csv(&json, &csv);
        assert!(report.success, "{}", report.message);
        let text = fs::read_to_string(&csv).unwrap();
        let rows = parse_csv(&text).unwrap();
        assert_eq!(rows[0], vec!["city", "pop", "note"]);
        assert_eq!(rows[1], vec!["Zürich", "415000", ""]);
    }

    #[test]
    fn json_object_root_is_reported_not_panicked() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("in.json");
        fs::write(&json, r#"{"a":1}"#).unwrap();
        let report = json_to_csv(&json, &dir.path().join("out.csv"));
        assert!(!report.success);
        assert!(report.message.contains("array"));
    }
}
