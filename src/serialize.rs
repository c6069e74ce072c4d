//! Row serialization.
//!
//! Every table row becomes one [`Document`]: `"column: value"` lines joined
//! by newlines, in column order, tagged with the source label and the row's
//! zero-based position.

use crate::models::{Document, DocumentMetadata, Table};

pub fn rows_to_documents(table: &Table, source: &str) -> Vec<Document> {
    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| Document {
            content: render_row(&table.columns, row),
            metadata: DocumentMetadata {
                source: source.to_string(),
                row: Some(i as i64),
            },
        })
        .collect()
}

fn render_row(columns: &[String], row: &[String]) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = row.get(i).map(String::as_str).unwrap_or("");
            format!("{}: {}", column, value)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_one_document_per_row_in_order() {
        let t = table(
            &["Customer", "ARR", "Region", "ChurnRisk"],
            &[
                &["Acme", "120000", "West", "Low"],
                &["Globex", "45000", "East", "High"],
            ],
        );
        let docs = rows_to_documents(&t, "demo.csv");
        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[0].content,
            "Customer: Acme\nARR: 120000\nRegion: West\nChurnRisk: Low"
        );
        assert_eq!(docs[1].metadata.row, Some(1));
        assert_eq!(docs[1].metadata.source, "demo.csv");
        assert!(docs[1].content.contains("ChurnRisk: High"));
    }

    #[test]
    fn test_every_column_rendered_once_per_document() {
        let cols = ["a", "b", "c", "d", "e"];
        let rows: Vec<Vec<String>> = (0..7)
            .map(|r| cols.iter().map(|c| format!("{}{}", c, r)).collect())
            .collect();
        let t = Table {
            columns: cols.iter().map(|c| c.to_string()).collect(),
            rows,
        };
        let docs = rows_to_documents(&t, "x.csv");
        assert_eq!(docs.len(), 7);
        for (i, doc) in docs.iter().enumerate() {
            assert_eq!(doc.row_id(), i as i64);
            let lines: Vec<&str> = doc.content.lines().collect();
            assert_eq!(lines.len(), cols.len());
            for (line, col) in lines.iter().zip(cols.iter()) {
                assert_eq!(*line, format!("{}: {}{}", col, col, i));
            }
        }
    }

    #[test]
    fn test_missing_values_render_empty() {
        let t = Table {
            columns: vec!["a".into(), "b".into()],
            rows: vec![vec!["1".into()]],
        };
        let docs = rows_to_documents(&t, "x.csv");
        assert_eq!(docs[0].content, "a: 1\nb: ");
    }

    #[test]
    fn test_empty_table_yields_no_documents() {
        let t = table(&["a"], &[]);
        assert!(rows_to_documents(&t, "x.csv").is_empty());
    }
}
