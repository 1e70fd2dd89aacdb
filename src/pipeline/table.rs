//! Output Materialization
//!
//! Parses the integration step's tab-separated text into rows and maps
//! them into hypothesis records. Column names are matched by exact
//! string against the header row the integration prompt mandates;
//! unknown columns are preserved in `full_data` untouched.

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::types::{Hypothesis, Run};

/// Column names the integration prompt is contracted to emit.
pub mod columns {
    pub const TITLE: &str = "title";
    pub const INDUSTRY: &str = "industry";
    pub const FIELD: &str = "field";
    pub const SUMMARY: &str = "summary";
    pub const CUSTOMER_PROBLEM: &str = "customer problem";
    pub const SCIENTIFIC_SCORE: &str = "scientific score";
    pub const STRATEGIC_LEVEL: &str = "strategic level";
    pub const CATCH_UP_SCORE: &str = "catch-up score";
    pub const TOTAL_SCORE: &str = "total score";
}

/// A parsed tab-separated table. Column order is preserved so the text
/// form can be regenerated losslessly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    /// Each row has exactly `headers.len()` cells; short source lines
    /// are padded with empty strings.
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Look up a cell by header name in a row.
    pub fn cell<'a>(&self, row: &'a [String], header: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .position(|h| h == header)
            .and_then(|i| row.get(i))
            .map(String::as_str)
    }
}

/// Parse tab-separated text: first non-empty line is the header, each
/// later non-empty line is one row. Short rows are padded; surplus
/// cells beyond the header width are dropped.
pub fn parse_delimited_table(text: &str) -> Table {
    let mut lines = text.lines().map(str::trim_end).filter(|l| !l.is_empty());

    let headers: Vec<String> = match lines.next() {
        Some(line) => line.split('\t').map(|h| h.trim().to_string()).collect(),
        None => return Table { headers: Vec::new(), rows: Vec::new() },
    };

    let width = headers.len();
    let rows = lines
        .map(|line| {
            let mut cells: Vec<String> =
                line.split('\t').take(width).map(str::to_string).collect();
            cells.resize(width, String::new());
            cells
        })
        .collect();

    Table { headers, rows }
}

/// Regenerate the tab-separated text form of a table.
pub fn rows_to_text(table: &Table) -> String {
    let mut out = table.headers.join("\t");
    for row in &table.rows {
        out.push('\n');
        out.push_str(&row.join("\t"));
    }
    out
}

/// Map table rows into hypothesis records for a run, numbering them
/// contiguously from `start_number`.
pub fn rows_to_hypotheses(table: &Table, run: &Run, start_number: i64) -> Vec<Hypothesis> {
    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let get = |header: &str| {
                table
                    .cell(row, header)
                    .filter(|v| !v.trim().is_empty())
                    .map(str::to_string)
            };

            let mut full_data = Map::new();
            for (header, cell) in table.headers.iter().zip(row) {
                full_data.insert(header.clone(), Value::String(cell.clone()));
            }

            Hypothesis {
                id: Uuid::new_v4().to_string(),
                project_id: run.project_id.clone(),
                run_id: run.id.clone(),
                target_spec_id: run.target_spec_id.clone(),
                technical_assets_id: run.technical_assets_id.clone(),
                number: start_number + i as i64,
                title: get(columns::TITLE),
                industry: get(columns::INDUSTRY),
                field: get(columns::FIELD),
                summary: get(columns::SUMMARY),
                customer_problem: get(columns::CUSTOMER_PROBLEM),
                scientific_score: get(columns::SCIENTIFIC_SCORE),
                strategic_level: get(columns::STRATEGIC_LEVEL),
                catch_up_score: get(columns::CATCH_UP_SCORE),
                total_score: get(columns::TOTAL_SCORE),
                full_data,
                created_at: Utc::now(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewRun;
    use proptest::prelude::*;

    fn sample_run() -> Run {
        NewRun {
            project_id: "proj-1".into(),
            target_spec_id: "spec-1".into(),
            technical_assets_id: "assets-1".into(),
            hypothesis_count: 5,
            loop_count: 1,
            job_name: None,
            existing_filter: None,
        }
        .into_run()
    }

    #[test]
    fn test_parse_basic_table() {
        let text = "title\tindustry\tfield\nBattery licensing\tEnergy\tStorage\n";
        let table = parse_delimited_table(text);
        assert_eq!(table.headers, vec!["title", "industry", "field"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.cell(&table.rows[0], "industry"), Some("Energy"));
    }

    #[test]
    fn test_short_rows_padded() {
        let text = "title\tindustry\tfield\nOnly title";
        let table = parse_delimited_table(text);
        assert_eq!(table.rows[0], vec!["Only title", "", ""]);
    }

    #[test]
    fn test_surplus_cells_dropped() {
        let text = "a\tb\n1\t2\t3";
        let table = parse_delimited_table(text);
        assert_eq!(table.rows[0], vec!["1", "2"]);
    }

    #[test]
    fn test_empty_text_is_empty_table() {
        let table = parse_delimited_table("");
        assert!(table.headers.is_empty());
        assert!(table.rows.is_empty());
    }

    #[test]
    fn test_rows_to_hypotheses_maps_known_columns() {
        let text = "title\tindustry\tsummary\tscientific score\ttotal score\textra\n\
                    Solid-state licensing\tEnergy\tLicense the stack\t4\t8.5\tnote\n\
                    Grid storage\t\tUtility-scale cells\t3\t7\t";
        let table = parse_delimited_table(text);
        let run = sample_run();
        let hypotheses = rows_to_hypotheses(&table, &run, 11);

        assert_eq!(hypotheses.len(), 2);
        let first = &hypotheses[0];
        assert_eq!(first.number, 11);
        assert_eq!(first.title.as_deref(), Some("Solid-state licensing"));
        assert_eq!(first.scientific_score.as_deref(), Some("4"));
        assert_eq!(first.total_score.as_deref(), Some("8.5"));
        // Unknown column preserved in full_data only
        assert_eq!(first.full_data["extra"], "note");

        let second = &hypotheses[1];
        assert_eq!(second.number, 12);
        assert_eq!(second.industry, None);
        assert_eq!(second.total_score, None);
        assert_eq!(second.full_data["industry"], "");
    }

    #[test]
    fn test_round_trip_with_empty_cells_and_short_trailing_row() {
        let text = "title\tindustry\tfield\nA\t\tx\nB";
        let table = parse_delimited_table(text);
        let reparsed = parse_delimited_table(&rows_to_text(&table));
        assert_eq!(reparsed, table);
    }

    // Cells and headers never contain tabs or newlines per the
    // integration prompt contract
    fn cell_strategy() -> impl Strategy<Value = String> {
        "[^\t\n\r]{0,12}".prop_map(|s| s.trim_end().to_string())
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            headers in prop::collection::vec("[a-z]{1,8}( [a-z]{1,8})?", 1..6),
            cells in prop::collection::vec(cell_strategy(), 0..30),
        ) {
            let width = headers.len();
            let rows: Vec<Vec<String>> = cells
                .chunks(width)
                .map(|chunk| {
                    let mut row: Vec<String> = chunk.to_vec();
                    row.resize(width, String::new());
                    row
                })
                .collect();
            // A row of all-empty cells serializes to an empty line,
            // which the parser skips; the contract only covers rows
            // with content
            let rows: Vec<Vec<String>> = rows
                .into_iter()
                .filter(|r| r.iter().any(|c| !c.is_empty()))
                .collect();

            let table = Table { headers, rows };
            let reparsed = parse_delimited_table(&rows_to_text(&table));
            prop_assert_eq!(reparsed, table);
        }
    }
}
