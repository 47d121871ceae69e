//! Results and scores reports.
//!
//! `results.txt` holds one line per executable with every parameter's
//! outcome; `scores.txt` holds the fraction of correct outcomes. Rows are
//! ordered by the number after the last `_` in the executable name, so
//! `sol_2` comes before `sol_10`.

use std::path::Path;

use crate::domain::{ResultRow, ResultTable};
use crate::error::Result;
use crate::exec::staging::io_context;

/// Numeric suffix after the last `_`; names without one sort as 0.
fn suffix_number(name: &str) -> i64 {
    name.rsplit_once('_')
        .map(|(_, tail)| {
            let digits: String = tail
                .chars()
                .enumerate()
                .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && *c == '-'))
                .map(|(_, c)| c)
                .collect();
            digits.parse().unwrap_or(0)
        })
        .unwrap_or(0)
}

fn ordered_rows(table: &ResultTable) -> Vec<(String, &ResultRow)> {
    let mut rows: Vec<_> = table.rows().iter().map(|row| (row.name(), row)).collect();
    rows.sort_by(|(a, _), (b, _)| suffix_number(a).cmp(&suffix_number(b)).then_with(|| a.cmp(b)));
    rows
}

fn name_width(rows: &[(String, &ResultRow)]) -> usize {
    rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0)
}

pub fn format_results(table: &ResultTable) -> String {
    let rows = ordered_rows(table);
    let width = name_width(&rows);

    let mut out = String::new();
    for (name, row) in &rows {
        out.push_str(&format!("{:<width$}:", name));
        for (param, outcome) in table.params().iter().zip(&row.outcomes) {
            let label = outcome.map_or("missing", |o| o.label());
            out.push_str(&format!("{:>5} ({:>9}) ", param, label));
        }
        out.push('\n');
    }
    out
}

pub fn format_scores(table: &ResultTable) -> String {
    let rows = ordered_rows(table);
    let width = name_width(&rows);

    rows.iter()
        .map(|(name, row)| format!("{:<width$}: {:5.3}\n", name, row.score()))
        .collect()
}

pub fn write_results(table: &ResultTable, path: &Path) -> Result<()> {
    std::fs::write(path, format_results(table)).map_err(|e| io_context("write", path, e))
}

pub fn write_scores(table: &ResultTable, path: &Path) -> Result<()> {
    std::fs::write(path, format_scores(table)).map_err(|e| io_context("write", path, e))
}
