//! Table formatting for command output.

use comfy_table::{
    Attribute, Cell, CellAlignment, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::embedding::{CorpusReport, DocumentFailure};
use crate::related::IndexStatus;
use crate::types::SearchResult;

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Ranked related-content results.
pub fn create_results_table(results: &[SearchResult]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
        Cell::new("Document").add_attribute(Attribute::Bold),
        Cell::new("Block").add_attribute(Attribute::Bold),
        Cell::new("Preview").add_attribute(Attribute::Bold),
    ]);

    for (rank, result) in results.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1).set_alignment(CellAlignment::Right),
            Cell::new(result.score.to_string()).set_alignment(CellAlignment::Right),
            Cell::new(&result.metadata.document_path),
            Cell::new(&result.metadata.key),
            Cell::new(preview(&result.metadata.text, 60)),
        ]);
    }

    table.to_string()
}

/// Summary of a reindex run.
pub fn create_summary_table(report: &CorpusReport, elapsed: std::time::Duration) -> String {
    TableBuilder::new()
        .set_headers(vec!["Metric", "Value"])
        .add_row(vec![
            "Documents".to_string(),
            format!("{}/{}", report.documents_embedded, report.documents_total),
        ])
        .add_row(vec![
            "Blocks embedded".to_string(),
            report.blocks_embedded.to_string(),
        ])
        .add_row(vec![
            "Empty blocks".to_string(),
            report.blocks_skipped_empty.to_string(),
        ])
        .add_row(vec![
            "New vectors".to_string(),
            report.vectors_inserted.to_string(),
        ])
        .add_row(vec![
            "Already indexed".to_string(),
            report.vectors_already_present.to_string(),
        ])
        .add_row(vec!["Tokens".to_string(), report.token_count.to_string()])
        .add_row(vec!["Index size".to_string(), report.store_count.to_string()])
        .add_row(vec!["Elapsed".to_string(), format!("{elapsed:.2?}")])
        .build()
}

pub fn create_failures_table(failures: &[DocumentFailure]) -> String {
    failures
        .iter()
        .fold(
            TableBuilder::new().set_headers(vec!["Document", "Reason"]),
            |table, failure| table.add_row(vec![failure.path.clone(), failure.reason.clone()]),
        )
        .build()
}

pub fn create_status_table(status: &IndexStatus) -> String {
    let timestamp = |value: Option<u64>| {
        value
            .and_then(|secs| chrono::DateTime::from_timestamp(secs as i64, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    TableBuilder::new()
        .set_headers(vec!["Property", "Value"])
        .add_row(vec!["Store".to_string(), status.store_name.clone()])
        .add_row(vec![
            "Location".to_string(),
            status.index_path.display().to_string(),
        ])
        .add_row(vec!["Model".to_string(), status.model.clone()])
        .add_row(vec!["Dimension".to_string(), status.dimension.to_string()])
        .add_row(vec![
            "Vectors".to_string(),
            format!("{}/{}", status.count, status.capacity),
        ])
        .add_row(vec!["Documents".to_string(), status.documents.to_string()])
        .add_row(vec!["Blocks".to_string(), status.blocks.to_string()])
        .add_row(vec!["Created".to_string(), timestamp(status.created_at)])
        .add_row(vec!["Updated".to_string(), timestamp(status.updated_at)])
        .build()
}

/// First line of `text`, cut to `max_chars` characters.
fn preview(text: &str, max_chars: usize) -> String {
    let first_line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    if first_line.chars().count() <= max_chars {
        return first_line.to_string();
    }
    let cut: String = first_line.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{cut}…")
}
