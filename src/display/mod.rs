//! Terminal output for the CLI: tables, a spinner and a color theme.

pub mod progress;
pub mod tables;
pub mod theme;

pub use progress::create_spinner;
pub use tables::{
    TableBuilder, create_failures_table, create_results_table, create_status_table,
    create_summary_table,
};
pub use theme::{THEME, Theme};
