//! Result export.
//!
//! Renders finalized runs into flat rows with a batch-wide column layout
//! and writes them as CSV.

pub mod blocks;
pub mod layout;
pub mod row;
pub mod table;
pub mod writer;

pub use blocks::{format_tool_execution, process_tool_output, truncate_chars_if_needed, truncate_if_needed};
pub use layout::BatchLayout;
pub use row::{ResultFormatter, ResultRow, RowInput};
pub use table::{format_context_items, markdown_table};
pub use writer::{rows_to_csv, validate_rows, write_rows, write_run_record};
