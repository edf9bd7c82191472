// Output persistence for tables and run reports

pub mod json_files;

pub use json_files::{persist_to_json, read_json_table};
