//! Tabular I/O for sample and metrics records.

pub mod csv_io;

pub use csv_io::{read_sample_record, write_metrics};
