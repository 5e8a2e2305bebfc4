pub mod csv_sheet;

pub use csv_sheet::{encode_csv, write_csv, CsvSheetSink};
