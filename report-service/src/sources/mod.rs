pub mod http_readings;
pub mod paginated;
pub mod readings_csv_file;

pub use http_readings::HttpReadingSource;
pub use paginated::{fetch_all_readings, reading_pages, FetchOutcome};
pub use readings_csv_file::ReadingsCsvFileSource;
