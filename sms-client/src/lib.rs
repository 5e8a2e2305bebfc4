pub mod api;
pub mod domain;

pub use api::{ApiClient, ApiError, ReadingsQuery};
pub use domain::{Device, Reading, SectionStat};
