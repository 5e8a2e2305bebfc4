pub mod client;
pub mod error;
mod wire;

pub use client::{ApiClient, ReadingsQuery};
pub use error::ApiError;
