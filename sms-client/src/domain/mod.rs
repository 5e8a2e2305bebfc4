pub mod device;
pub mod reading;
pub mod timestamp;

pub use device::{Device, SectionStat};
pub use reading::Reading;
pub use timestamp::parse_timestamp;
