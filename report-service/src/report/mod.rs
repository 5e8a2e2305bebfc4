pub mod generator;
pub mod region;
pub mod sheet;

pub use generator::{
    DailyReportOutcome, FailedDevice, RegionReportOutcome, ReportGenerator, ReportSettings,
};
pub use region::{
    build_region_report, normalize_region, DeviceReportRow, GrandTotal, RegionReport,
    RegionSubtotal, ReportRow, VolumePair, UNKNOWN_REGION,
};
pub use sheet::{RowStyle, Sheet, SheetRow};
