pub mod daily;
pub mod period;

pub use daily::{aggregate_daily, summarize_days, DailyPolicy, DailySummary, PeriodSummary};
pub use period::{
    compute_period_volume, format_volume, mcf_to_mmcf, PeriodVolume, VolumePolicy, VolumeUnit,
};
