use futures::{pin_mut, Stream, StreamExt};
use sms_client::domain::Reading;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{PipelineError, ReadingPages, TimeWindow};
use crate::transform::ReadingFilter;

/// Result of walking every page for one device and window.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Accepted readings, ascending by timestamp.
    pub readings: Vec<Reading>,
    /// Pages successfully fetched.
    pub pages: u32,
    /// Set when a page failed or the fetch was cancelled; `readings` then
    /// holds whatever arrived before.
    pub error: Option<PipelineError>,
}

impl FetchOutcome {
    pub fn truncated(&self) -> bool {
        self.error.is_some()
    }
}

/// Stream of raw pages for `device_id`, 1-based, stopping after the first
/// page shorter than `page_size` (an empty page included).
pub fn reading_pages<'a>(
    source: &'a dyn ReadingPages,
    device_id: i64,
    window: TimeWindow,
    page_size: u32,
    cancel: &'a CancellationToken,
) -> impl Stream<Item = Result<Vec<Reading>, PipelineError>> + Send + 'a {
    let page_size = page_size.max(1);

    async_stream::try_stream! {
        let mut page: u32 = 1;
        loop {
            if cancel.is_cancelled() {
                Err(PipelineError::Cancelled)?;
            }

            let batch = source.page(device_id, window, page, page_size).await?;
            let len = batch.len();
            if len > 0 {
                yield batch;
            }

            if len < page_size as usize {
                break;
            }
            page += 1;
        }
    }
}

/// Fetch every reading of `device_id` inside `window`.
///
/// Never fails: a page error or cancellation ends the walk and the readings
/// gathered so far are returned with `error` set.
pub async fn fetch_all_readings(
    source: &dyn ReadingPages,
    device_id: i64,
    window: TimeWindow,
    page_size: u32,
    cancel: &CancellationToken,
) -> FetchOutcome {
    let pages = reading_pages(source, device_id, window, page_size, cancel);
    pin_mut!(pages);

    let mut filter = ReadingFilter::new(device_id);
    let mut outcome = FetchOutcome {
        readings: Vec::new(),
        pages: 0,
        error: None,
    };

    while let Some(item) = pages.next().await {
        match item {
            Ok(batch) => {
                outcome.pages += 1;
                metrics::counter!("report_pages_fetched_total").increment(1);
                outcome
                    .readings
                    .extend(batch.into_iter().filter(|r| filter.accept(r)));
            }
            Err(e) => {
                tracing::warn!(
                    device_id,
                    pages = outcome.pages,
                    readings = outcome.readings.len(),
                    error = %e,
                    "reading fetch stopped early, keeping partial results"
                );
                metrics::counter!("report_page_errors_total").increment(1);
                outcome.error = Some(e);
                break;
            }
        }
    }

    outcome.readings.sort_by_key(|r| r.timestamp);

    tracing::debug!(
        device_id,
        pages = outcome.pages,
        readings = outcome.readings.len(),
        duplicates = filter.duplicates(),
        rejected = filter.rejected(),
        "reading fetch finished"
    );

    outcome
}
