//! Fetch stage - retrieves raw bytes for a locator.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::cancel::CancellationToken;
use crate::error::{LoadError, LoadResult};
use crate::pipeline::{Fetched, Fetcher, ProgressSink};
use crate::request::Locator;

/// Fetches the bytes behind `locator`.
///
/// The fetch is raced against the token: if the token fires first the
/// stage fails with [`LoadError::Cancelled`] and the fetch future is
/// dropped. Fetcher errors pass through unchanged.
#[instrument(skip_all, fields(locator = %locator))]
pub async fn fetch_stage(
    fetcher: Arc<dyn Fetcher>,
    locator: &Locator,
    token: CancellationToken,
    progress: ProgressSink,
) -> LoadResult<Fetched> {
    let fetch = fetcher.fetch(locator, token.clone(), progress);

    let fetched = tokio::select! {
        biased;

        _ = token.cancelled() => {
            debug!("Fetch cancelled");
            return Err(LoadError::Cancelled);
        }

        result = fetch => result?,
    };

    debug!(bytes = fetched.data.len(), "Fetch stage complete");
    Ok(fetched)
}
