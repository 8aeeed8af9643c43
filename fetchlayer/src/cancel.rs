//! Cancellation tokens observed at stage boundaries.
//!
//! Tokens are `tokio_util`'s [`CancellationToken`]: cancelling is idempotent
//! and irreversible, and child tokens follow their parent. Work that is
//! already running is never interrupted; stages call [`checkpoint`] before
//! they start so a cancelled load stops at the next boundary.

use crate::error::{LoadError, LoadResult};

pub use tokio_util::sync::CancellationToken;

/// Fails with [`LoadError::Cancelled`] if the token has been cancelled.
pub fn checkpoint(token: &CancellationToken) -> LoadResult<()> {
    if token.is_cancelled() {
        Err(LoadError::Cancelled)
    } else {
        Ok(())
    }
}
