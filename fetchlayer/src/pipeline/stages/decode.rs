//! Decode and transform stages.
//!
//! Both run on a [`Scheduler`] chosen per stage, so an expensive or
//! non-reentrant decoder can sit behind a serial scheduler while transforms
//! run in parallel.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::error::{LoadError, LoadResult};
use crate::pipeline::{Decoder, Transform};
use crate::scheduler::{schedule, Scheduler};
use crate::value::{Metadata, Value};

/// Decodes fetched bytes on `scheduler`.
///
/// Fails with [`LoadError::DecodingFailed`] if the decoder returns `None`
/// or panics.
pub async fn decode_stage(
    scheduler: &dyn Scheduler,
    token: &CancellationToken,
    decoder: Arc<dyn Decoder>,
    data: Bytes,
    metadata: Metadata,
) -> LoadResult<Value> {
    let size = data.len();
    let value = schedule(scheduler, token, move || {
        panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(&data, &metadata)))
            .unwrap_or_else(|_| {
                warn!("Decoder panicked");
                None
            })
            .ok_or(LoadError::DecodingFailed)
    })
    .await;

    match &value {
        Ok(value) => debug!(bytes = size, cost = value.cost(), "Decode stage complete"),
        Err(LoadError::DecodingFailed) => warn!(bytes = size, "Decoder rejected data"),
        Err(_) => {}
    }
    value
}

/// Applies `transform` on `scheduler`, or returns `value` unchanged when
/// there is no transform.
///
/// Fails with [`LoadError::TransformFailed`] if the transform returns `None`
/// or panics.
pub async fn transform_stage(
    scheduler: &dyn Scheduler,
    token: &CancellationToken,
    transform: Option<Arc<dyn Transform>>,
    value: Value,
) -> LoadResult<Value> {
    let Some(transform) = transform else {
        return Ok(value);
    };

    let identifier = transform.identifier().to_string();
    let result = schedule(scheduler, token, move || {
        panic::catch_unwind(AssertUnwindSafe(|| transform.transform(value)))
            .unwrap_or_else(|_| {
                warn!("Transform panicked");
                None
            })
            .ok_or(LoadError::TransformFailed)
    })
    .await;

    match &result {
        Ok(_) => debug!(transform = %identifier, "Transform stage complete"),
        Err(LoadError::TransformFailed) => warn!(transform = %identifier, "Transform failed"),
        Err(_) => {}
    }
    result
}
