//! Individual pipeline stages.
//!
//! Each stage is a free function so that it can be tested on its own and
//! composed by [`Loader`](crate::pipeline::Loader).

mod cache;
mod decode;
mod fetch;

pub use cache::{cache_stage, check_memory_cache};
pub use decode::{decode_stage, transform_stage};
pub use fetch::fetch_stage;
