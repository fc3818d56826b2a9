//! Write-side buffering.
//!
//! [`BatchWriter`] coalesces line protocol into batches on a background task.
//! [`MetaCache`] throttles how often discovery markers are written.

mod batch;
mod meta_cache;

pub use batch::BatchWriter;
pub use meta_cache::MetaCache;
