//! Auth backend implementations

mod memory;
mod traits;

pub use memory::{CallCounts, MemoryBackend};
pub use traits::AuthBackend;

#[cfg(feature = "http-backend")]
mod http;

#[cfg(feature = "http-backend")]
pub use http::HttpBackend;
