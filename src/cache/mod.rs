pub mod manager;
pub mod metadata;
pub mod path;

pub use manager::{CacheKey, ObjectCache};
pub use metadata::{CacheRecord, CacheStats};
