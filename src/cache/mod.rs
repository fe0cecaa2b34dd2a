// Result cache module
// Author: kelexine (https://github.com/kelexine)

pub mod manager;
pub mod models;

pub use manager::ResultCache;
pub use models::{CacheEntry, CacheKey, CacheStats};
