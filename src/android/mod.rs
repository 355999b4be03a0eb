//! Android compiled resource containers: chunk traversal, string pools, APK access.

pub mod apk;
pub mod chunk;
pub mod source;
pub mod string_pool;
pub mod walker;
