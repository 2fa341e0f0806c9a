//! Discovery and lookup of shared libraries by soname

mod cache;

pub use cache::osabi_compatible;
pub use cache::CacheBuilder;
pub use cache::CacheEntry;
pub use cache::SonameCache;
