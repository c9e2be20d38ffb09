pub mod finalized_cache;

pub use finalized_cache::FinalizedOrderCache;
