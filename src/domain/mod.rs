pub mod audio;
pub mod eviction;
pub mod prefetch;
