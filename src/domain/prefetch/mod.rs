pub mod service;

pub use service::{PrefetchService, PrefetchServiceApi, PRIORITY_ON_DEMAND, PRIORITY_PREFETCH};
