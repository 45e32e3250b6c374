//! Cache instrumentation: per-region statistics, an instrumented region
//! wrapper, and the periodic reporter.

mod instrumented;
mod monitor;
mod reporter;

pub use instrumented::InstrumentedCache;
pub use monitor::{
    CACHE_EVICTION_METRIC, CACHE_HIT_METRIC, CACHE_HIT_RATIO_METRIC, CACHE_MISS_METRIC,
    CACHE_SIZE_METRIC, CacheMonitor, SizeProbe,
};
pub use reporter::PeriodicReporter;
