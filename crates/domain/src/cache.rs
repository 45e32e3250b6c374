//! Cache lookup classification and per-region statistics.

use serde::{Deserialize, Serialize};

/// Size reported when a region cannot estimate its size.
pub const UNKNOWN_SIZE: i64 = -1;

/// Classification of one cache read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheLookup {
    /// Present and unexpired.
    Hit,
    /// Absent or expired.
    Miss,
}

impl CacheLookup {
    /// Classify from presence.
    #[must_use]
    pub const fn from_present(present: bool) -> Self {
        if present { Self::Hit } else { Self::Miss }
    }

    /// Returns true for hits.
    #[must_use]
    pub const fn is_hit(self) -> bool {
        matches!(self, Self::Hit)
    }
}

/// Statistics of one region at report time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRegionStats {
    /// Region name.
    pub region: String,
    /// Estimated entry count, [`UNKNOWN_SIZE`] when unknown.
    pub size: i64,
    /// Hits since start.
    pub hits: u64,
    /// Misses since start.
    pub misses: u64,
    /// Evictions since start.
    pub evictions: u64,
}

impl CacheRegionStats {
    /// Total lookups since start.
    #[must_use]
    pub const fn lookups(&self) -> u64 {
        self.hits.saturating_add(self.misses)
    }

    /// `hits / (hits + misses)`, 0 when there were no lookups.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "ratios of event counts tolerate f64 rounding")]
    pub fn hit_ratio(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(hits: u64, misses: u64) -> CacheRegionStats {
        CacheRegionStats {
            region: "professionals".to_owned(),
            size: UNKNOWN_SIZE,
            hits,
            misses,
            evictions: 0,
        }
    }

    #[test]
    fn hit_ratio_of_seven_to_three() {
        assert!((stats(7, 3).hit_ratio() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn hit_ratio_without_lookups_is_zero() {
        assert!(stats(0, 0).hit_ratio().abs() < f64::EPSILON);
    }
}
