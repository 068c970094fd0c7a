//! Cache statistics.

/// Statistics about identity cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered with a live instance.
    pub hits: u64,
    /// Lookups that constructed a new instance.
    pub misses: u64,
    /// Entries currently mapped, live or not yet swept.
    pub entry_count: u64,
    /// Entries whose instance was dropped before the next lookup.
    pub reclaimed: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }
}
