//! Source address allow-list.
//!
//! An [`AccessList`] holds an ordered set of CIDR ranges and answers whether
//! a textual address falls inside any of them. Answers are memoized per
//! address string in a bounded LRU cache shared by all request tasks.
//!
//! The ranges never change after construction, so a cached answer is always
//! the answer a fresh scan would produce. Eviction only costs a rescan.

use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use ipnet::IpNet;

use crate::config::ConfigError;
use crate::security::cache::LruCache;

/// CIDR allow-list with a memoizing front cache.
#[derive(Debug)]
pub struct AccessList {
    ranges: Vec<IpNet>,
    cache: Option<Mutex<LruCache<String, bool>>>,
}

impl AccessList {
    /// Parse `ranges` into an access list.
    ///
    /// IPv4 and IPv6 ranges may be mixed freely. A `cache_capacity` of zero
    /// disables memoization so every lookup rescans the ranges.
    pub fn new<I, S>(ranges: I, cache_capacity: usize) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ranges = ranges
            .into_iter()
            .map(|range| {
                let range = range.as_ref();
                range
                    .parse::<IpNet>()
                    .map(|net| net.trunc())
                    .map_err(|source| ConfigError::InvalidRange {
                        range: range.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let cache = (cache_capacity > 0).then(|| Mutex::new(LruCache::new(cache_capacity)));

        Ok(Self { ranges, cache })
    }

    /// Returns true if `address` lies within any configured range.
    ///
    /// Anything that does not parse as an IP literal is simply not contained.
    pub fn contains(&self, address: &str) -> bool {
        if let Some(cached) = self.cached(address) {
            return cached;
        }

        let allowed = match address.parse::<IpAddr>() {
            Ok(ip) => self.matches(ip),
            Err(_) => false,
        };

        if let Some(mut cache) = self.lock_cache() {
            cache.insert(address.to_string(), allowed);
        }
        allowed
    }

    /// Cached answer for `address`, refreshing its recency on a hit.
    pub fn cached(&self, address: &str) -> Option<bool> {
        self.lock_cache()?.get(address).copied()
    }

    /// The parsed ranges, in configured order.
    pub fn ranges(&self) -> &[IpNet] {
        &self.ranges
    }

    /// Number of memoized addresses.
    pub fn cache_len(&self) -> usize {
        self.lock_cache().map(|cache| cache.len()).unwrap_or(0)
    }

    fn matches(&self, ip: IpAddr) -> bool {
        // Dual-stack listeners report IPv4 peers as ::ffff:a.b.c.d.
        let ip = ip.to_canonical();
        self.ranges.iter().any(|net| net.contains(&ip))
    }

    fn lock_cache(&self) -> Option<MutexGuard<'_, LruCache<String, bool>>> {
        // Cache entries are plain booleans; a poisoned lock holds nothing unsafe to reuse.
        self.cache
            .as_ref()
            .map(|cache| cache.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
