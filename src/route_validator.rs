use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::prefix_trie::PrefixTrie;
use crate::shared::{normalize_prefix, prefix_contains, Prefix, PrefixOrigin, ROAValidity, ASN};

const DEFAULT_CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ROA {
    pub prefix: Prefix,
    pub origin: ASN,
    pub max_length: u8,
}

impl ROA {
    pub fn new(prefix: Prefix, origin: ASN, max_length: Option<u8>) -> Self {
        let max_length = max_length.unwrap_or_else(|| prefix.prefix());
        ROA {
            prefix: normalize_prefix(prefix),
            origin,
            max_length,
        }
    }

    pub fn covers_prefix(&self, prefix: &Prefix) -> bool {
        prefix_contains(&self.prefix, prefix)
    }

    /// Classification of `prefix` originated by `origin` against this ROA
    /// alone.
    pub fn get_validity(&self, prefix: &Prefix, origin: ASN) -> ROAValidity {
        if !self.covers_prefix(prefix) {
            return ROAValidity::Unknown;
        }

        let valid_length = prefix.prefix() <= self.max_length;
        let valid_origin = self.origin == origin;

        match (valid_length, valid_origin) {
            (true, true) => ROAValidity::Valid,
            (false, true) => ROAValidity::InvalidByLength,
            (true, false) => ROAValidity::InvalidByOrigin,
            (false, false) => ROAValidity::InvalidByAll,
        }
    }
}

/// How the per-ROA results of a non-valid announcement collapse into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorstValidityMode {
    /// Smallest ordinal among the non-valid results (least invalid).
    #[default]
    Literal,
    /// Largest ordinal among the non-valid results.
    Maximum,
}

/// Classifies announcements against a frozen ROA index.
///
/// Cloning is cheap: clones share the index but get their own cache.
pub struct RouteValidator {
    roas: Arc<PrefixTrie<ROA>>,
    mode: WorstValidityMode,
    cache: Mutex<LruCache<(Prefix, ASN), ROAValidity>>,
    cache_capacity: NonZeroUsize,
}

impl RouteValidator {
    pub fn new(roas: Arc<PrefixTrie<ROA>>) -> Self {
        Self::with_options(roas, WorstValidityMode::default(), DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_options(roas: Arc<PrefixTrie<ROA>>, mode: WorstValidityMode, cache_capacity: usize) -> Self {
        let cache_capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        RouteValidator {
            roas,
            mode,
            cache: Mutex::new(LruCache::new(cache_capacity)),
            cache_capacity,
        }
    }

    /// Builds and freezes the ROA index in one step.
    pub fn from_roas<I: IntoIterator<Item = ROA>>(roas: I) -> Self {
        let trie: PrefixTrie<ROA> = roas.into_iter().map(|roa| (roa.prefix, roa)).collect();
        debug!(roas = trie.len(), "built ROA index");
        Self::new(trie.freeze())
    }

    pub fn roa_count(&self) -> usize {
        self.roas.len()
    }

    pub fn mode(&self) -> WorstValidityMode {
        self.mode
    }

    /// Entries currently held in this validator's cache.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn get_validity(&self, prefix: &Prefix, origin: ASN) -> ROAValidity {
        let key = (*prefix, origin);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(result) = cache.get(&key) {
                return *result;
            }
        }

        let result = self.compute_validity(prefix, origin);

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, result);
        }
        result
    }

    pub fn validate(&self, pair: &PrefixOrigin) -> ROAValidity {
        self.get_validity(&pair.prefix, pair.origin)
    }

    fn compute_validity(&self, prefix: &Prefix, origin: ASN) -> ROAValidity {
        let relevant_roas = self.roas.covering(prefix);
        if relevant_roas.is_empty() {
            return ROAValidity::Unknown;
        }

        let mut outcomes = Vec::with_capacity(relevant_roas.len());
        for (_, roa) in relevant_roas {
            let validity = roa.get_validity(prefix, origin);
            if validity == ROAValidity::Valid {
                return ROAValidity::Valid;
            }
            outcomes.push(validity);
        }

        let collapsed = match self.mode {
            WorstValidityMode::Literal => outcomes.iter().min(),
            WorstValidityMode::Maximum => outcomes.iter().max(),
        };
        // covering() was non-empty, so outcomes is too
        collapsed.copied().unwrap_or(ROAValidity::Unknown)
    }
}

impl Clone for RouteValidator {
    fn clone(&self) -> Self {
        RouteValidator {
            roas: Arc::clone(&self.roas),
            mode: self.mode,
            cache: Mutex::new(LruCache::new(self.cache_capacity)),
            cache_capacity: self.cache_capacity,
        }
    }
}

impl Default for RouteValidator {
    fn default() -> Self {
        Self::new(PrefixTrie::new().freeze())
    }
}
