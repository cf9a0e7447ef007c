//! Cache implementation

use std::fmt;

use log::trace;
use serde::{Deserialize, Serialize};

use super::address::DecodedAddress;
use super::replacement::{ReplacementPolicy, ReplacementStrategy};
use crate::error::{SimulatorError, SimulatorResult};

/// Floor of log2; 0 for 0
pub fn get_log_2(value: u32) -> u32 {
    value.checked_ilog2().unwrap_or(0)
}

/// Largest cache accepted, in words (64 MiB)
pub const MAX_CACHE_WORDS: u64 = 1 << 24;

pub fn is_pow_2(value: u32) -> bool {
    value != 0 && value & (value - 1) == 0
}

pub fn get_mask(bits: u32) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1 << bits) - 1
    }
}

/// Cache geometry.
/// A cache has `2^index_bits` sets of `associativity` blocks,
/// each block holding `2^block_bits` words.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub index_bits: u32,
    pub block_bits: u32,
    pub associativity: usize,
    #[serde(default)]
    pub replacement: ReplacementPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            index_bits: 2,
            block_bits: 2,
            associativity: 2,
            replacement: ReplacementPolicy::Lru,
        }
    }
}

impl CacheConfig {
    /// Geometry from byte sizes; every size must be a power of 2
    pub fn from_sizes(
        cache_size: u32,
        block_size: u32,
        associativity: usize,
        replacement: ReplacementPolicy,
    ) -> SimulatorResult<Self> {
        if !is_pow_2(cache_size) || !is_pow_2(block_size) || block_size < 4 {
            return Err(SimulatorError::Config(format!(
                "cache size {} and block size {} must be powers of 2 (block size at least 4)",
                cache_size, block_size
            )));
        }
        if associativity == 0 || !is_pow_2(associativity as u32) {
            return Err(SimulatorError::Config(format!(
                "associativity {} must be a power of 2",
                associativity
            )));
        }
        let block_num = cache_size / block_size;
        if block_num < associativity as u32 {
            return Err(SimulatorError::Config(format!(
                "a {}-byte cache cannot hold {} blocks of {} bytes per set",
                cache_size, associativity, block_size
            )));
        }
        let config = Self {
            index_bits: get_log_2(block_num / associativity as u32),
            block_bits: get_log_2(block_size / 4),
            associativity,
            replacement,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SimulatorResult<()> {
        if self.associativity == 0 {
            return Err(SimulatorError::Config(
                "cache associativity must be at least 1".into(),
            ));
        }
        if self.index_bits.saturating_add(self.block_bits).saturating_add(2) > 32 {
            return Err(SimulatorError::Config(format!(
                "{} index bits and {} block bits do not fit a 32-bit address",
                self.index_bits, self.block_bits
            )));
        }
        let words = (self.associativity as u64)
            .checked_mul(1 << (self.index_bits + self.block_bits))
            .filter(|&words| words <= MAX_CACHE_WORDS);
        if words.is_none() {
            return Err(SimulatorError::Config(format!(
                "a cache of {} sets x {} ways x {} words exceeds {} words",
                self.num_sets(),
                self.associativity,
                self.block_len(),
                MAX_CACHE_WORDS
            )));
        }
        Ok(())
    }

    pub fn num_sets(&self) -> usize {
        1 << self.index_bits
    }

    /// Words per block
    pub fn block_len(&self) -> usize {
        1 << self.block_bits
    }

    /// Total capacity in bytes
    pub fn size_in_bytes(&self) -> usize {
        self.num_sets() * self.associativity * self.block_len() * 4
    }
}

/// One block of a cache set
#[derive(Clone, Debug)]
pub struct CacheBlock<T> {
    pub values: Vec<T>,
    pub valid: bool,
    pub dirty: bool,
    /// The address the block was last filled from
    pub address: DecodedAddress,
}

impl<T: Clone + Default> CacheBlock<T> {
    fn new(block_len: usize) -> Self {
        Self {
            values: vec![T::default(); block_len],
            valid: false,
            dirty: false,
            address: DecodedAddress::default(),
        }
    }
}

/// A set of `associativity` blocks and their replacement state
#[derive(Clone, Debug)]
pub struct CacheSet<T> {
    pub blocks: Vec<CacheBlock<T>>,
    pub strategy: ReplacementStrategy,
}

impl<T: Clone + Default> CacheSet<T> {
    fn new(config: &CacheConfig) -> Self {
        Self {
            blocks: vec![CacheBlock::new(config.block_len()); config.associativity],
            strategy: ReplacementStrategy::new(
                config.replacement,
                config.associativity,
            ),
        }
    }

    fn find(&self, tag: u32) -> Option<usize> {
        self.blocks
            .iter()
            .position(|block| block.valid && block.address.tag == tag)
    }

    /// Block that the next miss in this set would replace
    pub fn next_to_replace(&self) -> usize {
        self.strategy.get_next_to_replace()
    }
}

/// Block evicted from the cache: its address and contents
pub type Evicted<T> = (DecodedAddress, Vec<T>);

/// Generic set-associative block store
#[derive(Clone, Debug)]
pub struct Cache<T> {
    config: CacheConfig,
    sets: Vec<CacheSet<T>>,
}

impl<T: Clone + Default> Cache<T> {
    pub fn new(config: CacheConfig) -> Self {
        Self { config, sets: vec![CacheSet::new(&config); config.num_sets()] }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn sets(&self) -> &[CacheSet<T>] {
        &self.sets
    }

    pub fn block_len(&self) -> usize {
        self.config.block_len()
    }

    /// Splits `address` according to this cache's geometry
    pub fn decode(&self, address: u32) -> DecodedAddress {
        DecodedAddress::new(self.config.index_bits, self.config.block_bits, address)
    }

    /// Pure lookup
    pub fn contains(&self, address: &DecodedAddress) -> bool {
        self.sets[address.cache_set_index].find(address.tag).is_some()
    }

    /// Returns the block on a hit and records the access; `None` on a miss
    pub fn read_block(&mut self, address: &DecodedAddress) -> Option<&[T]> {
        let set = &mut self.sets[address.cache_set_index];
        let index = set.find(address.tag)?;
        set.strategy.access(index);
        Some(&set.blocks[index].values)
    }

    /// Writes a whole block.
    ///
    /// Returns whether the address hit, and the evicted block if a dirty one
    /// had to make room. A filled block is dirty iff the write is a store.
    pub fn write_block(
        &mut self,
        address: &DecodedAddress,
        values: Vec<T>,
        is_store: bool,
    ) -> (bool, Option<Evicted<T>>) {
        debug_assert_eq!(values.len(), self.block_len());
        let set = &mut self.sets[address.cache_set_index];

        if let Some(index) = set.find(address.tag) {
            let block = &mut set.blocks[index];
            block.values = values;
            block.dirty = block.dirty || is_store;
            set.strategy.access(index);
            return (true, None);
        }

        let victim = set.strategy.get_next_to_replace();
        let block = &mut set.blocks[victim];
        let evicted = if block.valid && block.dirty {
            trace!(
                "Evicting dirty block {:#010x} from set {}",
                block.address.block_aligned_address,
                address.cache_set_index
            );
            Some((block.address, std::mem::replace(&mut block.values, values)))
        } else {
            block.values = values;
            None
        };
        block.valid = true;
        block.dirty = is_store;
        block.address = *address;
        set.strategy.access(victim);
        (false, evicted)
    }

    /// Clears every dirty bit, returning the blocks that were dirty
    pub fn clean(&mut self) -> Vec<Evicted<T>> {
        self.sets
            .iter_mut()
            .flat_map(|set| set.blocks.iter_mut())
            .filter(|block| block.valid && block.dirty)
            .map(|block| {
                block.dirty = false;
                (block.address, block.values.clone())
            })
            .collect()
    }

    /// Invalidates every block and forgets all replacement state
    pub fn reset(&mut self) {
        self.sets = vec![CacheSet::new(&self.config); self.config.num_sets()];
    }
}

/// Hit statistics of a cached memory system
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    pub hits: u64,
    pub accesses: u64,
    pub last_hit: Option<bool>,
}

impl CacheStatistics {
    pub fn record(&mut self, hit: bool) {
        self.accesses += 1;
        if hit {
            self.hits += 1;
        }
        self.last_hit = Some(hit);
    }

    pub fn misses(&self) -> u64 {
        self.accesses - self.hits
    }

    pub fn hit_rate(&self) -> f64 {
        if self.accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.accesses as f64
        }
    }
}

impl fmt::Display for CacheStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = match self.last_hit {
            Some(true) => "hit",
            Some(false) => "miss",
            None => "-",
        };
        write!(
            f,
            "hits: {}, accesses: {}, hit rate: {:.2}%, last access: {}",
            self.hits,
            self.accesses,
            self.hit_rate() * 100.0,
            last
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_mapped() -> Cache<u32> {
        Cache::new(CacheConfig {
            index_bits: 1,
            block_bits: 1,
            associativity: 1,
            replacement: ReplacementPolicy::Lru,
        })
    }

    #[test]
    fn test_get_log_2() {
        for n in 1..123457 {
            let expected = {
                let mut count = 0;
                let mut t = n;
                while t > 1 {
                    count += 1;
                    t >>= 1;
                }
                count
            };
            assert_eq!(expected, get_log_2(n));
        }
        assert_eq!(get_log_2(0), 0);
    }

    #[test]
    fn test_oversized_geometry_is_rejected() {
        let huge = CacheConfig { index_bits: 30, block_bits: 0, ..Default::default() };
        assert!(matches!(huge.validate(), Err(SimulatorError::Config(_))));
        let wide = CacheConfig { associativity: usize::MAX, ..Default::default() };
        assert!(matches!(wide.validate(), Err(SimulatorError::Config(_))));
        let largest =
            CacheConfig { index_bits: 22, block_bits: 2, associativity: 1, ..Default::default() };
        assert!(largest.validate().is_ok());
        let overflowing = CacheConfig { index_bits: u32::MAX, ..Default::default() };
        assert!(overflowing.validate().is_err());
        assert!(CacheConfig::from_sizes(1 << 30, 64, 2, ReplacementPolicy::Lru).is_err());
    }

    #[test]
    fn test_from_sizes() {
        let config =
            CacheConfig::from_sizes(1024, 16, 2, ReplacementPolicy::Plru).unwrap();
        assert_eq!(config.block_bits, 2);
        assert_eq!(config.index_bits, 5);
        assert_eq!(config.size_in_bytes(), 1024);
        assert!(CacheConfig::from_sizes(1000, 16, 2, ReplacementPolicy::Lru).is_err());
        assert!(CacheConfig::from_sizes(64, 16, 8, ReplacementPolicy::Lru).is_err());
        assert!(CacheConfig::from_sizes(64, 16, 3, ReplacementPolicy::Lru).is_err());
    }

    #[test]
    fn test_read_miss_then_hit() {
        let mut cache = direct_mapped();
        let address = cache.decode(0x14);
        assert!(cache.read_block(&address).is_none());
        let (hit, evicted) = cache.write_block(&address, vec![1, 2], false);
        assert!(!hit);
        assert!(evicted.is_none());
        assert_eq!(cache.read_block(&address), Some(&[1, 2][..]));
        assert!(cache.contains(&cache.decode(0x10)));
        assert!(!cache.contains(&cache.decode(0x04)));
    }

    #[test]
    fn test_dirty_block_is_evicted_with_contents() {
        let mut cache = direct_mapped();
        let first = cache.decode(0x00);
        let conflicting = cache.decode(0x20);
        assert_eq!(first.cache_set_index, conflicting.cache_set_index);

        cache.write_block(&first, vec![7, 8], true);
        let (hit, evicted) = cache.write_block(&conflicting, vec![0, 0], false);
        assert!(!hit);
        let (address, values) = evicted.unwrap();
        assert_eq!(address.block_aligned_address, 0x00);
        assert_eq!(values, vec![7, 8]);

        // the replacement is clean, so nothing comes back out
        let (_, evicted) = cache.write_block(&first, vec![1, 1], false);
        assert!(evicted.is_none());
    }

    #[test]
    fn test_store_on_miss_fill_is_dirty() {
        let mut cache = direct_mapped();
        let address = cache.decode(0x08);
        cache.write_block(&address, vec![3, 4], true);
        let set = &cache.sets()[address.cache_set_index];
        assert!(set.blocks[0].valid);
        assert!(set.blocks[0].dirty);
    }

    #[test]
    fn test_hit_keeps_dirty_bit() {
        let mut cache = direct_mapped();
        let address = cache.decode(0x08);
        cache.write_block(&address, vec![3, 4], true);
        let (hit, _) = cache.write_block(&address, vec![5, 6], false);
        assert!(hit);
        assert!(cache.sets()[address.cache_set_index].blocks[0].dirty);
    }

    #[test]
    fn test_lru_set_eviction_order() {
        let mut cache: Cache<u32> = Cache::new(CacheConfig {
            index_bits: 0,
            block_bits: 0,
            associativity: 2,
            replacement: ReplacementPolicy::Lru,
        });
        let (a, b, c) = (cache.decode(0x0), cache.decode(0x4), cache.decode(0x8));
        cache.write_block(&a, vec![1], true);
        cache.write_block(&b, vec![2], true);
        assert!(cache.read_block(&a).is_some());
        let (_, evicted) = cache.write_block(&c, vec![3], false);
        assert_eq!(evicted.unwrap().0.full_address, 0x4);
        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
    }

    #[test]
    fn test_reset() {
        let mut cache = direct_mapped();
        let address = cache.decode(0x0);
        cache.write_block(&address, vec![1, 2], true);
        cache.reset();
        assert!(!cache.contains(&address));
    }

    #[test]
    fn test_statistics() {
        let mut statistics = CacheStatistics::default();
        statistics.record(true);
        statistics.record(false);
        assert_eq!(statistics.hits + statistics.misses(), statistics.accesses);
        assert_eq!(statistics.last_hit, Some(false));
        assert!(statistics.to_string().contains("hit rate: 50.00%"));
    }
}
