//! Write-back, write-allocate data cache

use super::address::DecodedAddress;
use super::cache::{Cache, CacheConfig, CacheStatistics};
use super::main_memory::{AccessWidth, AddressRange, Memory};
use super::{
    extract, fill_block, impl_by_width, splice, write_back_block, write_memory,
    MemorySystem, WidthAccess,
};
use crate::error::SimulatorResult;

/// Stores stay in the cache until their block is evicted
#[derive(Clone, Debug)]
pub struct WriteBackMemorySystem {
    cache: Cache<u32>,
    memory: Memory,
    statistics: CacheStatistics,
}

impl WriteBackMemorySystem {
    pub fn new(config: CacheConfig, memory: Memory) -> Self {
        Self { cache: Cache::new(config), memory, statistics: CacheStatistics::default() }
    }

    pub fn cache(&self) -> &Cache<u32> {
        &self.cache
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Writes every dirty block back to memory, keeping them cached
    pub fn flush(&mut self) {
        for (address, values) in self.cache.clean() {
            write_back_block(&mut self.memory, &address, &values);
        }
    }

    /// Inserts a block, writing back whatever dirty block it displaced
    fn insert(&mut self, decoded: &DecodedAddress, block: Vec<u32>, is_store: bool) {
        if let (_, Some((address, values))) = self.cache.write_block(decoded, block, is_store) {
            write_back_block(&mut self.memory, &address, &values);
        }
    }
}

impl WidthAccess for WriteBackMemorySystem {
    fn read_aligned(
        &mut self,
        address: u32,
        width: AccessWidth,
        update_statistics: bool,
    ) -> SimulatorResult<u32> {
        let decoded = self.cache.decode(address);
        let cached = self
            .cache
            .read_block(&decoded)
            .map(|block| block[decoded.block_offset]);
        let word = match cached {
            Some(word) => word,
            None => {
                let block = fill_block(&self.memory, &decoded, self.cache.block_len());
                let word = block[decoded.block_offset];
                self.insert(&decoded, block, false);
                word
            }
        };
        if update_statistics {
            self.statistics.record(cached.is_some());
        }
        Ok(extract(word, decoded.byte_offset, width))
    }

    fn write_aligned(
        &mut self,
        address: u32,
        width: AccessWidth,
        value: u32,
        directly_write_to_lower_memory: bool,
    ) -> SimulatorResult<()> {
        if directly_write_to_lower_memory {
            return write_memory(&mut self.memory, address, width, value);
        }

        let decoded = self.cache.decode(address);
        let cached = self.cache.read_block(&decoded).map(<[u32]>::to_vec);
        let hit = cached.is_some();
        let mut block = cached.unwrap_or_else(|| {
            fill_block(&self.memory, &decoded, self.cache.block_len())
        });
        let word = &mut block[decoded.block_offset];
        *word = splice(*word, decoded.byte_offset, width, value);
        self.insert(&decoded, block, true);
        self.statistics.record(hit);
        Ok(())
    }

    fn backing(&self) -> &Memory {
        &self.memory
    }
}

impl MemorySystem for WriteBackMemorySystem {
    impl_by_width!();

    fn reset(&mut self) {
        self.cache.reset();
        self.memory.reset();
        self.statistics = CacheStatistics::default();
    }

    fn address_range(&self) -> AddressRange {
        self.memory.range()
    }

    fn statistics(&self) -> Option<CacheStatistics> {
        Some(self.statistics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::replacement::ReplacementPolicy;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// 1 set, 2 ways, 2 words per block
    fn system(replacement: ReplacementPolicy) -> WriteBackMemorySystem {
        let config = CacheConfig { index_bits: 0, block_bits: 1, associativity: 2, replacement };
        WriteBackMemorySystem::new(config, Memory::new(AddressRange::new(0, 0x1000)))
    }

    #[test]
    fn test_dirty_data_is_read_from_cache() {
        let mut system = system(ReplacementPolicy::Lru);
        system.write_word(0x100, 0x1234_5678, false).unwrap();
        assert_eq!(system.memory().read_word(0x100).unwrap(), 0);
        assert_eq!(system.read_word(0x100, true).unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_eviction_writes_back() {
        let mut system = system(ReplacementPolicy::Lru);
        system.write_word(0x100, 7, false).unwrap();
        system.read_word(0x200, true).unwrap();
        assert_eq!(system.memory().read_word(0x100).unwrap(), 0);
        // third block in a two-way set displaces the dirty one
        system.read_word(0x300, true).unwrap();
        assert_eq!(system.memory().read_word(0x100).unwrap(), 7);
        assert_eq!(system.read_word(0x100, true).unwrap(), 7);
    }

    #[test]
    fn test_store_byte_then_load_word_across_eviction() {
        let mut system = system(ReplacementPolicy::Lru);
        system.write_byte(0x101, 0x5a, false).unwrap();
        system.read_word(0x200, true).unwrap();
        system.read_word(0x300, true).unwrap();
        system.read_word(0x400, true).unwrap();
        assert_eq!(system.read_word(0x100, true).unwrap(), 0x5a00);
    }

    #[test]
    fn test_direct_write_bypasses_cache() {
        let mut system = system(ReplacementPolicy::Lru);
        system.write_word(0x10, 9, true).unwrap();
        assert_eq!(system.memory().read_word(0x10).unwrap(), 9);
        assert_eq!(system.statistics().unwrap().accesses, 0);
        let decoded = system.cache().decode(0x10);
        assert!(!system.cache().contains(&decoded));
    }

    #[test]
    fn test_flush_cleans_blocks() {
        let mut system = system(ReplacementPolicy::Plru);
        system.write_halfword(0x22, 0xbeef, false).unwrap();
        system.flush();
        assert_eq!(system.memory().read_word(0x20).unwrap(), 0xbeef_0000);
        assert!(system
            .cache()
            .sets()
            .iter()
            .flat_map(|set| set.blocks.iter())
            .all(|block| !block.dirty));
    }

    proptest! {
        /// The cache is transparent: same values as flat memory, and the
        /// statistics depend only on the access sequence
        #[test]
        fn behaves_like_flat_memory(
            ops in prop::collection::vec((any::<bool>(), 0u32..64, any::<u32>()), 1..64),
        ) {
            let mut flat = Memory::new(AddressRange::new(0, 0x1000));
            let mut first = system(ReplacementPolicy::Lru);
            let mut second = system(ReplacementPolicy::Lru);
            for (is_write, word, value) in ops {
                let address = word * 4;
                if is_write {
                    flat.write_word(address, value).unwrap();
                    first.write_word(address, value, false).unwrap();
                    second.write_word(address, value, false).unwrap();
                } else {
                    let expected = flat.read_word(address).unwrap();
                    prop_assert_eq!(first.read_word(address, true).unwrap(), expected);
                    prop_assert_eq!(second.read_word(address, true).unwrap(), expected);
                }
            }
            prop_assert_eq!(first.statistics(), second.statistics());
        }
    }
}
