//! Write-through, no-write-allocate data cache

use super::cache::{Cache, CacheConfig, CacheStatistics};
use super::main_memory::{AccessWidth, AddressRange, Memory};
use super::{
    extract, fill_block, impl_by_width, splice, write_memory, MemorySystem, WidthAccess,
};
use crate::error::SimulatorResult;

/// Backing memory is always current; the cache only accelerates reads
#[derive(Clone, Debug)]
pub struct WriteThroughMemorySystem {
    cache: Cache<u32>,
    memory: Memory,
    statistics: CacheStatistics,
}

impl WriteThroughMemorySystem {
    pub fn new(config: CacheConfig, memory: Memory) -> Self {
        Self { cache: Cache::new(config), memory, statistics: CacheStatistics::default() }
    }

    pub fn cache(&self) -> &Cache<u32> {
        &self.cache
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }
}

impl WidthAccess for WriteThroughMemorySystem {
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
                self.cache.write_block(&decoded, block, false);
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
        let block = self.cache.read_block(&decoded).map(<[u32]>::to_vec);
        let hit = block.is_some();
        if let Some(mut block) = block {
            let word = &mut block[decoded.block_offset];
            *word = splice(*word, decoded.byte_offset, width, value);
            self.cache.write_block(&decoded, block, false);
        }
        self.statistics.record(hit);
        write_memory(&mut self.memory, address, width, value)
    }

    fn backing(&self) -> &Memory {
        &self.memory
    }
}

impl MemorySystem for WriteThroughMemorySystem {
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
    use pretty_assertions::assert_eq;

    fn system() -> WriteThroughMemorySystem {
        // 2 sets, 2 ways, 2 words per block
        let config = CacheConfig { index_bits: 1, block_bits: 1, ..CacheConfig::default() };
        WriteThroughMemorySystem::new(config, Memory::new(AddressRange::new(0, 0x1000)))
    }

    #[test]
    fn test_write_miss_does_not_allocate() {
        let mut system = system();
        system.write_word(0x20, 0xcafe, false).unwrap();
        let decoded = system.cache().decode(0x20);
        assert!(!system.cache().contains(&decoded));
        assert_eq!(system.memory().read_word(0x20).unwrap(), 0xcafe);
    }

    #[test]
    fn test_write_hit_updates_cache_and_memory() {
        let mut system = system();
        assert_eq!(system.read_word(0x20, true).unwrap(), 0);
        system.write_byte(0x21, 0xab, false).unwrap();
        assert_eq!(system.memory().read_word(0x20).unwrap(), 0xab00);
        assert_eq!(system.read_word(0x20, true).unwrap(), 0xab00);

        let statistics = system.statistics().unwrap();
        assert_eq!(statistics.accesses, 3);
        assert_eq!(statistics.hits, 2);
        assert_eq!(statistics.last_hit, Some(true));
        // write-through never leaves a dirty block behind
        assert!(system
            .cache()
            .sets()
            .iter()
            .flat_map(|set| set.blocks.iter())
            .all(|block| !block.dirty));
    }

    #[test]
    fn test_read_without_statistics() {
        let mut system = system();
        system.read_word(0x40, false).unwrap();
        assert_eq!(system.statistics().unwrap().accesses, 0);
    }

    #[test]
    fn test_reset() {
        let mut system = system();
        system.write_word(0x8, 3, false).unwrap();
        system.read_word(0x8, true).unwrap();
        system.reset();
        assert_eq!(system.statistics().unwrap(), CacheStatistics::default());
        assert_eq!(system.read_word(0x8, false).unwrap(), 0);
    }
}
