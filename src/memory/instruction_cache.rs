//! Read-only cache in front of the instruction store

use super::cache::{Cache, CacheConfig, CacheStatistics};
use super::main_memory::InstructionMemory;
use crate::error::SimulatorResult;
use crate::instruction::Instruction;

#[derive(Clone, Debug)]
pub struct InstructionCacheMemorySystem {
    cache: Cache<Instruction>,
    memory: InstructionMemory,
    statistics: CacheStatistics,
}

impl InstructionCacheMemorySystem {
    pub fn new(config: CacheConfig, memory: InstructionMemory) -> Self {
        Self { cache: Cache::new(config), memory, statistics: CacheStatistics::default() }
    }

    pub fn cache(&self) -> &Cache<Instruction> {
        &self.cache
    }

    pub fn memory(&self) -> &InstructionMemory {
        &self.memory
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.statistics
    }

    /// Fetches through the cache. Slots of a filled block with nothing
    /// stored behind them hold the empty instruction.
    pub fn read_instruction(
        &mut self,
        address: u32,
        update_statistics: bool,
    ) -> SimulatorResult<Instruction> {
        self.memory.check(address)?;
        let decoded = self.cache.decode(address);
        let cached = self
            .cache
            .read_block(&decoded)
            .map(|block| block[decoded.block_offset]);
        let instruction = match cached {
            Some(instruction) => instruction,
            None => {
                let block: Vec<Instruction> = (0..self.cache.block_len())
                    .map(|i| self.memory.fill_instruction(decoded.word_in_block(i)))
                    .collect();
                let instruction = block[decoded.block_offset];
                self.cache.write_block(&decoded, block, false);
                instruction
            }
        };
        if update_statistics {
            self.statistics.record(cached.is_some());
        }
        Ok(instruction)
    }

    pub fn write_instructions(&mut self, instructions: &[Instruction]) -> SimulatorResult<()> {
        self.memory.write_instructions(instructions)?;
        self.reset_cache();
        Ok(())
    }

    pub fn store(&mut self, address: u32, instruction: Instruction) -> SimulatorResult<()> {
        self.memory.store(address, instruction)?;
        self.reset_cache();
        Ok(())
    }

    fn reset_cache(&mut self) {
        self.cache.reset();
        self.statistics = CacheStatistics::default();
    }

    pub fn reset(&mut self) {
        self.memory.reset();
        self.reset_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::main_memory::AddressRange;

    fn system() -> InstructionCacheMemorySystem {
        let config = CacheConfig { index_bits: 1, block_bits: 2, ..CacheConfig::default() };
        InstructionCacheMemorySystem::new(config, InstructionMemory::new(AddressRange::new(0, 0x400)))
    }

    fn nop() -> Instruction {
        Instruction::new(0x0000_0013).unwrap()
    }

    #[test]
    fn test_block_padded_with_empty_instructions() {
        let mut system = system();
        system.write_instructions(&[nop(), nop()]).unwrap();
        assert_eq!(system.read_instruction(0, true).unwrap().raw_inst, 0x13);
        // same block, nothing stored there
        assert!(system.read_instruction(0xc, true).unwrap().is_empty());
        let statistics = system.statistics();
        assert_eq!((statistics.accesses, statistics.hits), (2, 1));
    }

    #[test]
    fn test_loading_resets_cache() {
        let mut system = system();
        system.write_instructions(&[nop()]).unwrap();
        system.read_instruction(0, true).unwrap();
        system.store(0x4, nop()).unwrap();
        assert_eq!(system.statistics(), CacheStatistics::default());
        let decoded = system.cache().decode(0);
        assert!(!system.cache().contains(&decoded));
        assert!(!system.read_instruction(0x4, false).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_range_fetch() {
        let mut system = system();
        assert!(system.read_instruction(0x400, true).is_err());
    }
}
