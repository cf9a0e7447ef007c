//! Memory structure: flat backing stores and the cached memory systems
//! layered in front of them

pub mod address;
pub mod cache;
pub mod instruction_cache;
pub mod main_memory;
pub mod replacement;
pub mod write_back;
pub mod write_through;

use serde::{Deserialize, Serialize};

use address::DecodedAddress;
use cache::{Cache, CacheConfig, CacheStatistics};
use instruction_cache::InstructionCacheMemorySystem;
use main_memory::{AccessWidth, AddressRange, InstructionMemory, Memory};
use write_back::WriteBackMemorySystem;
use write_through::WriteThroughMemorySystem;

use crate::error::SimulatorResult;
use crate::instruction::Instruction;

/// Read/write-by-width contract shared by every data memory system
pub trait MemorySystem {
    fn read_byte(&mut self, address: u32, update_statistics: bool) -> SimulatorResult<u8>;
    fn read_halfword(&mut self, address: u32, update_statistics: bool) -> SimulatorResult<u16>;
    fn read_word(&mut self, address: u32, update_statistics: bool) -> SimulatorResult<u32>;

    fn write_byte(
        &mut self,
        address: u32,
        value: u8,
        directly_write_to_lower_memory: bool,
    ) -> SimulatorResult<()>;
    fn write_halfword(
        &mut self,
        address: u32,
        value: u16,
        directly_write_to_lower_memory: bool,
    ) -> SimulatorResult<()>;
    fn write_word(
        &mut self,
        address: u32,
        value: u32,
        directly_write_to_lower_memory: bool,
    ) -> SimulatorResult<()>;

    /// Clears contents, cache state and statistics
    fn reset(&mut self);

    fn address_range(&self) -> AddressRange;

    /// Hit statistics; `None` for memory without a cache
    fn statistics(&self) -> Option<CacheStatistics>;
}

/// Data memory without a cache
impl MemorySystem for Memory {
    fn read_byte(&mut self, address: u32, _: bool) -> SimulatorResult<u8> {
        Memory::read_byte(self, address)
    }
    fn read_halfword(&mut self, address: u32, _: bool) -> SimulatorResult<u16> {
        Memory::read_halfword(self, address)
    }
    fn read_word(&mut self, address: u32, _: bool) -> SimulatorResult<u32> {
        Memory::read_word(self, address)
    }
    fn write_byte(&mut self, address: u32, value: u8, _: bool) -> SimulatorResult<()> {
        Memory::write_byte(self, address, value)
    }
    fn write_halfword(&mut self, address: u32, value: u16, _: bool) -> SimulatorResult<()> {
        Memory::write_halfword(self, address, value)
    }
    fn write_word(&mut self, address: u32, value: u32, _: bool) -> SimulatorResult<()> {
        Memory::write_word(self, address, value)
    }
    fn reset(&mut self) {
        Memory::reset(self)
    }
    fn address_range(&self) -> AddressRange {
        self.range()
    }
    fn statistics(&self) -> Option<CacheStatistics> {
        None
    }
}

/// Reference: <https://inst.eecs.berkeley.edu/~cs61c/su20/pdfs/lectures/lec15.pdf>
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WritePolicy {
    WriteThrough,
    #[default]
    WriteBack,
}

/// The data memory system selected by configuration
pub enum DataMemory {
    Raw(Memory),
    WriteThrough(WriteThroughMemorySystem),
    WriteBack(WriteBackMemorySystem),
}

impl DataMemory {
    pub fn new(
        range: AddressRange,
        cache: Option<CacheConfig>,
        policy: WritePolicy,
    ) -> Self {
        let memory = Memory::new(range);
        match (cache, policy) {
            (None, _) => DataMemory::Raw(memory),
            (Some(config), WritePolicy::WriteThrough) => {
                DataMemory::WriteThrough(WriteThroughMemorySystem::new(config, memory))
            }
            (Some(config), WritePolicy::WriteBack) => {
                DataMemory::WriteBack(WriteBackMemorySystem::new(config, memory))
            }
        }
    }

    /// Cache contents for display
    pub fn cache(&self) -> Option<&Cache<u32>> {
        match self {
            DataMemory::Raw(_) => None,
            DataMemory::WriteThrough(system) => Some(system.cache()),
            DataMemory::WriteBack(system) => Some(system.cache()),
        }
    }

    /// Backing memory contents for display
    pub fn backing_memory(&self) -> &Memory {
        match self {
            DataMemory::Raw(memory) => memory,
            DataMemory::WriteThrough(system) => system.memory(),
            DataMemory::WriteBack(system) => system.memory(),
        }
    }

    fn system(&mut self) -> &mut dyn MemorySystem {
        match self {
            DataMemory::Raw(memory) => memory,
            DataMemory::WriteThrough(system) => system,
            DataMemory::WriteBack(system) => system,
        }
    }

    fn system_ref(&self) -> &dyn MemorySystem {
        match self {
            DataMemory::Raw(memory) => memory,
            DataMemory::WriteThrough(system) => system,
            DataMemory::WriteBack(system) => system,
        }
    }
}

impl MemorySystem for DataMemory {
    fn read_byte(&mut self, address: u32, update_statistics: bool) -> SimulatorResult<u8> {
        self.system().read_byte(address, update_statistics)
    }
    fn read_halfword(&mut self, address: u32, update_statistics: bool) -> SimulatorResult<u16> {
        self.system().read_halfword(address, update_statistics)
    }
    fn read_word(&mut self, address: u32, update_statistics: bool) -> SimulatorResult<u32> {
        self.system().read_word(address, update_statistics)
    }
    fn write_byte(&mut self, address: u32, value: u8, direct: bool) -> SimulatorResult<()> {
        self.system().write_byte(address, value, direct)
    }
    fn write_halfword(&mut self, address: u32, value: u16, direct: bool) -> SimulatorResult<()> {
        self.system().write_halfword(address, value, direct)
    }
    fn write_word(&mut self, address: u32, value: u32, direct: bool) -> SimulatorResult<()> {
        self.system().write_word(address, value, direct)
    }
    fn reset(&mut self) {
        self.system().reset()
    }
    fn address_range(&self) -> AddressRange {
        self.system_ref().address_range()
    }
    fn statistics(&self) -> Option<CacheStatistics> {
        self.system_ref().statistics()
    }
}

/// The instruction memory system selected by configuration
pub enum InstructionMemorySystem {
    Raw(InstructionMemory),
    Cached(InstructionCacheMemorySystem),
}

impl InstructionMemorySystem {
    pub fn new(range: AddressRange, cache: Option<CacheConfig>) -> Self {
        let memory = InstructionMemory::new(range);
        match cache {
            None => InstructionMemorySystem::Raw(memory),
            Some(config) => InstructionMemorySystem::Cached(
                InstructionCacheMemorySystem::new(config, memory),
            ),
        }
    }

    fn memory(&self) -> &InstructionMemory {
        match self {
            InstructionMemorySystem::Raw(memory) => memory,
            InstructionMemorySystem::Cached(system) => system.memory(),
        }
    }

    /// Backing store lookup; never touches cache state or statistics
    pub fn has_instruction_at(&self, address: u32) -> bool {
        self.memory().has_instruction_at(address)
    }

    /// Backing store read for display and error reports
    pub fn peek_instruction(&self, address: u32) -> Instruction {
        self.memory().fill_instruction(address)
    }

    pub fn read_instruction(
        &mut self,
        address: u32,
        update_statistics: bool,
    ) -> SimulatorResult<Instruction> {
        match self {
            InstructionMemorySystem::Raw(memory) => memory.read_instruction(address),
            InstructionMemorySystem::Cached(system) => {
                system.read_instruction(address, update_statistics)
            }
        }
    }

    /// Replaces the whole program; bypasses and then resets the cache
    pub fn write_instructions(
        &mut self,
        instructions: &[Instruction],
    ) -> SimulatorResult<()> {
        match self {
            InstructionMemorySystem::Raw(memory) => memory.write_instructions(instructions),
            InstructionMemorySystem::Cached(system) => system.write_instructions(instructions),
        }
    }

    /// Stores one instruction at an explicit address, bypassing the cache
    pub fn store(&mut self, address: u32, instruction: Instruction) -> SimulatorResult<()> {
        match self {
            InstructionMemorySystem::Raw(memory) => memory.store(address, instruction),
            InstructionMemorySystem::Cached(system) => system.store(address, instruction),
        }
    }

    pub fn instructions(&self) -> impl Iterator<Item = (&u32, &Instruction)> {
        self.memory().iter()
    }

    pub fn reset(&mut self) {
        match self {
            InstructionMemorySystem::Raw(memory) => memory.reset(),
            InstructionMemorySystem::Cached(system) => system.reset(),
        }
    }

    pub fn address_range(&self) -> AddressRange {
        self.memory().range()
    }

    pub fn cache(&self) -> Option<&Cache<Instruction>> {
        match self {
            InstructionMemorySystem::Raw(_) => None,
            InstructionMemorySystem::Cached(system) => Some(system.cache()),
        }
    }

    pub fn statistics(&self) -> Option<CacheStatistics> {
        match self {
            InstructionMemorySystem::Raw(_) => None,
            InstructionMemorySystem::Cached(system) => Some(system.statistics()),
        }
    }
}

/// Width-generic access implemented by the cached systems; the typed
/// `MemorySystem` methods are derived from it by `impl_by_width!`
trait WidthAccess {
    /// Access that stays within one word
    fn read_aligned(
        &mut self,
        address: u32,
        width: AccessWidth,
        update_statistics: bool,
    ) -> SimulatorResult<u32>;

    fn write_aligned(
        &mut self,
        address: u32,
        width: AccessWidth,
        value: u32,
        directly_write_to_lower_memory: bool,
    ) -> SimulatorResult<()>;

    fn backing(&self) -> &Memory;

    fn read_width(
        &mut self,
        address: u32,
        width: AccessWidth,
        update_statistics: bool,
    ) -> SimulatorResult<u32> {
        self.backing().check(address, width, "read")?;
        if !crosses_word(address, width) {
            return self.read_aligned(address, width, update_statistics);
        }
        // composed from bytes; only the first byte is counted
        let mut value = 0;
        for i in 0..width as u32 {
            let byte = self.read_aligned(
                address.wrapping_add(i),
                AccessWidth::Byte,
                update_statistics && i == 0,
            )?;
            value |= byte << (8 * i);
        }
        Ok(value)
    }

    fn write_width(
        &mut self,
        address: u32,
        width: AccessWidth,
        value: u32,
        directly_write_to_lower_memory: bool,
    ) -> SimulatorResult<()> {
        self.backing().check(address, width, "write")?;
        if !crosses_word(address, width) {
            return self.write_aligned(address, width, value, directly_write_to_lower_memory);
        }
        for i in 0..width as u32 {
            self.write_aligned(
                address.wrapping_add(i),
                AccessWidth::Byte,
                (value >> (8 * i)) & 0xff,
                directly_write_to_lower_memory,
            )?;
        }
        Ok(())
    }
}

/// Typed reads and writes in terms of `WidthAccess`
macro_rules! impl_by_width {
    () => {
        fn read_byte(&mut self, address: u32, update_statistics: bool) -> SimulatorResult<u8> {
            Ok(self.read_width(address, AccessWidth::Byte, update_statistics)? as u8)
        }
        fn read_halfword(
            &mut self,
            address: u32,
            update_statistics: bool,
        ) -> SimulatorResult<u16> {
            Ok(self.read_width(address, AccessWidth::Halfword, update_statistics)? as u16)
        }
        fn read_word(&mut self, address: u32, update_statistics: bool) -> SimulatorResult<u32> {
            self.read_width(address, AccessWidth::Word, update_statistics)
        }
        fn write_byte(&mut self, address: u32, value: u8, direct: bool) -> SimulatorResult<()> {
            self.write_width(address, AccessWidth::Byte, value as u32, direct)
        }
        fn write_halfword(
            &mut self,
            address: u32,
            value: u16,
            direct: bool,
        ) -> SimulatorResult<()> {
            self.write_width(address, AccessWidth::Halfword, value as u32, direct)
        }
        fn write_word(&mut self, address: u32, value: u32, direct: bool) -> SimulatorResult<()> {
            self.write_width(address, AccessWidth::Word, value, direct)
        }
    };
}
use impl_by_width;

fn crosses_word(address: u32, width: AccessWidth) -> bool {
    (address & 0b11) + width as u32 > 4
}

/// Width-dispatched write straight to backing memory
fn write_memory(
    memory: &mut Memory,
    address: u32,
    width: AccessWidth,
    value: u32,
) -> SimulatorResult<()> {
    match width {
        AccessWidth::Byte => memory.write_byte(address, value as u8),
        AccessWidth::Halfword => memory.write_halfword(address, value as u16),
        _ => memory.write_word(address, value),
    }
}

/// Reads a whole block of words from backing memory
fn fill_block(memory: &Memory, address: &DecodedAddress, block_len: usize) -> Vec<u32> {
    (0..block_len).map(|i| memory.fill_word(address.word_in_block(i))).collect()
}

/// Writes an evicted block back to memory
fn write_back_block(memory: &mut Memory, address: &DecodedAddress, values: &[u32]) {
    for (i, value) in values.iter().enumerate() {
        memory.spill_word(address.word_in_block(i), *value);
    }
}

/// `width` bytes of `word` starting at byte `byte_offset`
fn extract(word: u32, byte_offset: u32, width: AccessWidth) -> u32 {
    let width = width as u32;
    let shifted = word >> (8 * byte_offset);
    if width >= 4 {
        shifted
    } else {
        shifted & ((1 << (8 * width)) - 1)
    }
}

/// `word` with `width` bytes starting at `byte_offset` replaced by `value`
fn splice(word: u32, byte_offset: u32, width: AccessWidth, value: u32) -> u32 {
    let width = width as u32;
    if width >= 4 {
        return value;
    }
    let mask = ((1u32 << (8 * width)) - 1) << (8 * byte_offset);
    (word & !mask) | ((value << (8 * byte_offset)) & mask)
}
