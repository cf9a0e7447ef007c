//! Flat backing stores: a lazily paged byte memory for data
//! and an address-keyed store of decoded instructions

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryRegion, SimulatorResult};
use crate::instruction::Instruction;

const WORD_WIDTH: usize = 32;
const FIRST_LEVEL_WIDTH: usize = 10;
const SECOND_LEVEL_WIDTH: usize = 10;
const PAGE_WIDTH: usize = 12;

const FIRST_LEVEL_SIZE: usize = 1 << FIRST_LEVEL_WIDTH;
const SECOND_LEVEL_SIZE: usize = 1 << SECOND_LEVEL_WIDTH;
const PAGE_SIZE: usize = 1 << PAGE_WIDTH;

// Defines page type
type PageType = Box<[u8; PAGE_SIZE]>;

/// Half-open range `[start, end)` of valid addresses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    pub start: u32,
    pub end: u32,
}

impl AddressRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// True iff all `width` bytes starting at `address` are in range
    pub fn contains(&self, address: u32, width: u32) -> bool {
        address >= self.start
            && (address as u64) + (width as u64) <= self.end as u64
    }
}

/// Smallest unit a memory can be addressed with
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessWidth {
    Byte = 1,
    Halfword = 2,
    Word = 4,
    Doubleword = 8,
}

/// Byte-addressable memory with bounds checking.
/// Pages are allocated on first write; unwritten bytes read as zero.
#[derive(Clone)]
pub struct Memory {
    // data[x][y][z] stores the byte at (x << 22) | (y << 12) | z
    data: Vec<Option<Vec<Option<PageType>>>>,
    range: AddressRange,
    region: MemoryRegion,
    granularity: AccessWidth,
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("range", &self.range)
            .field("region", &self.region)
            .field("granularity", &self.granularity)
            .finish_non_exhaustive()
    }
}

impl Memory {
    /// Make a byte-granular data memory
    pub fn new(range: AddressRange) -> Self {
        Self::with_granularity(range, MemoryRegion::Data, AccessWidth::Byte)
    }

    pub fn with_granularity(
        range: AddressRange,
        region: MemoryRegion,
        granularity: AccessWidth,
    ) -> Self {
        Self { data: vec![None; FIRST_LEVEL_SIZE], range, region, granularity }
    }

    /// The first-level index of the address
    fn get_first_level_index(address: u32) -> usize {
        (address >> (WORD_WIDTH - FIRST_LEVEL_WIDTH)) as usize
    }
    /// The second-level index of the address
    fn get_second_level_index(address: u32) -> usize {
        ((address >> (WORD_WIDTH - FIRST_LEVEL_WIDTH - SECOND_LEVEL_WIDTH))
            & ((SECOND_LEVEL_SIZE - 1) as u32)) as usize
    }
    /// The page offset
    fn get_page_offset(address: u32) -> usize {
        (address & ((PAGE_SIZE - 1) as u32)) as usize
    }

    pub fn range(&self) -> AddressRange {
        self.range
    }

    pub fn region(&self) -> MemoryRegion {
        self.region
    }

    /// Checks range and granularity for an access
    pub(crate) fn check(
        &self,
        address: u32,
        width: AccessWidth,
        function: &'static str,
    ) -> SimulatorResult<()> {
        if width < self.granularity {
            return Err(MemoryError::UnsupportedFunction {
                function,
                region: self.region,
            }
            .into());
        }
        if !self.range.contains(address, width as u32) {
            return Err(MemoryError::AddressOutOfRange {
                address,
                region: self.region,
            }
            .into());
        }
        Ok(())
    }

    /// Check if a page is allocated at the given address
    pub fn page_exists(&self, address: u32) -> bool {
        let (i, j) = (
            Self::get_first_level_index(address),
            Self::get_second_level_index(address),
        );
        match &self.data[i] {
            Some(second_level) => second_level[j].is_some(),
            None => false,
        }
    }

    fn peek8(&self, address: u32) -> u8 {
        let (i, j, k) = (
            Self::get_first_level_index(address),
            Self::get_second_level_index(address),
            Self::get_page_offset(address),
        );
        match &self.data[i] {
            Some(second_level) => match &second_level[j] {
                Some(page) => page[k],
                None => 0,
            },
            None => 0,
        }
    }

    fn poke8(&mut self, address: u32, byte: u8) {
        let (i, j, k) = (
            Self::get_first_level_index(address),
            Self::get_second_level_index(address),
            Self::get_page_offset(address),
        );
        let second_level =
            self.data[i].get_or_insert_with(|| vec![None; SECOND_LEVEL_SIZE]);
        let page = second_level[j].get_or_insert_with(|| Box::new([0; PAGE_SIZE]));
        page[k] = byte;
    }

    fn peek(&self, address: u32, width: u32) -> u64 {
        (0..width).fold(0u64, |value, i| {
            value | ((self.peek8(address.wrapping_add(i)) as u64) << (8 * i))
        })
    }

    fn poke(&mut self, address: u32, width: u32, value: u64) {
        for i in 0..width {
            self.poke8(address.wrapping_add(i), (value >> (8 * i)) as u8);
        }
    }

    pub fn read_byte(&self, address: u32) -> SimulatorResult<u8> {
        self.check(address, AccessWidth::Byte, "read_byte")?;
        Ok(self.peek8(address))
    }

    pub fn read_halfword(&self, address: u32) -> SimulatorResult<u16> {
        self.check(address, AccessWidth::Halfword, "read_halfword")?;
        Ok(self.peek(address, 2) as u16)
    }

    pub fn read_word(&self, address: u32) -> SimulatorResult<u32> {
        self.check(address, AccessWidth::Word, "read_word")?;
        Ok(self.peek(address, 4) as u32)
    }

    pub fn read_doubleword(&self, address: u32) -> SimulatorResult<u64> {
        self.check(address, AccessWidth::Doubleword, "read_doubleword")?;
        Ok(self.peek(address, 8))
    }

    pub fn write_byte(&mut self, address: u32, value: u8) -> SimulatorResult<()> {
        self.check(address, AccessWidth::Byte, "write_byte")?;
        self.poke8(address, value);
        Ok(())
    }

    pub fn write_halfword(
        &mut self,
        address: u32,
        value: u16,
    ) -> SimulatorResult<()> {
        self.check(address, AccessWidth::Halfword, "write_halfword")?;
        self.poke(address, 2, value as u64);
        Ok(())
    }

    pub fn write_word(&mut self, address: u32, value: u32) -> SimulatorResult<()> {
        self.check(address, AccessWidth::Word, "write_word")?;
        self.poke(address, 4, value as u64);
        Ok(())
    }

    pub fn write_doubleword(
        &mut self,
        address: u32,
        value: u64,
    ) -> SimulatorResult<()> {
        self.check(address, AccessWidth::Doubleword, "write_doubleword")?;
        self.poke(address, 8, value);
        Ok(())
    }

    /// Word read used for cache fills: out-of-range words read as zero
    pub(crate) fn fill_word(&self, address: u32) -> u32 {
        if self.range.contains(address, 4) {
            self.peek(address, 4) as u32
        } else {
            0
        }
    }

    /// Word write used for evictions: out-of-range words are dropped
    pub(crate) fn spill_word(&mut self, address: u32, value: u32) {
        if self.range.contains(address, 4) {
            self.poke(address, 4, value as u64);
        }
    }

    /// Words of every allocated page, in address order, for display
    pub fn allocated_words(&self) -> Vec<(u32, u32)> {
        let mut words = Vec::new();
        for (i, second_level) in self.data.iter().enumerate() {
            let Some(second_level) = second_level else { continue };
            for (j, page) in second_level.iter().enumerate() {
                if page.is_none() {
                    continue;
                }
                let base = ((i << (WORD_WIDTH - FIRST_LEVEL_WIDTH))
                    | (j << PAGE_WIDTH)) as u32;
                for offset in (0..PAGE_SIZE as u32).step_by(4) {
                    let address = base | offset;
                    let word = self.peek(address, 4) as u32;
                    if word != 0 {
                        words.push((address, word));
                    }
                }
            }
        }
        words
    }

    /// Drop all contents
    pub fn reset(&mut self) {
        self.data = vec![None; FIRST_LEVEL_SIZE];
    }
}

/// Instruction store. Holds decoded instructions keyed by address;
/// it is word-granular and read-only while a program runs.
#[derive(Clone, Debug)]
pub struct InstructionMemory {
    instructions: BTreeMap<u32, Instruction>,
    range: AddressRange,
}

impl InstructionMemory {
    pub fn new(range: AddressRange) -> Self {
        Self { instructions: BTreeMap::new(), range }
    }

    pub fn range(&self) -> AddressRange {
        self.range
    }

    pub(crate) fn check(&self, address: u32) -> SimulatorResult<()> {
        if !self.range.contains(address, 4) {
            return Err(MemoryError::AddressOutOfRange {
                address,
                region: MemoryRegion::Instruction,
            }
            .into());
        }
        Ok(())
    }

    pub fn has_instruction_at(&self, address: u32) -> bool {
        self.instructions.contains_key(&address)
    }

    /// Instruction at `address`, or the empty instruction if there is none
    pub fn read_instruction(&self, address: u32) -> SimulatorResult<Instruction> {
        self.check(address)?;
        Ok(self.instructions.get(&address).copied().unwrap_or_default())
    }

    /// Raw encoding of the instruction at `address`
    pub fn read_word(&self, address: u32) -> SimulatorResult<u32> {
        Ok(self.read_instruction(address)?.raw_inst)
    }

    /// Sub-word reads make no sense on an instruction store
    pub fn read_byte(&self, _address: u32) -> SimulatorResult<u8> {
        Err(MemoryError::UnsupportedFunction {
            function: "read_byte",
            region: MemoryRegion::Instruction,
        }
        .into())
    }

    /// Fill lookup: instruction or placeholder, never an error
    pub(crate) fn fill_instruction(&self, address: u32) -> Instruction {
        self.instructions.get(&address).copied().unwrap_or_default()
    }

    /// Clears the store and writes `instructions` back to back from the start
    /// of the range
    pub fn write_instructions(
        &mut self,
        instructions: &[Instruction],
    ) -> SimulatorResult<()> {
        self.instructions.clear();
        let mut address = self.range.start;
        for instruction in instructions {
            self.store(address, *instruction)?;
            address = address.wrapping_add(instruction.length());
        }
        Ok(())
    }

    /// Stores one instruction at an explicit address
    pub fn store(
        &mut self,
        address: u32,
        instruction: Instruction,
    ) -> SimulatorResult<()> {
        self.check(address)?;
        self.instructions.insert(address, instruction);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &Instruction)> {
        self.instructions.iter()
    }

    pub fn reset(&mut self) {
        self.instructions.clear();
    }
}
