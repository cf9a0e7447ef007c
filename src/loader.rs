//! Utility functions for preparing the pipeline for execution

use std::path::Path;

use log::{debug, warn};

use crate::elf_helper::{read_elf, ElfImage};
use crate::error::{ElfError, SimulatorResult};
use crate::instruction::Instruction;
use crate::memory::MemorySystem;
use crate::pipelined::Pipeline;

/// Resets the pipeline and loads an ELF file into it
pub fn load_elf(pipeline: &mut Pipeline, path: &Path) -> SimulatorResult<()> {
    let image = read_elf(path)?;
    load_image(pipeline, &image)
}

/// Resets the pipeline and loads an already parsed image.
///
/// Every segment goes to data memory; words of executable segments that
/// decode also go to instruction memory. Memory beyond the file size of a
/// segment is left untouched, as unwritten memory reads as zero.
pub fn load_image(pipeline: &mut Pipeline, image: &ElfImage) -> SimulatorResult<()> {
    pipeline.reset();
    let state = pipeline.state_mut();
    let instruction_range = state.instruction_memory.address_range();

    for segment in &image.segments {
        debug!(
            "Loading segment: virtual address {:#010x}, memory size {:#x}, file size {:#x}",
            segment.virtual_address,
            segment.memory_size,
            segment.data.len()
        );

        for (offset, byte) in segment.data.iter().enumerate() {
            let address = segment.virtual_address.wrapping_add(offset as u32);
            state
                .data_memory
                .write_byte(address, *byte, true)
                .map_err(|_| ElfError::AddressOutOfBounds(address))?;
        }

        if !segment.executable {
            continue;
        }
        for (offset, word) in segment.data.chunks_exact(4).enumerate() {
            let address = segment.virtual_address.wrapping_add(4 * offset as u32);
            if !instruction_range.contains(address, 4) {
                return Err(ElfError::AddressOutOfBounds(address).into());
            }
            let raw = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            match Instruction::new(raw) {
                Ok(instruction) => state.instruction_memory.store(address, instruction)?,
                Err(_) => warn!("Skipping undecodable word {:#010x} at {:#010x}", raw, address),
            }
        }
    }

    state.program_counter = image.entry;
    debug!("Initial PC: {:#010x}", image.entry);
    Ok(())
}
