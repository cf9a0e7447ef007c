//! Helper functions for parsing ELF files

use std::fs;
use std::path::Path;

use object::elf;
use object::read::elf::{FileHeader, ProgramHeader};

use crate::error::{ElfError, SimulatorResult};

pub type ELFReaderType = elf::FileHeader32<object::Endianness>;
pub type Segment = elf::ProgramHeader32<object::Endianness>;

/// One `PT_LOAD` segment, copied out of the file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadableSegment {
    pub virtual_address: u32,
    /// Bytes present in the file; the rest of `memory_size` is zero
    pub data: Vec<u8>,
    pub memory_size: u32,
    pub executable: bool,
}

/// What the loader needs from an executable
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElfImage {
    pub entry: u32,
    pub segments: Vec<LoadableSegment>,
}

/// Returns the pair (ELF reader, binary data)
pub fn parse_elf_file(path: &Path) -> SimulatorResult<(ELFReaderType, Vec<u8>)> {
    let data = fs::read(path).map_err(|error| ElfError::FileRead(path.to_path_buf(), error))?;
    let header = ELFReaderType::parse(&*data)
        .map_err(|error| ElfError::Parse(path.to_path_buf(), error.to_string()))?;
    Ok((*header, data))
}

/// Returns the endianness
pub fn get_elf_endian(elf_reader: &ELFReaderType) -> SimulatorResult<object::Endianness> {
    elf_reader.endian().map_err(|error| ElfError::InvalidFormat(error.to_string()).into())
}

/// Returns the program entry address
pub fn get_elf_entry(elf_reader: &ELFReaderType) -> SimulatorResult<u32> {
    Ok(elf_reader.e_entry(get_elf_endian(elf_reader)?))
}

/// Returns the machine type
pub fn get_elf_machine(elf_reader: &ELFReaderType) -> SimulatorResult<u16> {
    Ok(elf_reader.e_machine(get_elf_endian(elf_reader)?))
}

/// Return it as a vector for good
pub fn get_elf_segments(
    elf_reader: &ELFReaderType,
    elf_data: &[u8],
) -> SimulatorResult<Vec<Segment>> {
    let endian = get_elf_endian(elf_reader)?;
    let segments = elf_reader
        .program_headers(endian, elf_data)
        .map_err(|error| ElfError::InvalidFormat(error.to_string()))?;
    Ok(segments.to_vec())
}

/// Parses a little-endian RV32 executable into its loadable parts
pub fn read_elf(path: &Path) -> SimulatorResult<ElfImage> {
    let (elf_reader, elf_data) = parse_elf_file(path)?;
    let endian = get_elf_endian(&elf_reader)?;

    let machine = get_elf_machine(&elf_reader)?;
    if machine != elf::EM_RISCV {
        return Err(ElfError::InvalidMachine(machine).into());
    }
    if endian != object::Endianness::Little {
        return Err(ElfError::InvalidFormat("big-endian executables are not supported".into()).into());
    }

    let mut segments = Vec::new();
    for segment in get_elf_segments(&elf_reader, &elf_data)? {
        if segment.p_type(endian) != elf::PT_LOAD {
            continue;
        }
        let virtual_address = segment.p_vaddr(endian);
        let memory_size = segment.p_memsz(endian);
        // Can't handle with 32b memory
        if virtual_address.checked_add(memory_size).is_none() {
            return Err(ElfError::AddressOutOfBounds(virtual_address).into());
        }
        let data = segment
            .data(endian, &*elf_data)
            .map_err(|_| ElfError::InvalidFormat(format!(
                "segment at {:#010x} lies outside the file",
                virtual_address
            )))?;
        segments.push(LoadableSegment {
            virtual_address,
            data: data.to_vec(),
            memory_size,
            executable: segment.p_flags(endian) & elf::PF_X != 0,
        });
    }

    Ok(ElfImage { entry: get_elf_entry(&elf_reader)?, segments })
}
