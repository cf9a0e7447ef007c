//! Minimal control and status register file.
//!
//! Only the access gate is modelled: privilege checks, existence checks and
//! the read-only encoding of the CSR index. Traps are not raised; every
//! violation is an error that aborts the run.

use std::collections::BTreeMap;

use crate::error::CsrError;

pub const CYCLE: u16 = 0xC00;
pub const TIME: u16 = 0xC01;
pub const INSTRET: u16 = 0xC02;
pub const CYCLEH: u16 = 0xC80;
pub const TIMEH: u16 = 0xC81;
pub const INSTRETH: u16 = 0xC82;

pub const MSTATUS: u16 = 0x300;
pub const MISA: u16 = 0x301;
pub const MIE: u16 = 0x304;
pub const MTVEC: u16 = 0x305;
pub const MSCRATCH: u16 = 0x340;
pub const MEPC: u16 = 0x341;
pub const MCAUSE: u16 = 0x342;
pub const MTVAL: u16 = 0x343;
pub const MIP: u16 = 0x344;

pub const MVENDORID: u16 = 0xF11;
pub const MARCHID: u16 = 0xF12;
pub const MIMPID: u16 = 0xF13;
pub const MHARTID: u16 = 0xF14;

/// MXL = 32 bit, extensions I and M
const MISA_RV32IM: u32 = (1 << 30) | (1 << 8) | (1 << 12);

/// Privilege levels, ordered by increasing privilege
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrivilegeLevel {
    User = 0,
    Supervisor = 1,
    #[default]
    Machine = 3,
}

/// Read-modify-write flavour of a CSR instruction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CsrOp {
    ReadWrite,
    ReadSet,
    ReadClear,
}

impl CsrOp {
    /// New CSR value given the old one and the source operand
    pub fn apply(self, old: u32, operand: u32) -> u32 {
        match self {
            CsrOp::ReadWrite => operand,
            CsrOp::ReadSet => old | operand,
            CsrOp::ReadClear => old & !operand,
        }
    }
}

/// Values of the counters mirrored by the user-level counter CSRs
#[derive(Clone, Copy, Debug, Default)]
pub struct Counters {
    pub cycles: u64,
    pub instret: u64,
}

/// CSR storage
#[derive(Clone, Debug)]
pub struct CsrFile {
    values: BTreeMap<u16, u32>,
}

impl Default for CsrFile {
    fn default() -> Self {
        Self::new()
    }
}

impl CsrFile {
    pub fn new() -> Self {
        let mut values = BTreeMap::new();
        for index in [
            CYCLE, TIME, INSTRET, CYCLEH, TIMEH, INSTRETH, MSTATUS, MIE,
            MTVEC, MSCRATCH, MEPC, MCAUSE, MTVAL, MIP, MVENDORID, MARCHID,
            MIMPID, MHARTID,
        ] {
            values.insert(index, 0);
        }
        values.insert(MISA, MISA_RV32IM);
        Self { values }
    }

    /// Lowest privilege level allowed to touch the CSR, from bits [9:8]
    pub fn required_privilege(index: u16) -> PrivilegeLevel {
        match (index >> 8) & 0b11 {
            0b00 => PrivilegeLevel::User,
            0b01 => PrivilegeLevel::Supervisor,
            _ => PrivilegeLevel::Machine,
        }
    }

    /// Bits [11:10] == 0b11 mark a read-only CSR
    pub fn is_read_only(index: u16) -> bool {
        (index >> 10) & 0b11 == 0b11
    }

    fn check_access(
        &self,
        index: u16,
        privilege: PrivilegeLevel,
        write: bool,
    ) -> Result<(), CsrError> {
        if !self.values.contains_key(&index) {
            return Err(CsrError::NonExistent(index));
        }
        if privilege < Self::required_privilege(index) {
            return Err(CsrError::PrivilegeViolation(index));
        }
        if write && Self::is_read_only(index) {
            return Err(CsrError::ReadOnly(index));
        }
        Ok(())
    }

    pub fn read(
        &self,
        index: u16,
        privilege: PrivilegeLevel,
        counters: Counters,
    ) -> Result<u32, CsrError> {
        self.check_access(index, privilege, false)?;
        Ok(match index {
            CYCLE | TIME => counters.cycles as u32,
            CYCLEH | TIMEH => (counters.cycles >> 32) as u32,
            INSTRET => counters.instret as u32,
            INSTRETH => (counters.instret >> 32) as u32,
            _ => self.values.get(&index).copied().unwrap_or(0),
        })
    }

    pub fn write(
        &mut self,
        index: u16,
        value: u32,
        privilege: PrivilegeLevel,
    ) -> Result<(), CsrError> {
        self.check_access(index, privilege, true)?;
        // misa is WARL and fixed in this implementation
        if index != MISA {
            self.values.insert(index, value);
        }
        Ok(())
    }
}
