//! ABI register names

use serde::{Deserialize, Serialize};

/// Register x0 (hard-wired zero)
pub const REG_ZERO: u32 = 0;
/// Register x1 (return address)
pub const REG_RA: u32 = 1;
/// Register x2 (stack pointer)
pub const REG_SP: u32 = 2;
/// Register x10 (first argument / return value)
pub const REG_A0: u32 = 10;
/// Register x17 (system call number)
pub const REG_A7: u32 = 17;

const ABI_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1",
    "a2", "a3", "a4", "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7",
    "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
];

/// Which register-name table to use when printing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterNames {
    #[default]
    Abi,
    Numeric,
}

/// Returns the printable name of register `index`
pub fn register_name(index: u32, names: RegisterNames) -> String {
    match names {
        RegisterNames::Abi => ABI_NAMES
            .get(index as usize)
            .map(|name| name.to_string())
            .unwrap_or_else(|| format!("x{}", index)),
        RegisterNames::Numeric => format!("x{}", index),
    }
}

/// Looks up a register by ABI name (`a0`, `fp`) or numeric name (`x10`)
pub fn register_index(name: &str) -> Option<u32> {
    if name == "fp" {
        return Some(8);
    }
    if let Some(position) = ABI_NAMES.iter().position(|&abi| abi == name) {
        return Some(position as u32);
    }
    name.strip_prefix('x')
        .and_then(|digits| digits.parse::<u32>().ok())
        .filter(|&index| index < 32)
}
