//! System call handler

use log::debug;

use crate::abi::{REG_A0, REG_A7};
use crate::cpu::ArchitecturalState;
use crate::error::{ExecutionError, SimulatorResult};
use crate::memory::MemorySystem;

pub const PRINT_INT: u32 = 1;
pub const PRINT_STRING: u32 = 4;
pub const EXIT: u32 = 10;
pub const PRINT_CHAR: u32 = 11;
pub const PRINT_HEX: u32 = 34;
pub const EXIT_WITH_CODE: u32 = 93;

/// Longest string `PRINT_STRING` will follow before giving up on a NUL
const MAX_STRING_LENGTH: u32 = 1 << 16;

/// Performs the system call selected by a7 with argument a0.
/// Returns true if the call ends the program.
pub fn syscall(state: &mut ArchitecturalState) -> SimulatorResult<bool> {
    let call_type = state.registers.read(REG_A7);
    let call_arg = state.registers.read(REG_A0);

    match call_type {
        PRINT_INT => state.output.push_str(&(call_arg as i32).to_string()),
        PRINT_STRING => {
            let mut address = call_arg;
            for _ in 0..MAX_STRING_LENGTH {
                // console output does not count as a program access
                let byte = state.data_memory.read_byte(address, false)?;
                if byte == 0 {
                    break;
                }
                state.output.push(byte as char);
                address = address.wrapping_add(1);
            }
        }
        PRINT_CHAR => state.output.push((call_arg as u8) as char),
        PRINT_HEX => state.output.push_str(&format!("{:#010x}", call_arg)),
        EXIT => state.exit_code = Some(0),
        EXIT_WITH_CODE => state.exit_code = Some(call_arg),
        _ => return Err(ExecutionError::UnknownSystemCall(call_type).into()),
    }

    if let Some(code) = state.exit_code {
        debug!("Program exited with code {}", code);
    }
    Ok(state.exit_code.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;
    use crate::error::SimulatorError;

    fn call(state: &mut ArchitecturalState, a7: u32, a0: u32) -> SimulatorResult<bool> {
        state.registers.write(REG_A7, a7);
        state.registers.write(REG_A0, a0);
        syscall(state)
    }

    #[test]
    fn test_printing() {
        let mut state = ArchitecturalState::new(&SimulatorConfig::default());
        for (i, byte) in b"hi!\0".iter().enumerate() {
            state.data_memory.write_byte(0x200 + i as u32, *byte, true).unwrap();
        }
        assert!(!call(&mut state, PRINT_STRING, 0x200).unwrap());
        assert!(!call(&mut state, PRINT_INT, -12i32 as u32).unwrap());
        assert!(!call(&mut state, PRINT_CHAR, b'x' as u32).unwrap());
        assert!(!call(&mut state, PRINT_HEX, 0xbeef).unwrap());
        assert_eq!(state.output, "hi!-12x0x0000beef");
    }

    #[test]
    fn test_exit() {
        let mut state = ArchitecturalState::new(&SimulatorConfig::default());
        assert!(call(&mut state, EXIT_WITH_CODE, 3).unwrap());
        assert_eq!(state.exit_code, Some(3));
        let mut state = ArchitecturalState::new(&SimulatorConfig::default());
        assert!(call(&mut state, EXIT, 3).unwrap());
        assert_eq!(state.exit_code, Some(0));
    }

    #[test]
    fn test_unknown_call() {
        let mut state = ArchitecturalState::new(&SimulatorConfig::default());
        assert!(matches!(
            call(&mut state, 999, 0),
            Err(SimulatorError::Execution(ExecutionError::UnknownSystemCall(999)))
        ));
    }
}
