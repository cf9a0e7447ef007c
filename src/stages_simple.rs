//! Primitive implementation of 5 stages,
//! shared by the single-stage and the pipelined processor

use log::trace;

use crate::alu::{AluOutput, AluSrc1, AluSrc2};
use crate::cpu::ArchitecturalState;
use crate::instruction::{ControlSignals, Instruction, RegisterAccess, WbSrc};

/// IF: Fetch the instruction at the PC, or None if there is nothing to run
pub fn instruction_fetch(
    state: &mut ArchitecturalState,
) -> crate::error::SimulatorResult<Option<(u32, Instruction)>> {
    if !state.instruction_at_pc() {
        return Ok(None);
    }
    let pc = state.program_counter;
    let inst = state.instruction_memory.read_instruction(pc, true)?;
    trace!("PC: {:#010x}; Instruction: {}", pc, inst);
    Ok(Some((pc, inst)))
}

/// ID: Register read
pub fn register_read(inst: &Instruction, state: &ArchitecturalState) -> RegisterAccess {
    inst.access_register_file(state)
}

/// EX: Pick the two ALU inputs from the control signals
pub fn select_operands(
    controls: &ControlSignals,
    access: &RegisterAccess,
    address: Option<u32>,
) -> (Option<u32>, Option<u32>) {
    let in1 = match controls.alu_src1 {
        AluSrc1::Register => access.rs1_value,
        AluSrc1::ProgramCounter => address,
    };
    let in2 = match controls.alu_src2 {
        AluSrc2::Register => access.rs2_value,
        AluSrc2::Immediate => access.imm,
    };
    (in1, in2)
}

/// EX: Compute stuff
pub fn execute(
    inst: &Instruction,
    access: &RegisterAccess,
    address: Option<u32>,
) -> crate::error::SimulatorResult<AluOutput> {
    let (in1, in2) = select_operands(&inst.controls, access, address);
    trace!("Executing: {}; in1: {:?}; in2: {:?}", inst, in1, in2);
    inst.alu_compute(in1, in2)
}

/// EX: Branch and jump target relative to the instruction
pub fn pc_plus_imm(address: Option<u32>, imm: Option<u32>) -> Option<u32> {
    Some(address?.wrapping_add(imm?))
}

/// Whether a branch or jump leaves the fall-through path
pub fn comparison_or_jump(controls: &ControlSignals, comparison: Option<bool>) -> bool {
    (controls.branch && comparison == Some(true)) || controls.jump
}

/// Where control actually continues after a branch or jump
pub fn resolve_target(
    controls: &ControlSignals,
    taken: bool,
    alu_result: Option<u32>,
    pc_plus_imm: Option<u32>,
    pc_plus_length: Option<u32>,
) -> Option<u32> {
    if controls.alu_to_pc {
        alu_result
    } else if taken {
        pc_plus_imm
    } else {
        pc_plus_length
    }
}

/// MEM: Access memory.
/// Loads and stores use the ALU result as address; CSR instructions take
/// the ALU result as their operand instead of rs2.
pub fn memory_access(
    inst: &Instruction,
    alu_result: Option<u32>,
    rs2_value: Option<u32>,
    state: &mut ArchitecturalState,
) -> crate::error::SimulatorResult<Option<u32>> {
    let controls = inst.controls;
    let address = if controls.mem_read || controls.mem_write { alu_result } else { None };
    let write_data = if inst.is_csr() { alu_result } else { rs2_value };
    inst.memory_access(address, write_data, state, true)
}

/// Bumps the taken-branch and jump counters for a resolved instruction
pub fn count_control_flow(controls: &ControlSignals, taken: bool, state: &mut ArchitecturalState) {
    let metrics = &mut state.performance_metrics;
    if controls.jump {
        metrics.procedure_count += 1;
    } else if controls.branch && taken {
        metrics.branch_count += 1;
    }
}

/// Values a write-back may choose from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteBackSources {
    pub pc_plus_length: Option<u32>,
    pub memory_result: Option<u32>,
    pub alu_result: Option<u32>,
    pub imm: Option<u32>,
}

impl WriteBackSources {
    pub fn select(&self, wb_src: Option<WbSrc>) -> Option<u32> {
        match wb_src? {
            WbSrc::PcPlusLength => self.pc_plus_length,
            WbSrc::Memory => self.memory_result,
            WbSrc::Alu => self.alu_result,
            WbSrc::Immediate => self.imm,
        }
    }
}

/// WB: Write stuff back to the selected register and retire the instruction
pub fn write_back(
    inst: &Instruction,
    write_register: Option<u32>,
    sources: &WriteBackSources,
    state: &mut ArchitecturalState,
) {
    let value = sources.select(inst.controls.wb_src);
    inst.write_back(write_register, value, state);
    if !inst.is_empty() {
        state.performance_metrics.instruction_count += 1;
    }
}
