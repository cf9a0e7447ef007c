//! Single cycle implementation: every instruction passes all five
//! stages within one cycle

use log::trace;

use crate::cpu::ArchitecturalState;
use crate::error::SimulatorResult;
use crate::pipelined::pipeline::{Common, PipelineRegister, WritebackRegister};
use crate::stages_simple::{self, WriteBackSources};
use crate::system_call::syscall;

/// Runs one whole instruction. Returns the retired instruction as a
/// writeback register, or `Empty` when there is nothing to fetch.
pub fn single_stage(state: &mut ArchitecturalState) -> SimulatorResult<PipelineRegister> {
    // IF
    let Some((pc, inst)) = stages_simple::instruction_fetch(state)? else {
        return Ok(PipelineRegister::Empty);
    };
    let pc_plus_length = pc.wrapping_add(inst.length());
    let controls = inst.controls;

    // ID
    let access = stages_simple::register_read(&inst, state);
    let write_register = inst.get_write_register();

    // EX
    let (comparison, alu_result) = if inst.is_ecall() {
        syscall(state)?;
        (None, None)
    } else {
        stages_simple::execute(&inst, &access, Some(pc))?
    };
    let pc_plus_imm = stages_simple::pc_plus_imm(Some(pc), access.imm);

    // MEM
    let memory_result = stages_simple::memory_access(&inst, alu_result, access.rs2_value, state)?;

    // Update PC on branch
    let taken = stages_simple::comparison_or_jump(&controls, comparison);
    let next_pc = if controls.branch || controls.jump {
        stages_simple::count_control_flow(&controls, taken, state);
        stages_simple::resolve_target(
            &controls,
            taken,
            alu_result,
            pc_plus_imm,
            Some(pc_plus_length),
        )
        .unwrap_or(pc_plus_length)
    } else {
        pc_plus_length
    };
    if next_pc != pc_plus_length {
        trace!("Branching from {:#010x} to: {:#010x}", pc, next_pc);
    }
    state.program_counter = next_pc;

    // WB
    let sources = WriteBackSources {
        pc_plus_length: Some(pc_plus_length),
        memory_result,
        alu_result,
        imm: access.imm,
    };
    stages_simple::write_back(&inst, write_register, &sources, state);

    Ok(PipelineRegister::Writeback(WritebackRegister {
        common: Common::new(inst, Some(pc)),
        write_register,
        write_data: sources.select(controls.wb_src),
    }))
}
