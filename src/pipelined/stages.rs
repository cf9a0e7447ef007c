//! 5 stages adapted for piplined execution.
//!
//! Each stage reads only the previous cycle's registers (plus the shared
//! state) and produces its own register for the next cycle.

use log::debug;

use super::pipeline::{
    Common, DecodeRegister, ExecuteRegister, FetchRegister, FlushSignal, MemoryAccessRegister,
    PipelineRegister, StallSignal, WritebackRegister,
};
use crate::cpu::ArchitecturalState;
use crate::error::SimulatorResult;
use crate::instruction::RegisterAccess;
use crate::single_cycle;
use crate::stages_simple::{self, WriteBackSources};
use crate::system_call::syscall;

/// A processor stage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    /// `stages_until_writeback` is how many registers downstream of ID
    /// may still hold a producer that has not written back
    Decode { detect_hazards: bool, stages_until_writeback: usize },
    Execute,
    MemoryAccess,
    Writeback,
    /// All of the above fused into one cycle
    Single,
}

impl Stage {
    /// IF, ID, EX, MA, WB in register order
    pub fn five_stage(detect_hazards: bool, stages_until_writeback: usize) -> Vec<Stage> {
        vec![
            Stage::Fetch,
            Stage::Decode { detect_hazards, stages_until_writeback },
            Stage::Execute,
            Stage::MemoryAccess,
            Stage::Writeback,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Fetch => "IF",
            Stage::Decode { .. } => "ID",
            Stage::Execute => "EX",
            Stage::MemoryAccess => "MA",
            Stage::Writeback => "WB",
            Stage::Single => "single",
        }
    }

    /// Computes the register at `index` from last cycle's `registers`
    pub fn behavior(
        &self,
        registers: &[PipelineRegister],
        index: usize,
        state: &mut ArchitecturalState,
    ) -> SimulatorResult<PipelineRegister> {
        match self {
            Stage::Fetch => instruction_fetch(state),
            Stage::Decode { detect_hazards, stages_until_writeback } => {
                let window = detect_hazards.then_some(*stages_until_writeback);
                instruction_decode(registers, index, state, window)
            }
            Stage::Execute => execute(registers, index, state),
            Stage::MemoryAccess => memory_access(registers, index, state),
            Stage::Writeback => write_back(registers, index, state),
            Stage::Single => single_cycle::single_stage(state),
        }
    }
}

/// The register this stage consumes; bubbles read as `Empty`
fn input(registers: &[PipelineRegister], index: usize) -> PipelineRegister {
    let register = index
        .checked_sub(1)
        .and_then(|previous| registers.get(previous))
        .copied()
        .unwrap_or_default();
    if register.is_bubble() {
        PipelineRegister::Empty
    } else {
        register
    }
}

/// Marks `common` as stalled
fn stalled(mut common: Common, duration: u32) -> Common {
    common.stall_signal = Some(StallSignal { duration });
    common
}

/// IF stage
fn instruction_fetch(state: &mut ArchitecturalState) -> SimulatorResult<PipelineRegister> {
    let Some((pc, inst)) = stages_simple::instruction_fetch(state)? else {
        return Ok(PipelineRegister::Empty);
    };

    let pc_plus_length = pc.wrapping_add(inst.length());
    state.program_counter = pc_plus_length;

    let mut branch_prediction = false;
    if inst.controls.branch && state.branch_predictor.predict(pc) {
        if let Some(target) = stages_simple::pc_plus_imm(Some(pc), inst.attributes.imm) {
            state.program_counter = target;
            branch_prediction = true;
        }
    }

    Ok(PipelineRegister::Fetch(FetchRegister {
        common: Common::new(inst, Some(pc)),
        pc_plus_instruction_length: Some(pc_plus_length),
        branch_prediction,
    }))
}

/// Whether an instruction in flight will write a register `access` reads.
/// Only producers in the `window` registers from `index` on count.
fn data_hazard(
    registers: &[PipelineRegister],
    index: usize,
    window: usize,
    access: &RegisterAccess,
) -> bool {
    registers
        .iter()
        .skip(index)
        .take(window)
        .filter(|register| !register.is_bubble())
        .filter_map(|register| register.write_register())
        .any(|rd| rd != 0 && (access.rs1 == Some(rd) || access.rs2 == Some(rd)))
}

/// ID stage
fn instruction_decode(
    registers: &[PipelineRegister],
    index: usize,
    state: &mut ArchitecturalState,
    hazard_window: Option<usize>,
) -> SimulatorResult<PipelineRegister> {
    let PipelineRegister::Fetch(fetched) = input(registers, index) else {
        return Ok(PipelineRegister::Empty);
    };

    let inst = fetched.common.instruction;
    let access = stages_simple::register_read(&inst, state);
    let mut common = Common::new(inst, fetched.common.address_of_instruction);

    if let Some(window) = hazard_window {
        if data_hazard(registers, index, window, &access) {
            debug!("Data hazard on {}; stalling", inst);
            common = stalled(common, window as u32);
        }
    }

    Ok(PipelineRegister::Decode(DecodeRegister {
        common,
        rs1: access.rs1,
        rs2: access.rs2,
        rs1_value: access.rs1_value,
        rs2_value: access.rs2_value,
        imm: access.imm,
        write_register: inst.get_write_register(),
        pc_plus_instruction_length: fetched.pc_plus_instruction_length,
        branch_prediction: fetched.branch_prediction,
    }))
}

/// EX stage
fn execute(
    registers: &[PipelineRegister],
    index: usize,
    state: &mut ArchitecturalState,
) -> SimulatorResult<PipelineRegister> {
    let PipelineRegister::Decode(decoded) = input(registers, index) else {
        return Ok(PipelineRegister::Empty);
    };

    let inst = decoded.common.instruction;
    let address = decoded.common.address_of_instruction;
    let mut register = ExecuteRegister {
        common: Common::new(inst, address),
        rs2_value: decoded.rs2_value,
        imm: decoded.imm,
        write_register: decoded.write_register,
        pc_plus_imm: stages_simple::pc_plus_imm(address, decoded.imm),
        pc_plus_instruction_length: decoded.pc_plus_instruction_length,
        branch_prediction: decoded.branch_prediction,
        ..Default::default()
    };

    if inst.is_ecall() {
        // everything older must have left the pipeline first
        let last = registers.len().saturating_sub(1);
        let drained = registers
            .get(index..last)
            .map_or(true, |older| older.iter().all(|register| register.is_bubble()));
        if !drained {
            register.common = stalled(register.common, 1);
            return Ok(PipelineRegister::Execute(register));
        }
        if syscall(state)? {
            if let Some(next) = decoded.pc_plus_instruction_length {
                register.common.flush_signal = Some(FlushSignal { inclusive: false, address: next });
            }
        }
        return Ok(PipelineRegister::Execute(register));
    }

    let access = RegisterAccess {
        rs1: decoded.rs1,
        rs2: decoded.rs2,
        rs1_value: decoded.rs1_value,
        rs2_value: decoded.rs2_value,
        imm: decoded.imm,
    };
    let (comparison, alu_result) = stages_simple::execute(&inst, &access, address)?;
    register.comparison = comparison;
    register.alu_result = alu_result;
    Ok(PipelineRegister::Execute(register))
}

/// MA stage; also resolves branches and jumps
fn memory_access(
    registers: &[PipelineRegister],
    index: usize,
    state: &mut ArchitecturalState,
) -> SimulatorResult<PipelineRegister> {
    let PipelineRegister::Execute(executed) = input(registers, index) else {
        return Ok(PipelineRegister::Empty);
    };

    let inst = executed.common.instruction;
    let controls = inst.controls;
    let address = executed.common.address_of_instruction;
    let mut common = Common::new(inst, address);

    let memory_result =
        stages_simple::memory_access(&inst, executed.alu_result, executed.rs2_value, state)?;

    let taken = stages_simple::comparison_or_jump(&controls, executed.comparison);
    if controls.branch || controls.jump {
        if controls.branch {
            if let Some(address) = address {
                state.branch_predictor.update(address, taken);
            }
        }
        stages_simple::count_control_flow(&controls, taken, state);

        if taken != executed.branch_prediction {
            let target = stages_simple::resolve_target(
                &controls,
                taken,
                executed.alu_result,
                executed.pc_plus_imm,
                executed.pc_plus_instruction_length,
            );
            if let Some(target) = target {
                debug!("Misprediction at {:?}; redirecting to {:#010x}", address, target);
                common.flush_signal = Some(FlushSignal { inclusive: false, address: target });
            }
        }
    }

    if common.flush_signal.is_none() && state.exit_code.is_some() {
        if let Some(next) = executed.pc_plus_instruction_length {
            common.flush_signal = Some(FlushSignal { inclusive: false, address: next });
        }
    }

    Ok(PipelineRegister::MemoryAccess(MemoryAccessRegister {
        common,
        memory_result,
        alu_result: executed.alu_result,
        imm: executed.imm,
        write_register: executed.write_register,
        pc_plus_instruction_length: executed.pc_plus_instruction_length,
        comparison_or_jump: taken,
    }))
}

/// WB stage
fn write_back(
    registers: &[PipelineRegister],
    index: usize,
    state: &mut ArchitecturalState,
) -> SimulatorResult<PipelineRegister> {
    let PipelineRegister::MemoryAccess(accessed) = input(registers, index) else {
        return Ok(PipelineRegister::Empty);
    };

    let inst = accessed.common.instruction;
    let sources = WriteBackSources {
        pc_plus_length: accessed.pc_plus_instruction_length,
        memory_result: accessed.memory_result,
        alu_result: accessed.alu_result,
        imm: accessed.imm,
    };
    stages_simple::write_back(&inst, accessed.write_register, &sources, state);

    Ok(PipelineRegister::Writeback(WritebackRegister {
        common: Common::new(inst, accessed.common.address_of_instruction),
        write_register: accessed.write_register,
        write_data: sources.select(inst.controls.wb_src),
    }))
}
