mod common;

use common::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;
use sim_lib::config::{PipelineMode, SimulatorConfig};
use sim_lib::error::{ExecutionError, MemoryError, SimulatorError};
use sim_lib::instruction::Function;
use sim_lib::memory::cache::CacheConfig;
use sim_lib::memory::main_memory::AddressRange;
use sim_lib::memory::{MemorySystem, WritePolicy};
use sim_lib::pipelined::branch_predictor::PredictorHeuristic;
use sim_lib::pipelined::Pipeline;
use sim_lib::program::ProgramBuilder;
use sim_lib::system_call;

#[rstest]
#[case::single_stage("single-stage")]
#[case::five_stage("five-stage")]
#[case::no_hazard_detection("five-stage-no-hazard-detection")]
#[case::write_through("write-through-cache")]
#[case::write_back("write-back-cache")]
fn fibonacci_of_ten(#[case] name: &str) {
    let config = config(name);
    let program = fibonacci(10, padding_for(&config));
    let pipeline = run(&program, config);
    assert_eq!(pipeline.state().registers.read(A0), 55, "{}", name);
    assert!(pipeline.is_done());
    assert_eq!(pipeline.state().registers.read(SP), SimulatorConfig::default().stack_pointer);
}

#[test]
fn fibonacci_counters_agree_across_stage_counts() {
    let single = run(&fibonacci(6, 0), config("single-stage"));
    let five = run(&fibonacci(6, 0), config("five-stage"));
    let (single, five) = (single.performance_metrics(), five.performance_metrics());
    assert_eq!(single.instruction_count, five.instruction_count);
    assert_eq!(single.branch_count, five.branch_count);
    assert_eq!(single.procedure_count, five.procedure_count);
    assert_eq!(single.cycles, single.instruction_count);
    assert!(five.cycles > five.instruction_count);
}

#[test]
fn raw_hazard_matches_single_stage() {
    let mut builder = ProgramBuilder::new();
    builder
        .push(Function::ADDI, 2, ZERO, 0, 7)
        .push(Function::ADDI, 3, ZERO, 0, 5)
        .push(Function::ADDI, 5, ZERO, 0, 3)
        .push(Function::ADD, 1, 2, 3, 0)
        .push(Function::SLL, 4, 1, 5, 0);
    let program = builder.build().unwrap();

    let five = run(&program, config("five-stage"));
    let single = run(&program, config("single-stage"));
    assert_eq!(five.state().registers.read(4), 96);
    assert_eq!(five.state().registers, single.state().registers);
    assert!(five.performance_metrics().stalls > 0);
}

#[test]
fn taken_branch_flushes_once() {
    let mut builder = ProgramBuilder::new();
    builder
        .push(Function::ADDI, T0, ZERO, 0, 1)
        .branch(Function::BEQ, T0, T0, "target")
        .push(Function::ADDI, T1, ZERO, 0, 1)
        .label("target")
        .push(Function::ADDI, T2, ZERO, 0, 1);
    let pipeline = run(&builder.build().unwrap(), config("five-stage"));

    let metrics = pipeline.performance_metrics();
    assert_eq!(metrics.flushes, 1);
    assert_eq!(metrics.stalls, 2);
    assert_eq!(metrics.branch_count, 1);
    assert_eq!(metrics.instruction_count, 3);
    assert_eq!(pipeline.state().registers.read(T1), 0);
    assert_eq!(pipeline.state().registers.read(T2), 1);
}

#[rstest]
#[case(PredictorHeuristic::AlwaysNotTaken, 9)]
#[case(PredictorHeuristic::BufferedPrediction, 2)]
fn loop_flushes_depend_on_predictor(#[case] heuristic: PredictorHeuristic, #[case] flushes: u64) {
    let mut builder = ProgramBuilder::new();
    builder
        .push(Function::ADDI, T0, ZERO, 0, 0)
        .push(Function::ADDI, T1, ZERO, 0, 10)
        .label("loop")
        .push(Function::ADDI, T0, T0, 0, 1)
        .branch(Function::BNE, T0, T1, "loop");
    let config = SimulatorConfig { branch_prediction: heuristic, ..Default::default() };
    let pipeline = run(&builder.build().unwrap(), config);

    let metrics = pipeline.performance_metrics();
    assert_eq!(pipeline.state().registers.read(T0), 10);
    assert_eq!(metrics.branch_count, 9);
    assert_eq!(metrics.flushes, flushes);
    assert_eq!(metrics.instruction_count, 22);
}

#[test]
fn stepping_terminates_without_skipping() {
    let mut builder = ProgramBuilder::new();
    for value in 1..=6 {
        builder.push(Function::ADDI, value as u32, ZERO, 0, value);
    }
    let mut pipeline = Pipeline::new(SimulatorConfig::default()).unwrap();
    pipeline.load_program(&builder.build().unwrap()).unwrap();

    let mut cycles = 0;
    while pipeline.step().unwrap() {
        cycles += 1;
        assert!(pipeline.performance_metrics().instruction_count <= 6);
        assert!(cycles < 100);
    }
    assert!(pipeline.is_done());
    assert_eq!(pipeline.performance_metrics().instruction_count, 6);
    assert_eq!(pipeline.performance_metrics().cycles, 10);
    for register in 1..=6 {
        assert_eq!(pipeline.state().registers.read(register), register);
    }
}

#[test]
fn memory_errors_name_the_instruction() {
    let mut builder = ProgramBuilder::new();
    builder
        .push(Function::LUI, T0, ZERO, 0, 2)
        .push(Function::LW, T1, T0, 0, 0);
    let config = SimulatorConfig {
        data_memory: AddressRange::new(0, 0x1000),
        ..Default::default()
    };
    let mut pipeline = Pipeline::new(config).unwrap();
    pipeline.load_program(&builder.build().unwrap()).unwrap();

    match pipeline.run() {
        Err(SimulatorError::Execution(ExecutionError::InstructionExecution {
            address,
            instruction,
            source,
        })) => {
            assert_eq!(address, Some(4));
            assert_eq!(instruction, "lw t1, 0(t0)");
            assert!(matches!(
                *source,
                SimulatorError::Memory(MemoryError::AddressOutOfRange { address: 0x2000, .. })
            ));
        }
        other => panic!("unexpected result {:?}", other.err()),
    }
}

#[rstest]
#[case::single_stage("single-stage")]
#[case::five_stage("five-stage")]
fn csr_and_console_output(#[case] name: &str) {
    let mut builder = ProgramBuilder::new();
    builder
        .push(Function::ADDI, T0, ZERO, 0, 42)
        .push(Function::CSRRW, ZERO, T0, 0, sim_lib::csr::MSCRATCH as i32)
        .push(Function::CSRRS, A0, ZERO, 0, sim_lib::csr::MSCRATCH as i32)
        .push(Function::ADDI, A7, ZERO, 0, system_call::PRINT_INT as i32)
        .push(Function::ECALL, 0, 0, 0, 0)
        .push(Function::CSRRS, T1, ZERO, 0, sim_lib::csr::CYCLE as i32)
        .push(Function::ADDI, A7, ZERO, 0, system_call::EXIT_WITH_CODE as i32)
        .push(Function::ADDI, A0, ZERO, 0, 3)
        .push(Function::ECALL, 0, 0, 0, 0)
        .push(Function::ADDI, T2, ZERO, 0, 1);
    let pipeline = run(&builder.build().unwrap(), config(name));

    let state = pipeline.state();
    assert_eq!(state.output, "42");
    assert_eq!(state.exit_code, Some(3));
    assert!(state.registers.read(T1) > 0);
    // nothing after the exit call retires
    assert_eq!(state.registers.read(T2), 0);
    assert_eq!(state.performance_metrics.instruction_count, 9);
}

#[test]
fn ebreak_is_not_implemented() {
    let mut builder = ProgramBuilder::new();
    builder.push(Function::EBREAK, 0, 0, 0, 0);
    let mut pipeline = Pipeline::new(SimulatorConfig::default()).unwrap();
    pipeline.load_program(&builder.build().unwrap()).unwrap();
    let error = pipeline.run().unwrap_err();
    assert!(error.to_string().contains("ebreak"), "{}", error);
}

#[rstest]
#[case::single_stage(PipelineMode::SingleStage)]
#[case::five_stage(PipelineMode::FiveStage)]
fn store_byte_survives_write_back_eviction(#[case] pipeline_mode: PipelineMode) {
    // one-way, two sets of 16-byte blocks: 0x1000 and 0x1020 collide
    let cache = CacheConfig { index_bits: 1, block_bits: 2, associativity: 1, ..Default::default() };
    let config = SimulatorConfig {
        pipeline_mode,
        data_cache: Some(cache),
        write_policy: WritePolicy::WriteBack,
        ..Default::default()
    };
    let mut builder = ProgramBuilder::new();
    builder
        .push(Function::LUI, RA, ZERO, 0, 1)
        .push(Function::ADDI, SP, ZERO, 0, 0x5a)
        .push(Function::SB, 0, RA, SP, 0)
        .push(Function::LW, T0, RA, 0, 0x20)
        .push(Function::LW, 3, RA, 0, 0);
    let pipeline = run(&builder.build().unwrap(), config);

    let state = pipeline.state();
    assert_eq!(state.registers.read(3), 0x5a);
    assert_eq!(state.data_memory.backing_memory().read_byte(0x1000).unwrap(), 0x5a);
    let statistics = state.data_memory.statistics().unwrap();
    assert_eq!(statistics.accesses, 3);
    assert_eq!(statistics.hits, 0);
}

#[test]
fn write_through_keeps_memory_current() {
    let mut builder = ProgramBuilder::new();
    builder
        .push(Function::ADDI, T0, ZERO, 0, 0x123)
        .push(Function::SW, 0, ZERO, T0, 0x100)
        .push(Function::LW, T1, ZERO, 0, 0x100);
    let pipeline = run(&builder.build().unwrap(), config("write-through-cache"));
    let state = pipeline.state();
    assert_eq!(state.registers.read(T1), 0x123);
    assert_eq!(state.data_memory.backing_memory().read_word(0x100).unwrap(), 0x123);
}

#[rstest]
#[case::default_order(vec![0, 4, 1, 2, 3])]
#[case::sequential(vec![0, 1, 2, 3, 4])]
#[case::reversed(vec![0, 4, 3, 2, 1])]
#[case::writeback_last(vec![0, 3, 2, 1, 4])]
#[case::interleaved(vec![0, 2, 4, 1, 3])]
fn every_ordering_matches_single_stage(#[case] execution_ordering: Vec<usize>) {
    let ordered = SimulatorConfig { execution_ordering, ..Default::default() };

    // x1 is three instructions ahead of its use: it sits between MA and WB
    let mut builder = ProgramBuilder::new();
    builder
        .push(Function::ADDI, 1, ZERO, 0, 5)
        .push(Function::ADDI, 2, ZERO, 0, 0)
        .push(Function::ADDI, 3, ZERO, 0, 0)
        .push(Function::ADD, 4, 1, 1, 0)
        .push(Function::LW, 5, ZERO, 0, 0x100)
        .push(Function::SUB, 6, 5, 4, 0)
        .push(Function::SW, 0, ZERO, 6, 0x104)
        .push(Function::LW, 7, ZERO, 0, 0x104)
        .data_words(0x100, &[32]);
    let program = builder.build().unwrap();

    let single = run(&program, config("single-stage"));
    let pipelined = run(&program, ordered.clone());
    assert_eq!(pipelined.state().registers.read(4), 10);
    assert_eq!(pipelined.state().registers.read(7), 22);
    assert_eq!(pipelined.state().registers, single.state().registers);
    assert_eq!(
        pipelined.performance_metrics().instruction_count,
        single.performance_metrics().instruction_count
    );

    let pipelined = run(&fibonacci(7, 0), ordered);
    assert_eq!(pipelined.state().registers.read(A0), 13);
    assert_eq!(pipelined.state().registers.read(SP), SimulatorConfig::default().stack_pointer);
}

fn alu_function() -> impl Strategy<Value = Function> {
    prop_oneof![
        Just(Function::ADD),
        Just(Function::SUB),
        Just(Function::XOR),
        Just(Function::SLL),
        Just(Function::MUL),
        Just(Function::DIVU),
        Just(Function::SLTU),
    ]
}

#[derive(Clone, Debug)]
enum Step {
    Immediate(u32, i32),
    Alu(Function, u32, u32, u32),
    Store(u32, i32),
    Load(u32, i32),
}

fn step() -> impl Strategy<Value = Step> {
    let register = 1u32..8;
    prop_oneof![
        (register.clone(), -2048i32..2048).prop_map(|(rd, imm)| Step::Immediate(rd, imm)),
        (alu_function(), register.clone(), register.clone(), register.clone())
            .prop_map(|(function, rd, rs1, rs2)| Step::Alu(function, rd, rs1, rs2)),
        (register.clone(), 0i32..4).prop_map(|(rs2, slot)| Step::Store(rs2, 0x100 + 4 * slot)),
        (register, 0i32..4).prop_map(|(rd, slot)| Step::Load(rd, 0x100 + 4 * slot)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pipelining_preserves_results(steps in prop::collection::vec(step(), 1..24)) {
        let build = |padding| {
            let mut builder = ProgramBuilder::new();
            builder.padding(padding);
            for step in &steps {
                match *step {
                    Step::Immediate(rd, imm) => builder.push(Function::ADDI, rd, ZERO, 0, imm),
                    Step::Alu(function, rd, rs1, rs2) => builder.push(function, rd, rs1, rs2, 0),
                    Step::Store(rs2, address) => builder.push(Function::SW, 0, ZERO, rs2, address),
                    Step::Load(rd, address) => builder.push(Function::LW, rd, ZERO, 0, address),
                };
            }
            builder.build().unwrap()
        };

        let reference = run(&build(0), config("single-stage"));
        for name in ["five-stage", "write-through-cache", "write-back-cache"] {
            let pipeline = run(&build(0), config(name));
            prop_assert_eq!(pipeline.state().registers, reference.state().registers);
            prop_assert_eq!(
                pipeline.performance_metrics().instruction_count,
                steps.len() as u64
            );
        }
        let unchecked = run(&build(2), config("five-stage-no-hazard-detection"));
        prop_assert_eq!(unchecked.state().registers, reference.state().registers);
    }
}
