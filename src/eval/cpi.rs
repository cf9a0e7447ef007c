use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use sim_lib::run_wrapper::{run, standard_configurations};

const OUTPUT_PATH: &str = "eval/sim_eval.csv";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let programs: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if programs.is_empty() {
        eprintln!("Usage: sim-eval <elf>...");
        process::exit(2);
    }

    if let Err(e) = run_eval(&programs) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_eval(programs: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = Path::new(OUTPUT_PATH).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(OUTPUT_PATH)
        .map_err(|e| format!("Failed to create CSV file '{}': {}", OUTPUT_PATH, e))?;

    writer.write_record([
        "Program",
        "Configuration",
        "Instructions",
        "Cycles",
        "CPI",
        "Taken branches",
        "Jumps",
        "Flushes",
        "Stalls",
        "Data cache hit rate",
        "Exit code",
    ])?;

    for program in programs {
        let name = program.display().to_string();
        for (configuration, config) in standard_configurations() {
            eprintln!("Running program: {} ({})", name, configuration);

            match run(program, config) {
                Ok(report) => {
                    let metrics = report.metrics;
                    writer.write_record([
                        name.as_str(),
                        configuration,
                        &metrics.instruction_count.to_string(),
                        &metrics.cycles.to_string(),
                        &format!("{:.3}", metrics.cpi()),
                        &metrics.branch_count.to_string(),
                        &metrics.procedure_count.to_string(),
                        &metrics.flushes.to_string(),
                        &metrics.stalls.to_string(),
                        &report
                            .data_cache
                            .map(|statistics| format!("{:.3}", statistics.hit_rate()))
                            .unwrap_or_default(),
                        &report.exit_code.map(|code| code.to_string()).unwrap_or_default(),
                    ])?;
                }
                Err(e) => {
                    eprintln!("Warning: Failed to run program '{}': {}", name, e);
                    let mut record = vec![name.as_str(), configuration];
                    record.extend(["Error"; 9]);
                    writer.write_record(record)?;
                }
            }
        }
    }

    writer.flush()?;
    Ok(())
}
