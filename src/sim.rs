use std::error::Error;
use std::process;

use log::LevelFilter;
use sim_lib::flags::RvSimArgs;
use sim_lib::loader;
use sim_lib::pipelined::Pipeline;
use sim_lib::run_wrapper::RunReport;

fn main() {
    let args = RvSimArgs::from_env_or_exit();

    let default_level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: &RvSimArgs) -> Result<(), Box<dyn Error>> {
    let config = args.config()?;
    let mut pipeline = Pipeline::new(config)?;
    loader::load_elf(&mut pipeline, &args.elf_file)?;

    let result = pipeline.run();
    let report = RunReport::from_pipeline(&pipeline);
    print!("{}", report.output);
    if !report.output.is_empty() && !report.output.ends_with('\n') {
        println!();
    }

    if args.history {
        eprintln!("[HISTORY]\n{}", report);
        eprintln!("{}", report.registers.dump(pipeline.config().register_names));
    }
    result?;

    if let Some(code) = report.exit_code {
        process::exit(code as i32);
    }
    Ok(())
}
