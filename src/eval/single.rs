use std::error::Error;
use std::path::Path;

use plotters::prelude::*;
use sim_lib::config::SimulatorConfig;
use sim_lib::memory::cache::CacheConfig;
use sim_lib::memory::replacement::ReplacementPolicy;
use sim_lib::run_wrapper::run;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let param_tokens: Vec<String> = std::env::args().collect();
    let elf_path = param_tokens.get(1).ok_or("You should specify exactly one ELF file")?;

    // Plot line series for each cache size
    // For a fixed cache size, vary the block size
    // Performance metric: data cache hit rate
    // Cache sizes: 256B, 1KB, 4KB, 16KB
    let cache_sizes = vec![256, 1024, 4 * 1024, 16 * 1024];
    // Block sizes: 4B, 8B, 16B, 32B, 64B
    let block_sizes = vec![4, 8, 16, 32, 64];

    let mut data: Vec<Vec<(u32, f64)>> = vec![vec![]; cache_sizes.len()];
    for (i, cache_size) in cache_sizes.iter().enumerate() {
        for block_size in block_sizes.iter() {
            let cache = CacheConfig::from_sizes(*cache_size, *block_size, 2, ReplacementPolicy::Lru)?;
            let config = SimulatorConfig { data_cache: Some(cache), ..Default::default() };
            let report = run(Path::new(elf_path), config)?;
            let hit_rate = report.data_cache.map(|statistics| statistics.hit_rate()).unwrap_or(0.0);
            eprintln!(
                "cache size = {}, block size = {}: hit rate = {:.3}",
                cache_size, block_size, hit_rate
            );
            data[i].push((*block_size, hit_rate));
        }
    }

    let trace_base_name = Path::new(elf_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| elf_path.clone());
    let plot_title = format!("Data cache hit rate: {}", trace_base_name);
    std::fs::create_dir_all("eval")?;
    let output_path = format!("eval/single_eval_{}.svg", trace_base_name);

    let root = SVGBackend::new(output_path.as_str(), (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut ctx = ChartBuilder::on(&root)
        .caption(plot_title.as_str(), ("sans-serif", 40).into_font())
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(4u32..64u32, 0.0..1.0)?;
    ctx.configure_mesh().x_desc("Block size").y_desc("Hit rate").draw()?;

    for (i, cache_size) in cache_sizes.iter().enumerate() {
        let series = data[i].iter().copied();
        let label = format!("Cache size = {}", cache_size);
        let color = Palette99::pick(i).to_rgba();
        ctx.draw_series(LineSeries::new(series, color))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    ctx.configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;

    eprintln!("Plot written to {}", output_path);
    Ok(())
}
