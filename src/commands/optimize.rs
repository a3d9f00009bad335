//! Optimize command implementation with progress tracking and CLI sweep overrides

use anyhow::{Context, Result};
use grid_trading::optimizer::{OptimizationResult, Optimizer, SORT_KEYS};
use grid_trading::{data, sweep, Config};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

pub fn run(
    config_path: String,
    sort_by: String,
    top: usize,
    overrides: Vec<String>,
    sequential: bool,
) -> Result<()> {
    info!("Starting optimization");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);
    config.validate().context("Invalid configuration")?;

    if !SORT_KEYS.contains(&sort_by.as_str()) {
        warn!(sort_by = %sort_by, "Unknown sort metric, falling back to sharpe");
    }

    sweep::apply_overrides(&mut config, &overrides);
    let configs = sweep::generate_sweep_configs(&config);
    let total = sweep::total_combinations(&config);
    info!("Generated {} parameter combinations", total);

    let file_name = config
        .backtest
        .data_file_name()
        .context("Config needs backtest.data_file or backtest.symbol")?;
    let candles = data::load_range(
        &config.backtest.data_dir,
        &file_name,
        config.backtest.start_date()?,
        config.backtest.end_date()?,
    )?;
    if candles.is_empty() {
        anyhow::bail!("No price data in {} for the requested range", file_name);
    }

    let swept: Vec<&String> = config
        .sweep
        .as_ref()
        .map(|s| s.keys().collect())
        .unwrap_or_default();

    println!("\n{}", "=".repeat(70));
    println!("OPTIMIZATION SUMMARY");
    println!("{}", "=".repeat(70));
    println!("  Data:          {} ({} bars)", file_name, candles.len());
    println!("  Swept params:  {:?}", swept);
    println!("  Combinations:  {}", total);
    println!("  Mode:          {}", if sequential { "sequential" } else { "parallel" });
    println!("{}\n", "=".repeat(70));

    let pb = ProgressBar::new(configs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}]")
            .context("Invalid progress bar template")?
            .progress_chars("█░ "),
    );

    let optimizer = Optimizer::new(candles);
    let mut results = if sequential {
        optimizer.optimize_sequential(&configs, Some(&pb))
    } else {
        optimizer.optimize(&configs, Some(&pb))
    };
    pb.finish();
    println!();

    if results.is_empty() {
        info!("No valid results found.");
        println!("No valid parameter combinations.");
        return Ok(());
    }

    Optimizer::sort_results(&mut results, &sort_by);
    info!("Total results: {}, sorted by: {}", results.len(), sort_by);

    print_results(&results, &sort_by, top);

    info!("Optimization completed successfully");

    Ok(())
}

fn print_results(results: &[OptimizationResult], sort_by: &str, top: usize) {
    let display_count = top.min(results.len());

    println!("\n{}", "=".repeat(110));
    println!("TOP {} OPTIMIZATION RESULTS (sorted by {})", display_count, sort_by);
    println!("{}", "=".repeat(110));
    println!(
        "{:<4} {:>7} {:>9} {:>8} {:>8} {:>6} {:>6} {:>10} | Parameters",
        "Rank", "Sharpe", "Return%", "MaxDD%", "WinR%", "Trades", "SQN", "Commission"
    );
    println!("{}", "-".repeat(110));

    for (i, result) in results.iter().take(display_count).enumerate() {
        println!(
            "{:<4} {:>7.2} {:>9.2} {:>8.2} {:>8.2} {:>6} {:>6.2} {:>10.2} | {}",
            i + 1,
            result.sharpe_ratio,
            result.total_return * 100.0,
            result.max_drawdown * 100.0,
            result.win_rate * 100.0,
            result.total_trades,
            result.sqn,
            result.total_commission,
            sweep::format_params(&result.params)
        );
    }
    println!("{}", "=".repeat(110));
}
