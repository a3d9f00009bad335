//! Backtest command implementation

use anyhow::{Context, Result};
use grid_trading::trade_log::{self, RunSummary};
use grid_trading::{backtest::Backtester, data, strategies, Config, PeriodReturns};
use tracing::{info, warn};

pub fn run(
    config_path: String,
    strategy_override: Option<String>,
    capital_override: Option<f64>,
    start_override: Option<String>,
    end_override: Option<String>,
) -> Result<()> {
    info!("Starting backtest");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(strategy) = strategy_override {
        info!("Overriding strategy to: {}", strategy);
        config.strategy_name = strategy;
    }

    if let Some(capital) = capital_override {
        info!("Overriding initial capital to: {:.2}", capital);
        config.backtest.initial_capital = capital;
    }

    if let Some(start) = start_override {
        info!("Overriding start date to: {}", start);
        config.backtest.start = Some(start);
    }

    if let Some(end) = end_override {
        info!("Overriding end date to: {}", end);
        config.backtest.end = Some(end);
    }

    config.validate().context("Invalid configuration")?;

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

    let validation = data::validate_candles(&candles);
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    if !validation.is_valid() {
        anyhow::bail!("Price data failed validation: {}", validation.errors.join("; "));
    }

    info!("Creating strategy: {}", config.strategy_name);
    let strategy = strategies::create_strategy(&config)?;
    let strategy_name = strategy.name();

    let mut backtester = Backtester::new(config.clone(), strategy);
    info!("Running backtest...");
    let result = backtester.run(&candles)?;
    let m = &result.metrics;
    let report = &result.report;

    let symbol = &config.backtest.symbol;
    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS {} {}", symbol, config.backtest.name);
    println!("{}", "=".repeat(60));
    println!("Bars:               {}", candles.len());
    println!("Initial Capital:    {:.2}", m.initial_value);
    println!("Final Value:        {:.2}", m.final_value);
    println!("Total Return:       {:.2}%", m.total_return * 100.0);
    println!("Annual Return:      {:.2}%", m.annualized_return * 100.0);
    println!("Annual Volatility:  {:.2}%", m.annual_volatility * 100.0);
    println!("Benchmark Return:   {:.2}%", m.benchmark_return * 100.0);
    println!("Sharpe Ratio:       {:.2}", m.sharpe_ratio);
    println!("Sortino Ratio:      {:.2}", m.sortino_ratio);
    println!("Calmar Ratio:       {:.2}", m.calmar_ratio);
    println!("Omega Ratio:        {:.2}", m.omega_ratio);
    println!(
        "Max Drawdown:       {:.2}% ({} bars)",
        m.max_drawdown * 100.0,
        m.max_drawdown_duration
    );
    println!("Total Trades:       {}", m.total_trades);
    println!("Winning Trades:     {}", m.winning_trades);
    println!("Losing Trades:      {}", m.losing_trades);
    println!("Win Rate:           {:.2}%", m.win_rate * 100.0);
    println!("SQN:                {:.2} ({})", m.sqn, m.sqn_rating);
    println!("{}", "-".repeat(60));
    println!("Orders Filled:      {}", report.trades.len());
    println!("Final Position:     {}", result.final_position);
    println!("Total Commission:   {:.2}", report.total_commission);
    println!("Commission Ratio:   {:.4}%", report.commission_ratio * 100.0);
    println!(
        "Ledger Cash:        {:.2} ({})",
        report.ledger_value,
        if report.ledger_matches_cash {
            "matches broker"
        } else {
            "MISMATCH"
        }
    );
    println!("{}", "=".repeat(60));

    let period_returns = PeriodReturns::from_equity_curve(m.initial_value, &result.equity_curve);
    println!("{}", period_returns.render());

    let orders_path = trade_log::artifact_path(&config.backtest.results_dir, symbol, "orders.csv");
    trade_log::write_trade_log(&orders_path, &report.trades)?;
    info!("Trade log written to: {}", orders_path.display());

    let summary_path =
        trade_log::artifact_path(&config.backtest.results_dir, symbol, "summary.json");
    trade_log::write_summary(
        &summary_path,
        &RunSummary {
            symbol,
            name: &config.backtest.name,
            strategy: strategy_name,
            parameters: &config.strategy,
            bars: candles.len(),
            metrics: m,
            ledger_value: report.ledger_value,
            ledger_matches_cash: report.ledger_matches_cash,
        },
    )?;
    info!("Summary written to: {}", summary_path.display());

    info!("Backtest completed successfully");

    Ok(())
}
