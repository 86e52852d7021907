use clap::Parser;
use dotenv::dotenv;
use tracing::error;

use rust_fx::app::bootstrap::{self, RunOptions};
use rust_fx::app_config::log::setup_logging;

/// Real-time FX confluence trading engine
#[derive(Parser, Debug)]
#[command(name = "rust_fx", version, about)]
struct Cli {
    /// Instruments to trade, comma separated (overrides INSTRUMENTS)
    #[arg(short, long, value_delimiter = ',')]
    instruments: Option<Vec<String>>,

    /// Trade log CSV path (overrides TRADE_LOG_PATH)
    #[arg(long)]
    trade_log: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    setup_logging()?;

    let cli = Cli::parse();
    let options = RunOptions {
        instruments: cli.instruments,
        trade_log: cli.trade_log,
    };

    if let Err(e) = bootstrap::run(options).await {
        error!("engine exited with error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
