use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use magi::config::{apply_overrides, load_config};
use magi::evaluate::evaluate_pending;
use magi::maintenance::{backfill_atr, reevaluate_all};
use magi::models::{MagiConfig, ProviderKind, TradeMode};
use magi::session::{report_startup_failure, run_session};
use magi::surge::scan_watchlist;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "magi", about = "Multi-vendor LLM trading agents")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/magi.toml")]
    config: String,

    /// LLM vendor, overriding the config file
    #[arg(long, global = true, env = "MAGI_PROVIDER")]
    provider: Option<ProviderKind>,

    /// paper or live, overriding the config file
    #[arg(long, global = true, env = "MAGI_TRADE_MODE")]
    mode: Option<TradeMode>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one trading session for the configured provider
    Run {
        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Check the watchlist for large moves and notify
    Surge {
        /// Alert threshold in percent, overriding the config file
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Score aged trades against the current price
    Evaluate {
        /// Rescore every evaluated trade with the configured multipliers
        #[arg(long)]
        all: bool,
    },
    /// Compute ATR for trades recorded without one
    BackfillAtr {
        /// Most trades to process, newest first
        #[arg(long, default_value_t = 500)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Missing .env is fine; real deployments set the environment directly.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "magi failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let mut config: MagiConfig = load_config(&cli.config)?;
    apply_overrides(&mut config, cli.provider, cli.mode);

    match cli.command {
        Command::Run { pretty } => run(&config, pretty).await,
        Command::Surge { threshold } => surge(&config, threshold).await,
        Command::Evaluate { all: false } => evaluate(&config).await,
        Command::Evaluate { all: true } => reevaluate(&config),
        Command::BackfillAtr { limit } => backfill(&config, limit).await,
    }
}

async fn run(config: &MagiConfig, pretty: bool) -> Result<ExitCode> {
    let deps = match magi::build_session_deps(config) {
        Ok(deps) => deps,
        Err(e) => {
            let notifier = magi::build_notifier(config);
            let kind = config.provider.kind;
            return Err(report_startup_failure(notifier.as_ref(), kind, config.trading.mode, e).await);
        }
    };
    let report = run_session(config, deps).await?;

    let summary = serde_json::json!({
        "session_id": report.session.id,
        "provider": report.session.provider_id,
        "mode": report.session.trade_mode,
        "outcome": format!("{:?}", report.outcome.state()),
        "turns": report.turns,
        "trades": report.trades,
        "input_units": report.usage.input_units,
        "output_units": report.usage.output_units,
        "cost_usd": report.cost_usd,
        "starting_equity_share": report.session.starting_equity_share,
        "ending_equity_share": report.session.ending_equity_share,
    });
    let output = if pretty {
        serde_json::to_string_pretty(&summary)?
    } else {
        serde_json::to_string(&summary)?
    };
    println!("{output}");

    Ok(if report.outcome.is_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn surge(config: &MagiConfig, threshold: Option<f64>) -> Result<ExitCode> {
    let broker = magi::build_brokerage(config).context("Failed to build brokerage client")?;
    let notifier = magi::build_notifier(config);
    let threshold = threshold.unwrap_or(config.evaluation.surge_threshold_pct);

    let report = scan_watchlist(&broker, notifier.as_ref(), &config.trading.watchlist, threshold).await;
    tracing::info!(
        scanned = report.scanned,
        skipped = report.skipped,
        alerts = report.alerts.len(),
        notified = report.notified,
        "Surge scan complete"
    );
    println!("{}", serde_json::to_string(&report.alerts)?);
    Ok(ExitCode::SUCCESS)
}

async fn evaluate(config: &MagiConfig) -> Result<ExitCode> {
    let broker = magi::build_brokerage(config).context("Failed to build brokerage client")?;
    let store = magi::open_store(config)?;

    let summary = evaluate_pending(&store, &broker, &config.evaluation, Utc::now())
        .await
        .context("Evaluation failed")?;
    tracing::info!(
        pending = summary.pending,
        evaluated = summary.evaluated(),
        skipped = summary.skipped,
        "Evaluation complete"
    );
    println!("{}", serde_json::to_string(&summary)?);
    Ok(ExitCode::SUCCESS)
}

fn reevaluate(config: &MagiConfig) -> Result<ExitCode> {
    let store = magi::open_store(config)?;
    let summary = reevaluate_all(&store, &config.evaluation).context("Re-evaluation failed")?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(ExitCode::SUCCESS)
}

async fn backfill(config: &MagiConfig, limit: usize) -> Result<ExitCode> {
    let broker = magi::build_brokerage(config).context("Failed to build brokerage client")?;
    let store = magi::open_store(config)?;

    let summary = backfill_atr(&store, &broker, limit, Utc::now())
        .await
        .context("ATR backfill failed")?;
    tracing::info!(
        candidates = summary.candidates,
        updated = summary.updated,
        skipped = summary.skipped,
        "ATR backfill complete"
    );
    println!("{}", serde_json::to_string(&summary)?);
    Ok(ExitCode::SUCCESS)
}
