//! fwdd entry point.
//!
//! Loads a YAML scenario, provisions its context, injects its packets and
//! prints one verdict per packet followed by the final table contents.

use clap::Parser;
use fwd_engine::{Engine, Scenario};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;

/// Software forwarding dataplane
#[derive(Parser, Debug)]
#[command(name = "fwdd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file (YAML)
    #[arg(short = 'c', long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Context name, overriding the one in the scenario
    #[arg(long)]
    context: Option<String>,

    /// Keep the context alive after the last packet until Ctrl-C
    #[arg(long)]
    hold: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let mut scenario = match Scenario::load(&args.config) {
        Ok(scenario) => scenario,
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        }
    };
    if let Some(context) = args.context {
        scenario.context = context;
    }
    info!(
        "loaded {} ({} tables, {} packets)",
        args.config.display(),
        scenario.tables.len(),
        scenario.packets.len()
    );

    let engine = Engine::standard();
    let code = match run(&engine, &scenario, args.hold).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    };
    engine.shutdown().await;
    info!("fwdd shutdown complete");
    code
}

async fn run(engine: &Engine, scenario: &Scenario, hold: bool) -> fwd_engine::EngineResult<()> {
    scenario.apply(engine)?;
    for result in scenario.run(engine).await? {
        println!("packet {} ({}): {}", result.index, result.table, result.verdict);
    }
    for table in &scenario.tables {
        println!("table {}:", table.id);
        for entry in engine.entries(&scenario.context, &table.id)? {
            println!("  {}", entry);
        }
    }

    if hold {
        info!("holding context {}; press Ctrl-C to exit", scenario.context);
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", err);
        } else {
            warn!("received SIGINT, shutting down");
        }
    }
    Ok(())
}
