use anyhow::Context;
use clap::Parser;
use movescount_client::http_client::ReqwestMovescountClient;
use movescount_client::{ActivityStore, Endpoints, Paths, Session, SyncEngine};

mod cli;
mod configure;

use crate::cli::Cli;
use crate::configure::{TerminalPrompt, configure};

/// Filter used with `--debug`: everything at debug, the HTTP stack at trace.
const DEBUG_FILTER: &str = "debug,reqwest=trace,hyper_util=trace";

/// Pick the log filter: `--debug` wins, then `MOVESCOUNT_SYNC_LOG_LEVEL`,
/// then `RUST_LOG`, then `info`.
fn log_filter<F>(debug: bool, mut get: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    if debug {
        return DEBUG_FILTER.to_string();
    }
    get("MOVESCOUNT_SYNC_LOG_LEVEL")
        .or_else(|| get("RUST_LOG"))
        .unwrap_or_else(|| "info".to_string())
}

fn init_logging(debug: bool) {
    let filter = log_filter(debug, |k| std::env::var(k).ok());
    let env_filter = tracing_subscriber::EnvFilter::try_new(&filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(debug)
        .with_env_filter(env_filter)
        .init();
    tracing::debug!("movescount-sync: log filter: {}", filter);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.debug);

    let paths = Paths::from_env()?;
    let config = configure(&paths, args.configure, &mut TerminalPrompt)?;

    let session = Session::load(&paths.session_file);
    let client = ReqwestMovescountClient::new(Endpoints::default(), session)
        .context("building HTTP client")?;
    let store = ActivityStore::new(&config.data_dir, config.formats.clone());
    let engine = SyncEngine::new(client, config.credentials(), store, &paths.session_file);

    let report = engine.run(args.recursive).await.inspect_err(|e| {
        tracing::error!("sync failed: {}", e);
    })?;

    println!(
        "Synced {} feed entries ({} skipped), wrote {} files.",
        report.activities, report.skipped_events, report.files_written
    );
    println!("All done.");
    Ok(())
}
