use anyhow::{Context, Result};
use tracing::{error, info};

use vuln_ingestor::config::{Command, Config, Mode};
use vuln_ingestor::health::Readiness;
use vuln_ingestor::ingest::{GitFetcher, IngestRequest, Orchestrator};
use vuln_ingestor::storage::Database;
use vuln_ingestor::{logging, server};

const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

const BUILD_DATE: &str = match option_env!("VERGEN_BUILD_TIMESTAMP") {
    Some(date) => date,
    None => "unknown",
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args();

    // Handle version subcommand
    if let Some(Command::Version) = &config.command {
        println!(
            "vuln-ingestor {}, commit: {}, build_date: {}",
            env!("CARGO_PKG_VERSION"),
            GIT_SHA,
            BUILD_DATE,
        );
        return Ok(());
    }

    logging::init(&config.log_format, &config.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = GIT_SHA,
        build_date = BUILD_DATE,
        mode = %config.mode,
        "vuln-ingestor starting"
    );

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration validation failed");
        std::process::exit(1);
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut app = tokio::spawn(run_mode(config, shutdown_rx));

    // On Ctrl-C the mode keeps running until it has drained
    let joined = tokio::select! {
        joined = &mut app => joined,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            app.await
        }
    };

    let result = joined
        .context("Application task failed")
        .and_then(|result| result);

    if let Err(e) = result {
        error!(error = %e, "Application error");
        std::process::exit(1);
    }

    info!("Shutdown complete");
    Ok(())
}

async fn run_mode(config: Config, shutdown_rx: tokio::sync::watch::Receiver<bool>) -> Result<()> {
    match config.mode {
        Mode::Server => {
            info!(
                port = config.server_port,
                storage_path = %config.storage_path,
                "Running in server mode"
            );
            server::run(config, Readiness::new(), shutdown_rx).await
        }
        Mode::Ingest => {
            info!(
                repo = %config.get_repo_url(),
                files = ?config.files,
                "Running in ingest mode"
            );
            run_ingest(config).await
        }
    }
}

async fn run_ingest(config: Config) -> Result<()> {
    let db = Database::new(&config.get_db_path())?;
    let fetcher = GitFetcher::new(config.fetch_retry_attempts, config.fetch_retry_delay_secs);
    let orchestrator = Orchestrator::new(db, fetcher, &config.ingest_settings());

    let request = IngestRequest {
        repo: config.get_repo_url().to_string(),
        files: config.files.clone(),
    };

    let report = orchestrator
        .run(&request)
        .await
        .context("Ingestion run failed")?;

    info!(
        files_selected = report.files_selected,
        files_failed = report.files_failed,
        scans_inserted = report.summary.scans_inserted,
        vulnerabilities_inserted = report.summary.vulnerabilities_inserted,
        risk_factors_inserted = report.summary.risk_factors_inserted,
        duration_ms = report.duration_ms,
        "Ingest mode finished"
    );

    Ok(())
}
