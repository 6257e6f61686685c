//! ftrs entry point.

mod cli;
mod failure_log;
mod render;
mod settings;

use std::future::Future;
use std::io;
use std::process::ExitCode;

use clap::Parser;
use ftrs_data_channel::{ErrorKind, ReceiveServer, Source, TransferError, send_file};
use ftrs_transfer::format_with_commas;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ReceiveArgs, SendArgs};
use failure_log::FailureLog;
use settings::Settings;

/// Exit status after a second interrupt (128 + SIGINT).
const FORCED_EXIT: i32 = 130;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Progress redraws on stderr, so logs share that stream.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    let kernel = ftrs_zerocopy::kernel();
    if !kernel.supports_send_file() || !kernel.supports_splice() {
        warn!(
            platform = kernel.name(),
            "zero-copy transfers unavailable, using buffered copies"
        );
    }

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Command::Send(args) => rt.block_on(send(args, &settings)),
        Command::Receive(args) => rt.block_on(receive(args, &settings)),
    }
}

async fn send(args: SendArgs, settings: &Settings) -> anyhow::Result<ExitCode> {
    let config = settings.send_config(&args)?;

    match send_file(&config, Some(render::progress_printer())).await {
        Ok(report) => {
            info!(
                name = %report.name,
                bytes = %format_with_commas(report.bytes),
                strategy = %report.strategy,
                "file sent successfully"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            report_send_error(&e);
            if e.is_failure_logged() {
                let log = FailureLog::new(settings.failure_log());
                let path = match &config.source {
                    Source::File(path) => path.clone(),
                    Source::Zero { .. } => args.file.clone(),
                };
                if let Err(log_err) = log.append(&path, &e.to_string()) {
                    warn!(
                        log = %log.path().display(),
                        error = %log_err,
                        "failed to write failure log"
                    );
                }
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report_send_error(e: &TransferError) {
    let what = match e.kind() {
        ErrorKind::Setup => "configuration error",
        ErrorKind::Connect => "network error",
        ErrorKind::File => "file error",
        ErrorKind::ConnectionLost => "connection lost",
        ErrorKind::DeviceIo => "device I/O error",
        ErrorKind::Protocol | ErrorKind::Integrity | ErrorKind::Transfer | ErrorKind::Advisory => {
            "transfer error"
        }
    };
    error!(kind = %e.kind(), "{what}: {e}");
}

async fn receive(args: ReceiveArgs, settings: &Settings) -> anyhow::Result<ExitCode> {
    let config = settings.receive_config(&args);
    let addr = settings.addr(args.addr.as_deref());
    let listener = ReceiveServer::bind(&addr).await?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, shutdown).await {
            std::process::exit(FORCED_EXIT);
        }
    });

    let server = ReceiveServer::new(config).with_progress(render::progress_printer());
    let stats = server.serve(listener, cancel).await;

    info!(
        files = stats.files(),
        bytes = %format_with_commas(stats.bytes()),
        "receiver stopped"
    );
    Ok(ExitCode::SUCCESS)
}

/// Cancels `cancel` on the first interrupt and returns `true` on the second.
///
/// A transfer in progress only observes cancellation once it ends, so the
/// second interrupt is the caller's cue to exit immediately. Returns `false`
/// if the signal source fails.
async fn watch_interrupts<F, Fut>(mut interrupt: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if let Err(e) = interrupt().await {
        warn!(error = %e, "failed to listen for interrupts");
        return false;
    }
    info!("interrupt received, stopping after the current transfer (interrupt again to abort)");
    cancel.cancel();

    if interrupt().await.is_err() {
        return false;
    }
    warn!("second interrupt, aborting");
    true
}
