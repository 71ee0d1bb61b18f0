use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use ghl::app::App;
use ghl::cli::{usage_outcome, Cli, LogLevel};
use ghl::ghl::error::GhlError;
use ghl::output::render_error;

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: logging disabled, cannot open {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // RUST_LOG refines the filter once logging is switched on
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(tracing_level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("ghl {} started with log level: {:?}", ghl::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = ghl::config::config_dir() {
        return config_dir.join("ghl.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".ghl").join("ghl.log");
    }
    PathBuf::from("ghl.log")
}

/// Cancel `cancel` on Ctrl-C or once `timeout_secs` have passed (0 = never)
fn spawn_cancel_watch(cancel: CancellationToken, timeout_secs: u64) {
    tokio::spawn(async move {
        let timeout = async {
            if timeout_secs == 0 {
                std::future::pending::<()>().await
            } else {
                tokio::time::sleep(Duration::from_secs(timeout_secs)).await
            }
        };

        tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => tracing::warn!("Interrupted, cancelling command"),
            _ = timeout => tracing::warn!("Command timed out after {}s", timeout_secs),
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    });
}

fn finish(result: Result<String, GhlError>) -> ExitCode {
    match result {
        Ok(text) => {
            if !text.is_empty() {
                println!("{text}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("Command failed ({}): {}", err.kind(), err);
            eprintln!("{}", render_error(&err));
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return finish(usage_outcome(err)),
    };

    let _log_guard = setup_logging(cli.log_level);

    let cancel = CancellationToken::new();
    spawn_cancel_watch(cancel.clone(), cli.timeout);

    let mut app = App::new(cancel.clone());
    let result = app.run(&cli).await;
    cancel.cancel();

    finish(result)
}
