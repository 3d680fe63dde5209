use crate::config::Settings;
use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup logging with a daily rotating file and optional console output.
///
/// `RUST_LOG` takes precedence over the `debug` setting when it is set.
///
/// # Arguments
/// * `settings` - log directory, prefix, level, console and JSON switches
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging(settings: &Settings) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    ensure_log_dir(&settings.log_dir)?;

    let file_appender = rolling::daily(&settings.log_dir, &settings.log_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let (json_layer, text_layer) = if settings.json_logs {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        (Some(layer), None)
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false) // No ANSI codes in log files
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        (None, Some(layer))
    };

    // Console goes to stderr so stdout stays free for command output
    let console_layer = settings.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(env_filter(settings.debug))
        .with(json_layer)
        .with(text_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}, json={}",
        settings.log_dir,
        settings.log_prefix,
        settings.debug,
        settings.console,
        settings.json_logs
    );

    Ok(guard)
}

fn env_filter(debug_mode: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_mode {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    })
}

fn ensure_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}
