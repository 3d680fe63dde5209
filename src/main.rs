//! pitstop-runner - run PitStop Server preflight jobs from the command line.
//!
//! Usage:
//!   pitstop-runner run [JOB] [--set key=value]...   Run a job file, with overrides
//!   pitstop-runner version [--application PATH]     Print the PitStop Server version
//!   pitstop-runner locate                           Print the discovered CLI path
//!   pitstop-runner init [--job FILE]                Write default settings and a sample job
//!
//! Settings come from `pitstop-runner.yaml` in the settings directory and
//! `PITSTOP__*` environment variables. The process exit code of `run` is the
//! PitStop Server exit code (1 when it does not fit a process exit status).

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use pitstop_runner::models::parse_overrides;
use pitstop_runner::services::discovery::{PlatformLocator, resolve_executable};
use pitstop_runner::{
    APP_NAME, ConfigManager, ExecutionResult, PreflightRun, RunMetrics, Settings, TaskOptions,
    VERSION, logging, runner,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// pitstop-runner - run PitStop Server preflight jobs
#[derive(Parser)]
#[command(name = "pitstop-runner")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing pitstop-runner.yaml (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    settings_dir: Option<Utf8PathBuf>,

    /// Enable debug logging (overrides settings)
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a preflight job
    Run {
        /// Job YAML file; options can also be given entirely with --set
        #[arg(value_name = "JOB")]
        job: Option<Utf8PathBuf>,

        /// Option override, e.g. --set xmlReport=true (repeatable)
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Abort after this many seconds (overrides settings)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Remove the output folder after the run
        #[arg(long)]
        cleanup: bool,
    },

    /// Print the version reported by PitStop Server
    Version {
        /// PitStop Server CLI to ask (default: discovered)
        #[arg(long, value_name = "PATH")]
        application: Option<Utf8PathBuf>,
    },

    /// Print the path of the discovered PitStop Server CLI
    Locate,

    /// Write default settings and a sample job file
    Init {
        /// Where to write the sample job (default: job.yaml in the settings directory)
        #[arg(long, value_name = "FILE")]
        job: Option<Utf8PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(
        cli.settings_dir
            .clone()
            .unwrap_or_else(|| Utf8PathBuf::from(".")),
    )?;
    let mut settings = config_manager.load_settings()?;
    if cli.debug {
        settings.debug = true;
    }

    let _guard = logging::setup_logging(&settings)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("pitstop-worker")
        .build()?;

    let outcome = runtime.block_on(dispatch(cli.command, &config_manager, &settings));

    runtime.shutdown_timeout(Duration::from_secs(5));

    outcome.map_err(|e| {
        tracing::error!("{:#}", e);
        e
    })
}

async fn dispatch(
    command: Commands,
    config_manager: &ConfigManager,
    settings: &Settings,
) -> Result<ExitCode> {
    match command {
        Commands::Run {
            job,
            set,
            timeout,
            cleanup,
        } => {
            let mut options = match job {
                Some(path) => config_manager.load_job(&path)?,
                None => TaskOptions::default(),
            };
            let overrides = parse_overrides(&set)?;
            options.apply_all(&overrides)?;
            if options.application_path.is_none() {
                options.application_path = settings.application_path.clone();
            }

            run_job(options, timeout.or(settings.timeout_secs), cleanup).await
        }
        Commands::Version { application } => {
            let executable = match application.or_else(|| settings.application_path.clone()) {
                Some(path) => path,
                None => resolve_executable(&PlatformLocator)?,
            };
            let version = runner::query_version(&executable).await?;
            println!("{}", version);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Locate => {
            let executable = resolve_executable(&PlatformLocator)?;
            println!("{}", executable);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Init { job } => {
            if config_manager.write_default_settings()? {
                println!("Wrote {}", config_manager.settings_path());
            }
            let job_path = job.unwrap_or_else(|| config_manager.settings_dir().join("job.yaml"));
            if config_manager.write_job_template(&job_path)? {
                println!("Wrote {}", job_path);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_job(options: TaskOptions, timeout: Option<u64>, cleanup: bool) -> Result<ExitCode> {
    let metrics = Arc::new(RunMetrics::new());
    let mut run = PreflightRun::new(options)?.with_metrics(metrics.clone());

    let result = match timeout {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), run.run())
            .await
            .with_context(|| format!("PitStop Server did not finish within {}s", secs))??,
        None => run.run().await?,
    };

    report(&run, &result);

    if cleanup {
        run.cleanup()?;
    }
    metrics.log_summary();

    Ok(exit_code(&result))
}

fn report(run: &PreflightRun, result: &ExecutionResult) {
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
    }

    let task = run.task();
    if result.is_success() {
        println!("Output PDF: {}", task.output_pdf());
        for report in [
            &task.reports.pdf,
            &task.reports.xml,
            &task.reports.json,
            &task.reports.task,
        ]
        .into_iter()
        .flatten()
        {
            println!("Report: {}", report);
        }
    }

    if let Some(elapsed) = run.elapsed() {
        tracing::info!("{} in {:.2}s", result, elapsed.as_secs_f64());
    }
}

fn exit_code(result: &ExecutionResult) -> ExitCode {
    match u8::try_from(result.exit_code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
