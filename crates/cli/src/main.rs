mod cli;
mod format;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vidmp3_core::{
    load_config, load_default_config, metrics, session_from_config, validate_config, Config,
    ConversionState, ConversionStatus, InputCandidate, OutputArtifact, TranscodeAdapter,
};

use cli::{Cli, Commands, LogFormat};
use format::{format_duration, format_remaining, format_size};

/// Environment variable naming the config file when `--config` is absent.
const CONFIG_ENV: &str = "VIDMP3_CONFIG";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let result = run(&cli).await;

    if cli.metrics {
        print_metrics();
    }

    if let Err(e) = result {
        error!("Fatal error: {:#}", e);
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, log_format: LogFormat) {
    let default_filter = if verbose {
        "vidmp3=debug,vidmp3_core=debug"
    } else {
        "info"
    };
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| default_filter.into()),
    );

    match log_format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let mut config = resolve_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Convert {
            inputs,
            output,
            adapter,
            json,
        } => {
            if let Some(adapter) = adapter {
                config.adapter.mode = (*adapter).into();
            }
            validate_config(&config).context("Configuration validation failed")?;
            convert(&config, inputs, output.as_deref(), *json).await
        }
        Commands::Inspect { file } => {
            validate_config(&config).context("Configuration validation failed")?;
            inspect(&config, file).await
        }
        Commands::Config => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{rendered}");
            Ok(())
        }
    }
}

fn resolve_config(path: Option<&Path>) -> Result<Config> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

    match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))
        }
        None => load_default_config().context("Failed to load default configuration"),
    }
}

#[derive(Serialize)]
struct ConvertReport<'a> {
    path: &'a Path,
    #[serde(flatten)]
    artifact: &'a OutputArtifact,
}

async fn convert(
    config: &Config,
    inputs: &[PathBuf],
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let session = session_from_config(config).context("Failed to build conversion session")?;
    info!(adapter = session.adapter().name(), "Conversion session ready");

    let candidates = inputs.iter().map(InputCandidate::from_path).collect();
    if session.select_input(candidates).await? == ConversionStatus::Error {
        return Err(failure_error(&session.state()));
    }

    let state = session.state();
    let Some(input) = state.input.as_ref() else {
        bail!("No input was selected");
    };
    let source_path = input
        .source
        .path()
        .map(Path::to_path_buf)
        .context("Selected input has no path")?;
    eprintln!(
        "Converting {} ({}, {}{})",
        input.file_name,
        input.kind,
        format_size(input.size_bytes),
        input
            .duration_secs
            .map(|d| format!(", {}", format_duration(d)))
            .unwrap_or_default()
    );

    let reporter = tokio::spawn(report_progress(session.subscribe()));

    let status = tokio::select! {
        status = session.start_conversion() => status?,
        _ = signal::ctrl_c() => {
            info!("Interrupted, abandoning conversion");
            session.reset();
            reporter.abort();
            session.shutdown().await;
            bail!("Interrupted");
        }
    };
    let _ = reporter.await;

    if status != ConversionStatus::Completed {
        let err = failure_error(&session.state());
        session.shutdown().await;
        return Err(err);
    }

    let artifact = session.retrieve_output()?;
    let destination = output_path(&source_path, output, &artifact.file_name);
    let written = session
        .resources()
        .save_to(&artifact.handle, &destination)
        .await
        .with_context(|| format!("Failed to write {:?}", destination))?;
    info!(path = ?destination, bytes = written, "Saved output");

    if json {
        let report = ConvertReport {
            path: &destination,
            artifact: &artifact,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Saved {} ({}, {} kbps{})",
            destination.display(),
            format_size(artifact.size_bytes),
            artifact.bitrate_kbps,
            artifact
                .duration_secs
                .map(|d| format!(", {}", format_duration(d)))
                .unwrap_or_default()
        );
    }

    session.shutdown().await;
    Ok(())
}

async fn inspect(config: &Config, file: &Path) -> Result<()> {
    let session = session_from_config(config).context("Failed to build conversion session")?;

    if session
        .select_input(vec![InputCandidate::from_path(file)])
        .await?
        == ConversionStatus::Error
    {
        return Err(failure_error(&session.state()));
    }

    let state = session.state();
    println!("{}", serde_json::to_string_pretty(&state.input)?);
    Ok(())
}

/// Prints one line per visible progress change until the conversion settles.
async fn report_progress(mut rx: watch::Receiver<ConversionState>) {
    let mut last_line = String::new();

    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();

        if let Some(progress) = &state.progress {
            let mut line = format!("[{:>3.0}%] {}", progress.percentage, progress.step);
            if let Some(eta_ms) = progress.eta_ms {
                line.push_str(&format!(" ({})", format_remaining(eta_ms)));
            }
            if line != last_line {
                eprintln!("{line}");
                last_line = line;
            }
        }

        if matches!(
            state.status,
            ConversionStatus::Completed | ConversionStatus::Error
        ) {
            break;
        }
    }
}

fn output_path(source: &Path, output: Option<&Path>, file_name: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(file_name),
        Some(path) => path.to_path_buf(),
        None => source
            .parent()
            .map(|dir| dir.join(file_name))
            .unwrap_or_else(|| PathBuf::from(file_name)),
    }
}

fn failure_error(state: &ConversionState) -> anyhow::Error {
    match &state.error {
        Some(failure) => {
            let hint = if failure.is_recoverable() {
                ""
            } else {
                " (fix the environment before retrying)"
            };
            let mut message = format!("{} [{}]{hint}", failure.message, failure.kind);
            if let Some(details) = &failure.details {
                message.push_str(&format!("\n{details}"));
            }
            anyhow::anyhow!(message)
        }
        None => anyhow::anyhow!("Conversion ended in state {}", state.status),
    }
}

fn print_metrics() {
    use prometheus::{Encoder, TextEncoder};

    let registry = prometheus::Registry::new();
    for metric in metrics::all_metrics() {
        if let Err(e) = registry.register(metric) {
            error!("Failed to register metric: {}", e);
        }
    }

    let mut buffer = Vec::new();
    match TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        Ok(()) => print!("{}", String::from_utf8_lossy(&buffer)),
        Err(e) => error!("Failed to encode metrics: {}", e),
    }
}
