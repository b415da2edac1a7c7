//! CLI that adds an invisible OCR text layer to scanned PDFs.

mod options;
mod summary;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use ocrlayer_core::pipeline::{PageReport, Pipeline, RunStatus};

use options::Cli;

const EXIT_PARTIAL_FAILURE: u8 = 1;
const EXIT_FATAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install logger: {}", e);
    }

    match run(cli).await {
        Ok(status) => match status {
            RunStatus::Success => ExitCode::SUCCESS,
            RunStatus::PartialFailure => ExitCode::from(EXIT_PARTIAL_FAILURE),
        },
        Err(e) => {
            eprintln!("{} {:#}", style("✗").red(), e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<RunStatus> {
    let config = options::effective_config(&cli)?;

    if let Some(path) = &cli.write_config {
        options::write_config(&config, path)?;
        eprintln!(
            "{} Wrote configuration to {}",
            style("✓").green(),
            path.display()
        );
        return Ok(RunStatus::Success);
    }

    let (input, output) = match (&cli.input, &cli.output) {
        (Some(input), Some(output)) => (input.clone(), output.clone()),
        _ => anyhow::bail!("both <INPUT> and <OUTPUT> are required"),
    };

    let progress = if cli.quiet || cli.json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} pages {msg}")?,
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    };

    let sink = progress.clone();
    let pipeline = Pipeline::new(config)?.with_progress(Arc::new(move |report: &PageReport| {
        sink.inc(1);
        sink.set_message(format!("(page {} {})", report.index + 1, report.state));
    }));

    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing pages already in progress");
            cancel.cancel();
        }
    });

    info!("Processing {} -> {}", input.display(), output.display());
    let result = pipeline.run(&input, &output).await;
    progress.finish_and_clear();
    let report = result?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !cli.quiet {
        summary::print(&report);
    }
    summary::print_failures(&report);

    Ok(report.status)
}
