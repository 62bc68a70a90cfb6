//! PDF active-content scrubber - command-line interface
//!
//! Sanitizes each input into `name_clean.pdf`, or with `--scan` only reports
//! obfuscated script content.

use std::{
    path::{Path, PathBuf},
    process,
    str::FromStr,
};

use clap::{Arg, ArgAction, ArgMatches, Command, ValueEnum};
use scrubpdf::{
    cleaner::{Denylist, DenylistPreset},
    config::{ProcessingConfig, RewriterKind},
    pipeline::{DocumentStatus, Pipeline},
};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Info, warning, and error messages (default)
    Info,
    /// Debug and all messages
    Debug,
    /// Trace and all messages (most verbose)
    Trace,
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    let log_level = if matches.get_flag("quiet") {
        LogLevel::Error
    } else {
        matches
            .get_one::<LogLevel>("verbose")
            .copied()
            .unwrap_or(LogLevel::Info)
    };
    init_logging(log_level);

    let inputs: Vec<PathBuf> = matches
        .get_many::<PathBuf>("files")
        .map(|files| files.cloned().collect())
        .unwrap_or_default();

    let config = match build_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let pipeline = match Pipeline::new(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let report_path = matches.get_one::<PathBuf>("report");
    let code = if matches.get_flag("scan") {
        run_scan(&pipeline, &inputs, report_path).await
    } else {
        run_sanitize(&pipeline, &inputs, report_path).await
    };
    process::exit(code);
}

async fn run_sanitize(pipeline: &Pipeline, inputs: &[PathBuf], report_path: Option<&PathBuf>) -> i32 {
    info!(
        documents = inputs.len(),
        policy = %pipeline.config().denylist.name,
        "Starting sanitization"
    );
    let start_time = std::time::Instant::now();
    let report = pipeline.execute_batch(inputs).await;

    for document in &report.documents {
        match (&document.outcome, &document.error) {
            (Some(outcome), _) => info!(
                "{} -> {} ({})",
                document.input.display(),
                outcome.output.display(),
                if outcome.used_fallback() { "first-pass fallback" } else { "done" }
            ),
            (None, Some(e)) => error!("{}: {}", document.input.display(), e),
            (None, None) => {}
        }
    }
    info!(
        "Processed {} documents in {:.2?}: {} sanitized, {} via fallback, {} failed",
        report.documents.len(),
        start_time.elapsed(),
        report.count(DocumentStatus::Sanitized),
        report.count(DocumentStatus::SanitizedWithFallback),
        report.count(DocumentStatus::Failed)
    );

    if let Some(path) = report_path {
        write_report(path, &report);
    }
    report.exit_code()
}

async fn run_scan(pipeline: &Pipeline, inputs: &[PathBuf], report_path: Option<&PathBuf>) -> i32 {
    let mut reports = Vec::new();
    let mut code = 0;
    for input in inputs {
        match pipeline.scan(input).await {
            Ok(report) => {
                let total = report.raw.len() + report.objects.len();
                if total > 0 {
                    warn!("{}: {} findings", input.display(), total);
                } else {
                    info!("{}: no findings", input.display());
                }
                reports.push(report);
            }
            Err(e) => {
                error!("{}: {}", input.display(), e);
                code = 1;
            }
        }
    }

    match report_path {
        Some(path) => write_report(path, &reports),
        None => match serde_json::to_string_pretty(&reports) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("Failed to render findings: {}", e),
        },
    }
    code
}

fn build_cli() -> Command {
    Command::new("scrubpdf")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Removes active content from PDF documents")
        .long_about(
            "Strips automatic actions, embedded scripts, interactive forms and similar \
             active content from PDF documents, compacts the object graph and rewrites \
             the result through qpdf. Sanitized copies are written as name_clean.pdf.",
        )
        .arg(
            Arg::new("files")
                .value_name("FILES")
                .value_parser(clap::value_parser!(PathBuf))
                .num_args(1..)
                .required(true)
                .help("PDF documents to process"),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Directory for sanitized copies (default: next to each input)"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Configuration file (JSON/YAML)"),
        )
        .arg(
            Arg::new("policy")
                .long("policy")
                .value_parser(["strict", "preserve-navigation"])
                .help("Denylist preset"),
        )
        .arg(
            Arg::new("rewriter")
                .long("rewriter")
                .value_parser(["qpdf", "builtin"])
                .help("Structural rewriter"),
        )
        .arg(
            Arg::new("qpdf")
                .long("qpdf")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Path to the qpdf executable"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECS")
                .value_parser(clap::value_parser!(u64).range(1..))
                .help("Rewriter timeout in seconds"),
        )
        .arg(
            Arg::new("qdf")
                .long("qdf")
                .action(ArgAction::SetTrue)
                .help("Have qpdf emit QDF instead of linearizing"),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .help("Documents processed concurrently (default: CPU count)"),
        )
        .arg(
            Arg::new("scan")
                .long("scan")
                .action(ArgAction::SetTrue)
                .help("Only scan for obfuscated script content, write nothing"),
        )
        .arg(
            Arg::new("report")
                .long("report")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Write a JSON report"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .value_parser(clap::value_parser!(LogLevel))
                .default_value("info")
                .help("Set logging verbosity"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppress all output except errors"),
        )
}

fn init_logging(level: LogLevel) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let filter_level = match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!("scrubpdf={}", filter_level)))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }
}

/// Config file first, then command-line overrides.
fn build_config(matches: &ArgMatches) -> Result<ProcessingConfig, String> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ProcessingConfig::from_file(path).map_err(|e| e.to_string())?,
        None => ProcessingConfig::default(),
    };

    if let Some(policy) = matches.get_one::<String>("policy") {
        let preset = DenylistPreset::from_str(policy).map_err(|e| e.to_string())?;
        config.denylist = Denylist::preset(preset);
    }
    if let Some(kind) = matches.get_one::<String>("rewriter") {
        config.rewriter.kind = match kind.as_str() {
            "builtin" => RewriterKind::Builtin,
            _ => RewriterKind::Qpdf,
        };
    }
    if let Some(program) = matches.get_one::<PathBuf>("qpdf") {
        config.rewriter.program = program.clone();
    }
    if let Some(timeout) = matches.get_one::<u64>("timeout") {
        config.rewriter.timeout_secs = *timeout;
    }
    if matches.get_flag("qdf") {
        config.rewriter.qdf = true;
    }
    if let Some(jobs) = matches.get_one::<usize>("jobs") {
        config.max_concurrent_documents = *jobs;
    }
    if let Some(dir) = matches.get_one::<PathBuf>("output-dir") {
        config.output_dir = Some(dir.clone());
    }
    Ok(config)
}

fn write_report<T: Serialize>(path: &Path, report: &T) {
    let written = serde_json::to_string_pretty(report)
        .map_err(|e| e.to_string())
        .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
    match written {
        Ok(()) => info!("Report written: {}", path.display()),
        Err(e) => error!("Failed to write report {}: {}", path.display(), e),
    }
}
