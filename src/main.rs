use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use veracity::analyzer::{AnalysisRequest, TheaterStatus};
use veracity::cli::{Cli, Command, OutputFormat};
use veracity::config::VeracityConfig;
use veracity::evidence::{
    verify_archive, EvidenceCollector, SecurityScanSummary, TestRunSummary,
};

/// Exit code for a change the gate should block
const EXIT_BLOCK: u8 = 2;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    } else if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Read a file, or stdin for `-`
fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

fn load_request(path: &Path) -> Result<AnalysisRequest> {
    let content = read_input(path)?;
    AnalysisRequest::from_json(&content)
        .with_context(|| format!("Invalid analysis request {}", path.display()))
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = read_input(path)?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(block: bool) -> ExitCode {
    if block {
        ExitCode::from(EXIT_BLOCK)
    } else {
        ExitCode::SUCCESS
    }
}

fn run_analyze(config: &VeracityConfig, input: &Path, format: OutputFormat) -> Result<ExitCode> {
    let request = load_request(input)?;
    let analysis = config.analyzer().analyze(&request)?;

    match format {
        OutputFormat::Json => print_json(&analysis)?,
        OutputFormat::Text => {
            print!("{}", analysis.report.to_report_string());
            println!();
            print!("{}", analysis.validation.to_report_string());
        }
    }
    Ok(exit_code(
        analysis.report.status == TheaterStatus::HighTheaterRisk,
    ))
}

fn run_validate(config: &VeracityConfig, input: &Path, format: OutputFormat) -> Result<ExitCode> {
    let request = load_request(input)?;
    let analyzer = config.analyzer();
    let result = analyzer.validator().validate(
        &request.before,
        &request.after,
        &request.changes,
        &request.claimed_improvements,
        &request.description,
    )?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print!("{}", result.to_report_string()),
    }
    Ok(exit_code(!result.is_genuine))
}

fn run_audit(
    config: &VeracityConfig,
    input: &Path,
    output: &Path,
    scope: &str,
    tests: Option<&Path>,
    security: Option<&Path>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let request = load_request(input)?;
    let analysis = config.analyzer().analyze(&request)?;
    let collector = EvidenceCollector::open(config.evidence.clone())
        .context("Failed to open evidence collector")?;

    let location = request.location();
    let mut items = vec![
        collector.collect_code_change_evidence(&request.changes, &location)?,
        collector.collect_metric_improvement_evidence(&request.before, &request.after, &location)?,
    ];
    if let Some(path) = tests {
        let run: TestRunSummary = load_json(path)?;
        items.push(collector.collect_test_result_evidence(&run, &path.display().to_string())?);
    }
    if let Some(path) = security {
        let scan: SecurityScanSummary = load_json(path)?;
        items.push(collector.collect_security_scan_evidence(&scan, &path.display().to_string())?);
    }

    let package =
        collector.create_audit_package(&items, scope, &request.after, Some(&analysis.validation))?;
    collector
        .export_package(&package, output)
        .with_context(|| format!("Failed to export {}", output.display()))?;

    match format {
        OutputFormat::Json => print_json(&package)?,
        OutputFormat::Text => {
            println!("📦 Audit package {}", package.package_id);
            println!("Archive: {}", output.display());
            println!(
                "Chain integrity: {}/{} ({:.2})",
                package.chain_verification.verified_items,
                package.chain_verification.total_items,
                package.chain_verification.integrity_score
            );
            for cert in &package.certifications {
                println!("  {}: {} ({:.2})", cert.standard, cert.status.as_str(), cert.score);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_verify_archive(archive: &Path, format: OutputFormat) -> Result<ExitCode> {
    let verification = verify_archive(archive)
        .with_context(|| format!("Failed to read archive {}", archive.display()))?;
    match format {
        OutputFormat::Json => print_json(&verification)?,
        OutputFormat::Text => print!("{}", verification.to_report_string()),
    }
    Ok(exit_code(!verification.is_valid()))
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag or RUST_LOG is set
    init_tracing(args.debug);

    let config = match &args.config {
        Some(path) => VeracityConfig::from_file(path)?,
        None => VeracityConfig::default(),
    };

    match &args.command {
        Command::Analyze { input } => run_analyze(&config, input, args.format),
        Command::Validate { input } => run_validate(&config, input, args.format),
        Command::Audit {
            input,
            output,
            scope,
            tests,
            security,
        } => run_audit(
            &config,
            input,
            output,
            scope,
            tests.as_deref(),
            security.as_deref(),
            args.format,
        ),
        Command::VerifyArchive { archive } => run_verify_archive(archive, args.format),
    }
}
