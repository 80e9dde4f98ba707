//! GraphQL scenario runner CLI.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use gqlscenario::{
    CaseStatus, DefaultGroupRunner, GroupManifest, GroupResult, GroupRunner,
    ManifestLoader, ENDPOINT_ENV,
};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Run YAML scenario groups against a GraphQL endpoint.
#[derive(Parser, Debug)]
#[command(name = "gqlscenario", version, about)]
struct Cli {
    /// Manifest file or directory path.
    #[arg(short = 'p', long = "path")]
    path: Option<String>,

    /// Filter groups by name (partial match).
    #[arg(short = 'f', long = "filter")]
    filter: Option<String>,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Request timeout in seconds.
    #[arg(short = 't', long = "timeout")]
    timeout: Option<u64>,

    /// Directory to save report files.
    #[arg(short = 'r', long = "report-dir")]
    report_dir: Option<String>,

    /// Report output format.
    #[arg(long = "report-format", default_value = "json")]
    report_format: ReportFormat,

    /// GraphQL endpoint override for all groups.
    #[arg(short = 'e', long = "endpoint", env = ENDPOINT_ENV)]
    endpoint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum ReportFormat {
    Json,
    Yaml,
    Text,
}

fn init_tracing(verbose: bool) {
    if std::env::var_os("RUST_LOG").is_none() {
        let level = if verbose { "debug" } else { "info" };
        std::env::set_var("RUST_LOG", level);
    }

    if tracing::dispatcher::has_been_set() {
        return;
    }

    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_level(true)
        .try_init();
}

fn status_label(status: CaseStatus) -> &'static str {
    match status {
        CaseStatus::Passed => "\x1b[32m✓\x1b[0m",
        CaseStatus::Failed => "\x1b[31m✗\x1b[0m",
        CaseStatus::Skipped => "\x1b[33m-\x1b[0m",
    }
}

fn print_group_result(result: &GroupResult, verbose: bool) {
    let status = if result.success {
        "\x1b[32mPASS\x1b[0m"
    } else {
        "\x1b[31mFAIL\x1b[0m"
    };
    info!("{} group: {} ({} ms)", status, result.name, result.duration_ms);

    for (i, case) in result.cases.iter().enumerate() {
        info!(
            "  {}. {} {} ({} ms)",
            i + 1,
            status_label(case.status),
            case.name,
            case.duration_ms
        );

        if let (CaseStatus::Failed, Some(error)) = (case.status, &case.error) {
            error!("     \x1b[31mError: {}\x1b[0m", error);
        }

        if verbose {
            if let Some(request) = &case.request {
                debug!("     Query: {}", request.query);
                debug!(
                    "     Variables: {}",
                    serde_json::Value::Object(request.variables.clone())
                );
                debug!("     Authenticated: {}", request.authenticated);
            }
        }
    }

    if let Some(error) = &result.error {
        error!("  \x1b[31m{}\x1b[0m", error);
    }
}

fn render_text(result: &GroupResult) -> String {
    let mut content = String::new();
    content.push_str(&format!("Group: {}\n", result.name));
    content.push_str(&format!(
        "Status: {}\n",
        if result.success { "PASS" } else { "FAIL" }
    ));
    if let Some(error) = &result.error {
        content.push_str(&format!("Error: {error}\n"));
    }
    content.push_str(&format!("Duration: {} ms\n\n", result.duration_ms));
    content.push_str("Steps:\n");
    for (i, case) in result.cases.iter().enumerate() {
        let status = match case.status {
            CaseStatus::Passed => "PASS",
            CaseStatus::Failed => "FAIL",
            CaseStatus::Skipped => "SKIP",
        };
        content.push_str(&format!("  {}. {} ({})\n", i + 1, case.name, status));
        if let Some(error) = &case.error {
            content.push_str(&format!("     Error: {error}\n"));
        }
        content.push_str(&format!("     Duration: {} ms\n", case.duration_ms));
    }
    content
}

fn save_group_report(
    result: &GroupResult,
    report_dir: &Path,
    format: ReportFormat,
) -> Result<PathBuf> {
    if !report_dir.exists() {
        fs::create_dir_all(report_dir)?;
    }

    let timestamp = Utc::now().timestamp();
    let sanitized_name = result.name.replace([' ', '/'], "_");

    let (extension, content) = match format {
        ReportFormat::Json => ("json", serde_json::to_string_pretty(result)?),
        ReportFormat::Yaml => ("yaml", serde_yaml::to_string(result)?),
        ReportFormat::Text => ("txt", render_text(result)),
    };

    let filename = format!("{sanitized_name}-{timestamp}.{extension}");
    let file_path = report_dir.join(filename);
    let mut file = File::create(&file_path)?;
    file.write_all(content.as_bytes())?;

    Ok(file_path)
}

fn prepare_manifests(path: Option<String>) -> Result<Vec<GroupManifest>> {
    let mut loader = ManifestLoader::new();
    for path in ["tests/graphql", "scenarios"] {
        if Path::new(path).exists() {
            loader.add_path(path);
        }
    }

    let manifests = match path {
        Some(path) => {
            let path = PathBuf::from(path);
            if path.is_file() {
                let manifest = loader.load_manifest(&path).context(format!(
                    "Failed to load manifest: {}",
                    path.display()
                ))?;
                vec![manifest]
            } else if path.is_dir() {
                loader.load_manifests_from_dir(&path).context(format!(
                    "Failed to load manifests from directory: {}",
                    path.display()
                ))?
            } else {
                return Err(anyhow!("Path does not exist: {}", path.display()));
            }
        }
        None => loader.load_all()?,
    };

    if manifests.is_empty() {
        return Err(anyhow!("No scenario groups found"));
    }

    Ok(manifests)
}

async fn run_all_groups(
    manifests: Vec<GroupManifest>,
    args: &Cli,
    report_dir: Option<&Path>,
) -> Result<bool> {
    let runner = DefaultGroupRunner::new();
    let total_start = Instant::now();
    let mut passed = 0;
    let mut failed = 0;

    let filtered: Vec<GroupManifest> = match &args.filter {
        Some(filter) => manifests
            .into_iter()
            .filter(|m| m.name.to_lowercase().contains(&filter.to_lowercase()))
            .collect(),
        None => manifests,
    };

    if filtered.is_empty() {
        return Err(anyhow!("No groups matching the filter were found"));
    }

    let total = filtered.len();
    info!("Running {} group(s)...", total);

    for (idx, mut manifest) in filtered.into_iter().enumerate() {
        manifest.config = manifest.config.apply_env();
        if let Some(timeout) = args.timeout {
            manifest.config.timeout = timeout;
        }
        if let Some(endpoint) = &args.endpoint {
            manifest.config.endpoint = Some(endpoint.clone());
        }

        info!("Group {}/{}: {}", idx + 1, total, manifest.name);
        let result = runner.run(&manifest.into_group()).await;
        print_group_result(&result, args.verbose);

        if let Some(dir) = report_dir {
            match save_group_report(&result, dir, args.report_format) {
                Ok(path) => info!("Report saved: {}", path.display()),
                Err(e) => error!("Failed to save report: {}", e),
            }
        }

        if result.success {
            passed += 1;
        } else {
            failed += 1;
        }
    }

    info!(
        "Summary:\n  Total: {}\n  \x1b[32mPassed: {}\x1b[0m\n  \x1b[31mFailed: {}\x1b[0m\n  Duration: {} ms",
        passed + failed,
        passed,
        failed,
        total_start.elapsed().as_millis()
    );

    Ok(failed == 0)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.verbose);

    let manifests = prepare_manifests(args.path.clone())?;
    let report_dir = args.report_dir.as_ref().map(PathBuf::from);

    let success =
        run_all_groups(manifests, &args, report_dir.as_deref()).await?;

    if !success {
        exit(1);
    }

    Ok(())
}
