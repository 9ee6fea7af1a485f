//! Command-line entry point running one collection pass.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use incident_config::{Config, LogFormat};
use incident_sections::{ReportRequest, SectionFilter, ServiceManager};
use incidentd::{
    OverridingConfigLoader, PassPlan, StructuredCollectionReporter, SystemConfigLoader,
    builtin_services, run_pass,
};

/// Collects the configured diagnostic sections into a report.
#[derive(Debug, Parser)]
#[command(name = "incidentd", version, about)]
struct Cli {
    /// Write the report to this file instead of standard output.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Only collect the section with this id; may be repeated.
    #[arg(short, long = "section", value_name = "ID")]
    sections: Vec<i32>,

    /// Log format for diagnostics on standard error (`json` or `compact`).
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let sink = match open_sink(cli.output.as_deref()) {
        Ok(sink) => sink,
        Err(error) => return fail(&format!("cannot open report output: {error}")),
    };
    let filter = if cli.sections.is_empty() {
        SectionFilter::All
    } else {
        SectionFilter::only(cli.sections.iter().copied())
    };

    let services = |config: &Config| -> Arc<dyn ServiceManager> {
        Arc::new(builtin_services(config))
    };
    let loader = OverridingConfigLoader::new(SystemConfigLoader).with_log_format(cli.log_format);
    let plan = PassPlan {
        loader: &loader,
        reporter: Arc::new(StructuredCollectionReporter::new()),
        services: &services,
    };
    match run_pass(&plan, ReportRequest::new(sink).with_filter(filter)) {
        Ok(summary) if summary.failed() == 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(error) => fail(&error.to_string()),
    }
}

fn open_sink(output: Option<&Path>) -> io::Result<Box<dyn Write + Send>> {
    let Some(path) = output else {
        return Ok(Box::new(io::stdout()));
    };
    Ok(Box::new(File::create(path)?))
}

fn fail(message: &str) -> ExitCode {
    // Telemetry may not be installed yet; a failed write has nowhere to go.
    drop(writeln!(io::stderr().lock(), "incidentd: {message}"));
    ExitCode::FAILURE
}
