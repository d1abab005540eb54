use serde::Serialize;

use crate::cli::{OutputFormat, ValidateArgs};
use crate::error::CliError;
use crate::manifest::Manifest;
use crate::output;

#[derive(Debug, Serialize)]
struct ValidationReport {
    valid: bool,
    quotes: usize,
    secrets: usize,
    warnings: Vec<String>,
}

pub fn run(args: &ValidateArgs, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let manifest = Manifest::load(&args.manifest)?;
    let report = ValidationReport {
        valid: true,
        quotes: manifest.quotes.len(),
        secrets: manifest.secrets.len(),
        warnings: manifest.unresolved_references(),
    };

    match format {
        OutputFormat::Json => output::render_json(&report, pretty),
        OutputFormat::Table => {
            println!(
                "manifest {} is valid: {} quotes, {} secrets",
                args.manifest.display(),
                report.quotes,
                report.secrets
            );
            for warning in &report.warnings {
                println!("warning: {warning}");
            }
            Ok(())
        }
    }
}
