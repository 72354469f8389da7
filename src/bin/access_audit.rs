//! access_audit - audit one image's detections from the command line

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use access_audit::{
    parse_detections, AuditRequest, Auditor, BoundingBox, RuleEngine, RuleTable,
    DEFAULT_REFERENCE_DIMENSION_MM,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Detector output: a JSON array of {bbox, confidence, class, class_id}.
    #[arg(long)]
    detections: PathBuf,
    /// Reference object box as x1,y1,x2,y2. Falls back to a detected reference_marker.
    #[arg(long, value_name = "X1,Y1,X2,Y2")]
    reference_bbox: Option<BoundingBox>,
    /// Known size of the reference object's longer edge in millimeters.
    #[arg(long, default_value_t = DEFAULT_REFERENCE_DIMENSION_MM)]
    reference_dimension_mm: f64,
    /// Rule table (JSON, or TOML by extension). Defaults to the built-in table.
    #[arg(long, env = "ACCESS_AUDIT_RULES")]
    rules: Option<PathBuf>,
    /// Output file for the report. Prints to stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let table = {
        let _stage = ui.stage("Load rule table");
        match &args.rules {
            Some(path) => RuleTable::load(path)?,
            None => RuleTable::builtin()?,
        }
    };
    log::info!(
        "rule table {} ({} rules)",
        table.fingerprint_hex(),
        table.len()
    );

    let detections = {
        let _stage = ui.stage("Read detections");
        let raw = std::fs::read(&args.detections).map_err(|e| {
            anyhow!(
                "failed to read detections file {}: {}",
                args.detections.display(),
                e
            )
        })?;
        parse_detections(&raw)?
    };

    let auditor = Auditor::new(RuleEngine::from(table));
    let report = {
        let _stage = ui.stage("Evaluate compliance");
        auditor.audit(AuditRequest {
            detections,
            reference_bbox: args.reference_bbox,
            reference_dimension_mm: Some(args.reference_dimension_mm),
        })?
    };

    let json = serde_json::to_vec_pretty(&report)?;
    match &args.output {
        Some(path) => {
            let _stage = ui.stage("Write report");
            std::fs::write(path, json)?;
            eprintln!("report written to {}", path.display());
        }
        None => println!("{}", String::from_utf8_lossy(&json)),
    }
    eprintln!(
        "{}: {}/{} parameters compliant ({}%)",
        report.overall_compliance.verdict,
        report.overall_compliance.compliant,
        report.overall_compliance.total,
        report.overall_compliance.percentage
    );
    Ok(())
}
