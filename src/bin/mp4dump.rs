use anyhow::Context;
use bmffdump::{
    FourCC, JsonPrinter, PrinterConfig, Registry, TextPrinter,
    error::BoxWarning,
    parser::{DEFAULT_MAX_DEPTH, DumpOptions, DumpReport, dump},
    printer::{JsonBox, parse_depth_override},
    registry::default_registry,
};
use clap::{ArgAction, Parser};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Dump the box structure of ISO Base Media (MP4/MOV/fMP4) files")]
struct Args {
    /// Input files, dumped in order
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Emit JSON instead of the indented text tree
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Fail a file whose containers nest deeper than this
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Spaces per indentation level
    #[arg(long, default_value_t = 2)]
    indent: usize,

    /// Show a box type at a fixed depth (e.g. --depth-override traf=1); repeatable
    #[arg(long = "depth-override", value_name = "TYPE=DEPTH", value_parser = parse_depth_override)]
    depth_overrides: Vec<(FourCC, usize)>,

    /// Do not pin moof/mdat to the left margin
    #[arg(long, action = ArgAction::SetTrue)]
    no_fragment_grouping: bool,

    /// Log every box header to stderr
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Serialize)]
struct JsonFile {
    file: String,
    boxes: Vec<JsonBox>,
    warnings: Vec<BoxWarning>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let registry = default_registry();
    let opts = DumpOptions {
        max_depth: args.max_depth,
    };
    let config = printer_config(&args);

    for (i, path) in args.paths.iter().enumerate() {
        let index = i + 1;
        if let Err(e) = dump_file(path, args.json, &registry, &opts, &config) {
            error!(input = index, path = %path.display(), "{e:#}");
            return ExitCode::from(index.min(255) as u8);
        }
    }
    ExitCode::SUCCESS
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "bmffdump=debug,mp4dump=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(io::stderr)
        .init();
}

fn printer_config(args: &Args) -> PrinterConfig {
    let base = if args.no_fragment_grouping {
        PrinterConfig::plain()
    } else {
        PrinterConfig::default()
    };
    let mut config = PrinterConfig {
        indent: " ".repeat(args.indent),
        ..base
    };
    for &(typ, depth) in &args.depth_overrides {
        config = config.with_override(typ, depth);
    }
    config
}

fn dump_file(
    path: &Path,
    json: bool,
    registry: &Registry,
    opts: &DumpOptions,
    config: &PrinterConfig,
) -> anyhow::Result<()> {
    let f = File::open(path).with_context(|| format!("couldn't open '{}'", path.display()))?;
    let reader = BufReader::new(f);

    let report = if json {
        let mut printer = JsonPrinter::new(config.clone());
        let report = dump(reader, registry, opts, &mut printer)
            .with_context(|| format!("parse failure in '{}'", path.display()))?;
        let out = JsonFile {
            file: path.display().to_string(),
            boxes: printer.into_boxes(),
            warnings: report.warnings.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        report
    } else {
        println!("--- dump of {} ---", path.display());
        let stdout = io::stdout();
        let mut printer = TextPrinter::new(stdout.lock(), config.clone());
        let report = dump(reader, registry, opts, &mut printer)
            .with_context(|| format!("parse failure in '{}'", path.display()))?;
        printer.into_inner().flush()?;
        report
    };

    log_summary(path, &report);
    Ok(())
}

fn log_summary(path: &Path, report: &DumpReport) {
    if !report.warnings.is_empty() {
        warn!(
            path = %path.display(),
            warnings = report.warnings.len(),
            "dump complete with warnings"
        );
    }
    info!(
        path = %path.display(),
        boxes = report.boxes,
        warnings = report.warnings.len(),
        undecoded = report.undecoded,
        "dump complete"
    );
}
