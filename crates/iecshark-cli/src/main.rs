use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use glob::glob;
use iecshark_core::{
    AnalysisError, ChannelId, ChannelSettings, MINIMUM_SAMPLE_RATE_HZ, Report, SettingsError,
    SourceError,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const EXAMPLES: &str = "Examples:\n  iecshark capture decode bus.json -o report.json\n  iecshark capture analyze bus.csv --sample-rate 4000000 --stdout --pretty\n  iecshark capture decode bus.json --atn 0 --clk 1 --data 2 --csv frames.csv -o report.json";

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("IECSHARK_BUILD_COMMIT_FULL"),
    " (",
    env!("IECSHARK_BUILD_COMMIT"),
    ")\nbuilt: ",
    env!("IECSHARK_BUILD_DATE")
);

#[derive(Parser, Debug)]
#[command(name = "iecshark")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Offline decoder for Commodore IEC serial bus captures (ATN / CLK / DATA).",
    long_about = None,
    after_help = EXAMPLES
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Operations on logic analyzer captures (JSON edge lists or transition CSV).
    Capture {
        #[command(subcommand)]
        command: CaptureCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CaptureCommands {
    /// Decode a capture and generate a versioned JSON report.
    #[command(visible_alias = "analyse", alias = "analyze")]
    #[command(after_help = EXAMPLES)]
    Decode(DecodeArgs),
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Path to a .json or .csv capture (glob patterns must match one file)
    input: PathBuf,

    /// Output report path (JSON)
    #[arg(short = 'o', long, required_unless_present = "stdout")]
    report: Option<PathBuf>,

    /// Write JSON report to stdout
    #[arg(long, conflicts_with = "report")]
    stdout: bool,

    /// Pretty-print JSON output
    #[arg(long, conflicts_with = "compact")]
    pretty: bool,

    /// Compact JSON output (default)
    #[arg(long)]
    compact: bool,

    /// Suppress non-error output
    #[arg(long)]
    quiet: bool,

    /// Exit with a non-zero code if protocol violations are present
    #[arg(long)]
    strict: bool,

    /// List protocol violations after decoding
    #[arg(long)]
    list_violations: bool,

    /// Also export frames as CSV
    #[arg(long, value_name = "PATH")]
    csv: Option<PathBuf>,

    /// Channel id carrying ATN
    #[arg(long, value_name = "ID")]
    atn: Option<ChannelId>,

    /// Channel id carrying CLK
    #[arg(long, value_name = "ID")]
    clk: Option<ChannelId>,

    /// Channel id carrying DATA
    #[arg(long, value_name = "ID")]
    data: Option<ChannelId>,

    /// Saved channel settings: "<DATA> <CLK> <ATN>", '-' for unassigned
    #[arg(long, value_name = "ARCHIVE")]
    settings: Option<String>,

    /// Sample rate in Hz, overriding the capture (required for CSV without a rate comment)
    #[arg(long, value_name = "HZ")]
    sample_rate: Option<u32>,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Capture { command } => match command {
            CaptureCommands::Decode(args) => cmd_capture_decode(args),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{err:#}"), None)
    }
}

fn cmd_capture_decode(args: DecodeArgs) -> Result<(), CliError> {
    let resolved_input = resolve_input_path(&args.input)?;
    validate_input_file(&resolved_input)?;
    let input_abs = fs::canonicalize(&resolved_input)
        .with_context(|| format!("Failed to resolve input path: {}", resolved_input.display()))?;

    let report_path = match (args.stdout, args.report.as_ref()) {
        (true, _) => None,
        (false, Some(path)) => Some(path.clone()),
        (false, None) => {
            return Err(CliError::new(
                "missing output path",
                Some("use -o/--report or --stdout".to_string()),
            ));
        }
    };
    for output in report_path.iter().chain(args.csv.iter()) {
        ensure_differs_from_input(output, &input_abs)?;
    }

    let settings = channel_settings(&args)?;
    debug!(settings = %settings.save_archive(), "channel settings");

    let meta = fs::metadata(&resolved_input)
        .with_context(|| format!("Failed to read input file: {}", resolved_input.display()))?;
    if !meta.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", args.input.display()),
            Some("use a .json or .csv capture".to_string()),
        ));
    }

    let rep = iecshark_core::analyze_capture_file(&resolved_input, &settings, args.sample_rate)
        .map_err(analysis_error)?;
    info!(frames = rep.frames.len(), "decode complete");
    let json = serialize_report(&rep, args.pretty, args.compact)?;

    if let Some(csv_path) = args.csv.as_ref() {
        write_csv(&rep, csv_path)?;
        if !args.quiet && !args.stdout {
            eprintln!("OK: frames written -> {}", csv_path.display());
        }
    }

    match report_path {
        None => print!("{}", json),
        Some(report) => {
            create_parent_dir(&report)?;
            fs::write(&report, json)
                .with_context(|| format!("Failed to write report: {}", report.display()))?;
            if !args.quiet {
                eprintln!("OK: report written -> {}", report.display());
            }
        }
    }

    if args.list_violations && !args.quiet {
        print_violations(&rep);
    }
    if args.strict && has_violations(&rep) {
        return Err(CliError::new(
            "protocol violations detected",
            Some("use --list-violations to inspect".to_string()),
        ));
    }
    Ok(())
}

fn channel_settings(args: &DecodeArgs) -> Result<ChannelSettings, CliError> {
    let explicit = ChannelSettings {
        atn: args.atn,
        clk: args.clk,
        data: args.data,
    };
    let archived = match args.settings.as_deref() {
        Some(text) => ChannelSettings::load_archive(text).map_err(|err| {
            CliError::new(
                err.to_string(),
                Some("expected three channel ids in the order DATA CLK ATN, '-' for unassigned".to_string()),
            )
        })?,
        None => ChannelSettings::default(),
    };
    Ok(explicit.or(archived))
}

fn analysis_error(err: AnalysisError) -> CliError {
    let hint = match &err {
        AnalysisError::SampleRateTooLow { .. } => Some(format!(
            "capture at {} Hz or faster",
            MINIMUM_SAMPLE_RATE_HZ
        )),
        AnalysisError::Settings(SettingsError::Archive(_)) => None,
        AnalysisError::Settings(_) => Some(
            "assign channels with --atn/--clk/--data or --settings, or name them ATN, CLK, DATA"
                .to_string(),
        ),
        AnalysisError::Source(SourceError::Capture(message)) if message.contains("sample rate") => {
            Some("pass --sample-rate <HZ>".to_string())
        }
        AnalysisError::Source(SourceError::UnsupportedFormat(_)) => {
            Some("expected a .json or .csv capture".to_string())
        }
        _ => None,
    };
    let err = anyhow::Error::new(err).context("capture decode failed");
    CliError::new(format!("{err:#}"), hint)
}

fn ensure_differs_from_input(output: &Path, input_abs: &Path) -> Result<(), CliError> {
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // A parent that does not exist yet cannot contain the input.
    let Ok(output_dir) = fs::canonicalize(parent) else {
        return Ok(());
    };
    let file_name = output
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid output path: {}", output.display()))?;
    if output_dir.join(file_name) == input_abs {
        return Err(CliError::new(
            format!("output path must differ from input: {}", output.display()),
            Some("choose a different output path".to_string()),
        ));
    }
    Ok(())
}

fn create_parent_dir(path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn write_csv(rep: &Report, path: &Path) -> Result<(), CliError> {
    create_parent_dir(path)?;
    let file = File::create(path)
        .with_context(|| format!("Failed to create CSV export: {}", path.display()))?;
    iecshark_core::write_frames_csv(rep, BufWriter::new(file))
        .with_context(|| format!("Failed to write CSV export: {}", path.display()))?;
    Ok(())
}

fn serialize_report(rep: &Report, pretty: bool, compact: bool) -> Result<String, CliError> {
    if pretty && compact {
        return Err(CliError::new(
            "cannot use --pretty and --compact together",
            Some("choose one output format".to_string()),
        ));
    }
    if pretty {
        serde_json::to_string_pretty(rep)
            .context("JSON serialization failed")
            .map_err(Into::into)
    } else {
        serde_json::to_string(rep)
            .context("JSON serialization failed")
            .map_err(Into::into)
    }
}

fn has_violations(rep: &Report) -> bool {
    !rep.violations.is_empty()
}

fn print_violations(rep: &Report) {
    eprintln!("Protocol violations:");
    for violation in &rep.violations {
        let examples = violation
            .examples
            .iter()
            .map(|sample| format!("@{sample}"))
            .collect::<Vec<_>>()
            .join(" ");
        eprintln!(
            "  {} {} ({}) {}",
            violation.id,
            violation.line.name(),
            violation.count,
            examples
        );
    }
}

fn validate_input_file(input: &Path) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("use a .json or .csv capture".to_string()),
        ));
    }
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "json" && ext != "csv" {
        return Err(CliError::new(
            format!("unsupported input format '{}'", input.display()),
            Some("expected a .json or .csv capture".to_string()),
        ));
    }
    Ok(())
}

fn resolve_input_path(input: &Path) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !is_glob_pattern(&pattern) {
        return Ok(input.to_path_buf());
    }

    let paths = glob(&pattern).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", pattern),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    let mut matches = Vec::new();
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }

    match matches.len() {
        0 => Err(CliError::new(
            format!("no files match pattern '{}'", pattern),
            Some("check the path or quote the pattern; expected .json or .csv".to_string()),
        )),
        1 => Ok(matches.remove(0)),
        count => {
            let mut listed = matches
                .iter()
                .take(3)
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            if count > 3 {
                listed.push_str(", ...");
            }
            Err(CliError::new(
                format!(
                    "multiple files match pattern '{}' ({} matches); matches: {}",
                    pattern, count, listed
                ),
                Some("pass a single capture file, or run once per file".to_string()),
            ))
        }
    }
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
